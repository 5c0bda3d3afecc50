//! Log setup for the `contribkit` binary.
//!
//! Log lines always go to stderr; stdout carries only the rendered report so it
//! can be piped or diffed. The filter comes from `CONTRIBKIT_LOG`, then
//! `RUST_LOG`, and otherwise shows contribkit's own events at the requested
//! level while dependencies stay at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable that overrides the log filter.
pub const LOG_ENV: &str = "CONTRIBKIT_LOG";

const OWN_TARGETS: &[&str] = &["contribkit", "contribkit_core", "contribkit_ci"];

/// Filter directive used when no environment override is set.
pub fn default_directive(level: Level) -> String {
    let mut directive = String::from("warn");
    for target in OWN_TARGETS {
        directive.push_str(&format!(",{target}={}", level.as_str().to_lowercase()));
    }
    directive
}

fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)))
}

/// Install the global subscriber; `json` switches to one JSON object per line.
///
/// A second call is a no-op.
pub fn init_tracing(json: bool, level: Level) {
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter(level));
    let installed = if json {
        registry.with(stderr.json()).try_init()
    } else {
        registry.with(stderr).try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
