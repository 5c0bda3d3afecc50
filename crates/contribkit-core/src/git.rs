//! Git integration: compute the change list for a contribution root.

use std::path::{Component, Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::domain::ChangeSet;
use crate::error::{PipelineError, Result};

fn git(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| PipelineError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Top-level directory of the work tree containing `dir`.
pub fn repo_toplevel(dir: &Path) -> Result<PathBuf> {
    let top = git(dir, &["rev-parse", "--show-toplevel"])?;
    let top = top.trim();
    if top.is_empty() {
        return Err(PipelineError::Git(
            "git rev-parse --show-toplevel returned empty output".to_string(),
        ));
    }
    Ok(PathBuf::from(top))
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Contributions under `contrib_root` touched between `base_ref` and `HEAD`.
///
/// Uses the merge base (`base...HEAD`). Folders deleted by the diff are
/// dropped since there is nothing left to validate.
pub fn changed_contributions(contrib_root: &Path, base_ref: &str) -> Result<ChangeSet> {
    let toplevel = repo_toplevel(contrib_root)?;
    let root = contrib_root.canonicalize()?;
    let toplevel = toplevel.canonicalize()?;
    let relative = root.strip_prefix(&toplevel).map_err(|_| {
        PipelineError::Git(format!(
            "{} is outside the work tree {}",
            root.display(),
            toplevel.display()
        ))
    })?;

    let range = format!("{base_ref}...HEAD");
    let pathspec = if relative.as_os_str().is_empty() {
        ".".to_string()
    } else {
        relative.to_string_lossy().into_owned()
    };
    let listing = git(&toplevel, &["diff", "--name-only", &range, "--", &pathspec])?;

    let changes = contributions_from_paths(listing.lines(), relative);
    let existing = ChangeSet::from_names(
        changes
            .iter()
            .filter(|name| root.join(name).is_dir())
            .map(str::to_string),
    );
    debug!(
        base = %base_ref,
        changed = changes.len(),
        existing = existing.len(),
        "Computed contribution change list"
    );
    Ok(existing)
}

/// Map repository-relative file paths to contribution folder names under
/// `contrib_root` (itself repository-relative). Files directly in the root
/// and hidden folders are ignored.
pub fn contributions_from_paths<'a, I>(paths: I, contrib_root: &Path) -> ChangeSet
where
    I: IntoIterator<Item = &'a str>,
{
    let mut changes = ChangeSet::default();
    for raw in paths {
        let path = Path::new(raw.trim());
        let Ok(inside) = path.strip_prefix(contrib_root) else {
            continue;
        };
        let mut components = inside.components();
        let (Some(Component::Normal(first)), Some(_)) = (components.next(), components.next())
        else {
            continue;
        };
        let name = first.to_string_lossy();
        if !name.starts_with('.') {
            changes.insert(name.into_owned());
        }
    }
    changes
}
