//! In-process loader for contributions compiled into the host.
//!
//! Runtimes are registered by id ahead of time. Factories run under
//! `catch_unwind`, so a panicking constructor becomes an import failure.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use contribkit_core::{BuildStamp, ContributionDescriptor, ContributionId};

use super::{
    panic_message, ContributionLoader, ContributionRuntime, ExampleValue, LoadError, RuntimeError,
};

/// Constructor for a registered runtime.
pub type RuntimeFactory =
    Arc<dyn Fn() -> Result<Box<dyn ContributionRuntime>, LoadError> + Send + Sync>;

/// Loader backed by a table of in-process runtimes.
#[derive(Default, Clone)]
pub struct RegistryLoader {
    factories: HashMap<ContributionId, RuntimeFactory>,
}

impl RegistryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `id`, replacing any previous one.
    pub fn register<F>(&mut self, id: impl Into<ContributionId>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn ContributionRuntime>, LoadError> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
        self
    }

    /// Register a fixed runtime that is cloned on every load.
    pub fn register_static(&mut self, id: impl Into<ContributionId>, runtime: StaticRuntime) -> &mut Self {
        self.register(id, move || Ok(Box::new(runtime.clone()) as Box<dyn ContributionRuntime>))
    }

    pub fn contains(&self, id: &ContributionId) -> bool {
        self.factories.contains_key(id)
    }
}

impl std::fmt::Debug for RegistryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.factories.keys().map(ContributionId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("RegistryLoader").field("ids", &ids).finish()
    }
}

#[async_trait]
impl ContributionLoader for RegistryLoader {
    async fn load(
        &self,
        descriptor: &ContributionDescriptor,
        _stamp: &BuildStamp,
    ) -> Result<Box<dyn ContributionRuntime>, LoadError> {
        let factory = self.factories.get(&descriptor.id).ok_or_else(|| {
            LoadError::Import(format!("no runtime registered for `{}`", descriptor.id))
        })?;

        std::panic::catch_unwind(AssertUnwindSafe(|| factory())).unwrap_or_else(|payload| {
            Err(LoadError::Import(format!(
                "loading `{}` panicked: {}",
                descriptor.id,
                panic_message(payload.as_ref())
            )))
        })
    }
}

/// Behaviour of one [`StaticRuntime`] example.
#[derive(Debug, Clone)]
pub enum StaticBehavior {
    Return(ExampleValue),
    Fail(RuntimeError),
    Panic(String),
}

/// Runtime with canned per-example behaviour.
///
/// Usable for embedding simple contributions and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRuntime {
    examples: BTreeMap<String, StaticBehavior>,
}

impl StaticRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(mut self, example: &str, value: ExampleValue) -> Self {
        self.examples
            .insert(example.to_string(), StaticBehavior::Return(value));
        self
    }

    pub fn failing(mut self, example: &str, error: RuntimeError) -> Self {
        self.examples
            .insert(example.to_string(), StaticBehavior::Fail(error));
        self
    }

    pub fn panicking(mut self, example: &str, message: &str) -> Self {
        self.examples
            .insert(example.to_string(), StaticBehavior::Panic(message.to_string()));
        self
    }
}

#[async_trait]
impl ContributionRuntime for StaticRuntime {
    fn list_example_names(&self) -> Vec<String> {
        self.examples.keys().cloned().collect()
    }

    async fn run(&self, example: &str, _input: Option<&Path>) -> Result<ExampleValue, RuntimeError> {
        match self.examples.get(example) {
            Some(StaticBehavior::Return(value)) => Ok(value.clone()),
            Some(StaticBehavior::Fail(error)) => Err(error.clone()),
            Some(StaticBehavior::Panic(message)) => panic!("{message}"),
            None => Err(RuntimeError::Raised(format!("unknown example `{example}`"))),
        }
    }
}
