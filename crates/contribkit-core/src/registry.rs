//! Contribution discovery.
//!
//! Scans the contribution root once and hands out descriptors in lexical
//! folder order, optionally narrowed to a single name or a change list. The
//! change list is passed in explicitly; nothing here caches scan results.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::domain::{ChangeSet, ContributionDescriptor, ContributionId};
use crate::error::{PipelineError, Result};

/// Folder names under the root that are never contributions, besides hidden ones.
const IGNORED_DIRS: &[&str] = &["__pycache__"];

/// Which contributions a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContributionFilter {
    All,
    Named(String),
    Changed(ChangeSet),
}

impl ContributionFilter {
    /// `Changed` for a non-empty change set, otherwise `All`.
    pub fn from_change_set(changes: ChangeSet) -> Self {
        if changes.is_empty() {
            Self::All
        } else {
            Self::Changed(changes)
        }
    }
}

/// Scanner for one contribution root.
#[derive(Debug, Clone)]
pub struct ContributionRegistry {
    root: PathBuf,
    layout: LayoutConfig,
}

impl ContributionRegistry {
    pub fn new(root: impl Into<PathBuf>, layout: LayoutConfig) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// All contribution ids under the root, in lexical order.
    pub fn scan(&self) -> Result<Vec<ContributionId>> {
        if !self.root.is_dir() {
            return Err(PipelineError::RootMissing(self.root.clone()));
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "Skipping non UTF-8 folder name");
                continue;
            };
            if name.starts_with('.') || IGNORED_DIRS.contains(&name.as_str()) {
                continue;
            }
            ids.push(ContributionId::new(name));
        }
        ids.sort();
        debug!(root = %self.root.display(), count = ids.len(), "Scanned contribution root");
        Ok(ids)
    }

    /// Descriptors selected by `filter`, in lexical order.
    ///
    /// A named contribution or change-list entry without a matching folder is
    /// a `NotFound` error.
    pub fn discover(&self, filter: &ContributionFilter) -> Result<Vec<ContributionDescriptor>> {
        let ids = self.scan()?;

        let selected: Vec<ContributionId> = match filter {
            ContributionFilter::All => ids,
            ContributionFilter::Named(name) => {
                if !ids.iter().any(|id| id.as_str() == name) {
                    return Err(PipelineError::NotFound(name.clone()));
                }
                vec![ContributionId::new(name.as_str())]
            }
            ContributionFilter::Changed(changes) if changes.is_empty() => ids,
            ContributionFilter::Changed(changes) => {
                let missing: Vec<&str> = changes
                    .iter()
                    .filter(|name| !ids.iter().any(|id| id.as_str() == *name))
                    .collect();
                if !missing.is_empty() {
                    return Err(PipelineError::NotFound(missing.join(", ")));
                }
                ids.into_iter()
                    .filter(|id| changes.contains(id.as_str()))
                    .collect()
            }
        };

        Ok(selected
            .into_iter()
            .map(|id| {
                let dir = self.root.join(id.as_str());
                ContributionDescriptor::from_dir(&dir, id, &self.layout)
            })
            .collect())
    }
}

/// Shorthand for `ContributionRegistry::new(root, layout).discover(filter)`.
pub fn discover(
    root: &Path,
    layout: &LayoutConfig,
    filter: &ContributionFilter,
) -> Result<Vec<ContributionDescriptor>> {
    ContributionRegistry::new(root, layout.clone()).discover(filter)
}
