//! Contribution identity and on-disk descriptor.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::metadata::{ContributionMetadata, MetadataError};
use crate::config::LayoutConfig;

/// Stable identifier of one contribution, taken from its folder name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ContributionId(String);

impl ContributionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` for lower-case snake_case names starting with a letter.
    pub fn is_snake_case(&self) -> bool {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {}
            _ => return false,
        }
        !self.0.ends_with('_')
            && !self.0.contains("__")
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    /// CamelCase class name conventionally exported by the contribution
    /// (`gravity_density` -> `GravityDensity`).
    pub fn camel_case(&self) -> String {
        self.0
            .split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect()
    }
}

impl std::fmt::Display for ContributionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContributionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Whether an expected path is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Dir,
}

/// A path the layout schema requires inside a contribution folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedPath {
    /// Path relative to the contribution root.
    pub relative: PathBuf,
    pub kind: PathKind,
}

impl ExpectedPath {
    fn file(relative: impl Into<PathBuf>) -> Self {
        Self {
            relative: relative.into(),
            kind: PathKind::File,
        }
    }

    fn dir(relative: impl Into<PathBuf>) -> Self {
        Self {
            relative: relative.into(),
            kind: PathKind::Dir,
        }
    }

    /// Whether the path exists under `root` with the expected kind.
    pub fn is_present(&self, root: &Path) -> bool {
        let path = root.join(&self.relative);
        match self.kind {
            PathKind::File => path.is_file(),
            PathKind::Dir => path.is_dir(),
        }
    }
}

/// On-disk view of one contribution, created once per run by the registry.
///
/// Stages only read it; metadata is parsed on demand so a malformed file is a
/// per-contribution defect rather than a discovery failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionDescriptor {
    pub id: ContributionId,

    /// Contribution folder.
    pub root: PathBuf,

    /// Metadata descriptor file.
    pub metadata_path: PathBuf,

    /// Primary entry-point module.
    pub entry_module: PathBuf,

    /// Native build descriptor, when one exists on disk.
    pub native_descriptor: Option<PathBuf>,

    /// Paths the layout schema requires, checked in order.
    pub expected: Vec<ExpectedPath>,
}

impl ContributionDescriptor {
    /// Describe the folder `root` according to `layout`.
    pub fn from_dir(root: &Path, id: ContributionId, layout: &LayoutConfig) -> Self {
        let native = root.join(&layout.native_descriptor);

        let mut expected = vec![
            ExpectedPath::file(&layout.metadata_file),
            ExpectedPath::file(&layout.entry_module),
            ExpectedPath::dir(&layout.data_dir),
        ];
        expected.extend(layout.extra_required.iter().map(ExpectedPath::file));

        Self {
            id,
            root: root.to_path_buf(),
            metadata_path: root.join(&layout.metadata_file),
            entry_module: root.join(&layout.entry_module),
            native_descriptor: native.is_file().then_some(native),
            expected,
        }
    }

    /// Whether the contribution ships a native build descriptor.
    pub fn has_native_build(&self) -> bool {
        self.native_descriptor.is_some()
    }

    /// Read and parse the metadata descriptor.
    pub fn load_metadata(&self) -> Result<ContributionMetadata, MetadataError> {
        ContributionMetadata::from_file(&self.metadata_path)
    }
}
