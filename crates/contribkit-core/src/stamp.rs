//! Build stamps: proof that a contribution was built from its current sources.
//!
//! The build stage writes `<build_root>/<id>/build-stamp.json` after a
//! successful build. The functional stage refuses to run unless the stamp
//! exists and its source digest matches the folder on disk.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{ContributionDescriptor, ContributionId};
use crate::error::Result;

const STAMP_FILE: &str = "build-stamp.json";

/// Folders skipped when digesting a contribution's sources.
const DIGEST_SKIP_DIRS: &[&str] = &["__pycache__", "build", ".pytest_cache"];

/// Record of one successful build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildStamp {
    pub contribution: ContributionId,

    /// SHA-256 over the contribution's source tree at build time.
    pub source_digest: String,

    /// Whether the native toolchain ran.
    pub native: bool,

    /// Where the importable artifact was installed.
    pub install_dir: PathBuf,

    pub built_at: DateTime<Utc>,
}

/// State of a contribution's stamp relative to its current sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StampState {
    Missing,
    Stale { recorded: String, current: String },
    Current(BuildStamp),
}

/// Paths under the build root, per contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    root: PathBuf,
}

impl BuildLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contribution_dir(&self, id: &ContributionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Native build tree handed to the toolchain.
    pub fn build_dir(&self, id: &ContributionId) -> PathBuf {
        self.contribution_dir(id).join("build")
    }

    /// Install prefix for the importable artifact.
    pub fn install_dir(&self, id: &ContributionId) -> PathBuf {
        self.contribution_dir(id).join("install")
    }

    pub fn stamp_path(&self, id: &ContributionId) -> PathBuf {
        self.contribution_dir(id).join(STAMP_FILE)
    }

    pub fn read_stamp(&self, id: &ContributionId) -> Result<Option<BuildStamp>> {
        let path = self.stamp_path(id);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub fn write_stamp(&self, stamp: &BuildStamp) -> Result<()> {
        let path = self.stamp_path(&stamp.contribution);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec_pretty(stamp)?)?;
        Ok(())
    }

    /// Remove a stamp if present.
    pub fn clear_stamp(&self, id: &ContributionId) -> Result<()> {
        match fs::remove_file(self.stamp_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Compare the recorded stamp against the descriptor's current sources.
    pub fn stamp_state(&self, descriptor: &ContributionDescriptor) -> Result<StampState> {
        let Some(stamp) = self.read_stamp(&descriptor.id)? else {
            return Ok(StampState::Missing);
        };
        let current = source_digest(&descriptor.root)?;
        if stamp.source_digest == current {
            Ok(StampState::Current(stamp))
        } else {
            Ok(StampState::Stale {
                recorded: stamp.source_digest,
                current,
            })
        }
    }
}

/// Deterministic SHA-256 over every source file under `root`.
///
/// Files are visited in sorted relative-path order; each contributes its path
/// and contents, NUL-separated. Hidden entries and cache folders are skipped.
pub fn source_digest(root: &Path) -> std::io::Result<String> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    for relative in &files {
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update(b"\0");
        hasher.update(fs::read(root.join(relative))?);
        hasher.update(b"\0");
    }
    Ok(hex::encode(hasher.finalize()))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            if DIGEST_SKIP_DIRS.contains(&name.as_ref()) {
                continue;
            }
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    Ok(())
}
