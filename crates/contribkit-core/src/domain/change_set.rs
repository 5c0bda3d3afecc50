//! Change lists: contribution names impacted by an external diff.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Ordered, de-duplicated set of contribution folder names.
///
/// An empty change set means "consider every contribution".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ChangeSet {
    names: Vec<String>,
}

impl ChangeSet {
    /// Build from names, keeping the first occurrence of each.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for name in names {
            set.insert(name.into());
        }
        set
    }

    /// Parse change-list text: one name per line, `#` comments and blank
    /// lines ignored, surrounding whitespace and trailing slashes trimmed.
    pub fn parse(text: &str) -> Self {
        Self::from_names(
            text.lines()
                .map(|line| line.split('#').next().unwrap_or("").trim())
                .map(|line| line.trim_end_matches('/'))
                .filter(|line| !line.is_empty()),
        )
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Write one name per line.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let mut text = self.names.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        std::fs::write(path, text)
    }

    pub fn insert(&mut self, name: String) -> bool {
        if self.names.contains(&name) {
            false
        } else {
            self.names.push(name);
            true
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
