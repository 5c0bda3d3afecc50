//! Contribution metadata schema (`contribution.toml`).
//!
//! ```toml
//! name = "gravity_density"
//! short_description = "Gravity forward model for a density anomaly"
//! authors = ["Jane Doe"]
//! class_name = "GravityDensity"
//! native_extension = false
//!
//! [[examples]]
//! name = "small"
//! symbol = "gravity_density:GravityDensity.forward"
//! input = "data/small.txt"
//! output = { ndim = 1, dtype = "float64" }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors raised while reading or checking metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{file}: {message}")]
    Parse { file: String, message: String },

    #[error("{file}: field `{field}`: {message}")]
    Invalid {
        file: String,
        field: String,
        message: String,
    },
}

/// Numeric element types an example output may declare.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared shape/type contract of an example's forward output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputContract {
    /// Number of dimensions (0 for a scalar).
    pub ndim: u32,
    pub dtype: DType,
}

/// One example problem exposed by a contribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExampleDecl {
    pub name: String,

    /// Entry point as `module:attribute[.attribute]`, relative to the folder.
    pub symbol: String,

    /// Example input file, relative to the contribution folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,

    pub output: OutputContract,
}

impl ExampleDecl {
    pub fn symbol_path(&self) -> Result<SymbolPath, String> {
        SymbolPath::parse(&self.symbol)
    }
}

/// Parsed `module:attribute.attribute` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolPath {
    /// Dotted module path (`pkg.module`).
    pub module: String,

    /// Attribute chain inside the module; never empty.
    pub attrs: Vec<String>,
}

impl SymbolPath {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (module, attrs) = raw
            .split_once(':')
            .ok_or_else(|| format!("`{raw}` is not of the form module:attribute"))?;

        if module.is_empty() || !module.split('.').all(is_identifier) {
            return Err(format!("`{module}` is not a valid module path"));
        }
        let attrs: Vec<String> = attrs.split('.').map(str::to_string).collect();
        if !attrs.iter().all(|a| is_identifier(a)) {
            return Err(format!("`{raw}` has an invalid attribute path"));
        }

        Ok(Self {
            module: module.to_string(),
            attrs,
        })
    }

    /// Module source file relative to the contribution folder.
    pub fn module_file(&self, extension: &str) -> PathBuf {
        let mut path: PathBuf = self.module.split('.').collect();
        path.set_extension(extension);
        path
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parsed metadata descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContributionMetadata {
    pub name: String,
    pub short_description: String,
    pub authors: Vec<String>,

    /// Exported class name; must be the CamelCase form of the folder name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    /// Capability flag: the contribution ships native extensions.
    #[serde(default)]
    pub native_extension: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licence: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,

    pub examples: Vec<ExampleDecl>,
}

impl ContributionMetadata {
    /// Read, parse and check a metadata file.
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let text = std::fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&file, &text)
    }

    /// Parse and check metadata text; `file` labels diagnostics.
    pub fn parse(file: &str, text: &str) -> Result<Self, MetadataError> {
        let metadata: Self = toml::from_str(text).map_err(|e| MetadataError::Parse {
            file: file.to_string(),
            message: e.message().to_string(),
        })?;
        metadata.check(file)?;
        Ok(metadata)
    }

    fn check(&self, file: &str) -> Result<(), MetadataError> {
        let invalid = |field: &str, message: String| MetadataError::Invalid {
            file: file.to_string(),
            field: field.to_string(),
            message,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be empty".to_string()));
        }
        if self.short_description.trim().is_empty() {
            return Err(invalid("short_description", "must not be empty".to_string()));
        }
        if self.authors.is_empty() || self.authors.iter().any(|a| a.trim().is_empty()) {
            return Err(invalid("authors", "at least one non-empty author is required".to_string()));
        }
        if self.examples.is_empty() {
            return Err(invalid("examples", "at least one example is required".to_string()));
        }

        let mut seen = HashSet::new();
        for (i, example) in self.examples.iter().enumerate() {
            let field = format!("examples[{i}]");
            if example.name.trim().is_empty() {
                return Err(invalid(&format!("{field}.name"), "must not be empty".to_string()));
            }
            if !seen.insert(example.name.as_str()) {
                return Err(invalid(
                    &format!("{field}.name"),
                    format!("duplicate example name `{}`", example.name),
                ));
            }
            example
                .symbol_path()
                .map_err(|message| invalid(&format!("{field}.symbol"), message))?;
        }
        Ok(())
    }

    pub fn example(&self, name: &str) -> Option<&ExampleDecl> {
        self.examples.iter().find(|e| e.name == name)
    }
}
