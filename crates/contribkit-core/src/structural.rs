//! Pre-build structural validation.
//!
//! Checks run in a fixed order and stop at the first defect:
//! 1. required files exist
//! 2. metadata parses and is well-formed (including native capability)
//! 3. example references resolve textually
//! 4. naming matches the folder-derived id
//!
//! Nothing here imports or executes contribution code, so it is safe to run
//! on untrusted, unbuilt folders.

use std::path::{Component, Path};

use regex::Regex;
use tracing::debug;

use crate::config::LayoutConfig;
use crate::domain::{
    ContributionDescriptor, ContributionMetadata, ExampleDecl, FailReason, MetadataError,
    PathKind, Stage, SymbolPath, ValidationOutcome,
};

/// A structural defect: reason plus the offending file or field.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Defect {
    reason: FailReason,
    detail: String,
}

impl Defect {
    fn new(reason: FailReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Static validator for contribution folders.
#[derive(Debug, Clone)]
pub struct StructuralValidator {
    layout: LayoutConfig,
}

impl StructuralValidator {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    /// Validate one contribution before any build step.
    pub fn validate_pre(&self, descriptor: &ContributionDescriptor) -> ValidationOutcome {
        match self.check(descriptor) {
            Ok(()) => ValidationOutcome::pass(Stage::StructuralPre),
            Err(defect) => {
                debug!(
                    contribution = %descriptor.id,
                    reason = %defect.reason,
                    detail = %defect.detail,
                    "Structural check failed"
                );
                ValidationOutcome::fail(Stage::StructuralPre, defect.reason, defect.detail)
            }
        }
    }

    fn check(&self, descriptor: &ContributionDescriptor) -> Result<(), Defect> {
        self.check_required_files(descriptor)?;
        let metadata = self.check_metadata(descriptor)?;
        self.check_examples(descriptor, &metadata)?;
        self.check_naming(descriptor, &metadata)
    }

    fn check_required_files(&self, descriptor: &ContributionDescriptor) -> Result<(), Defect> {
        for expected in &descriptor.expected {
            if !expected.is_present(&descriptor.root) {
                let kind = match expected.kind {
                    PathKind::File => "file",
                    PathKind::Dir => "directory",
                };
                return Err(Defect::new(
                    FailReason::MissingFile,
                    format!("required {kind} `{}` is missing", expected.relative.display()),
                ));
            }
        }
        Ok(())
    }

    fn check_metadata(
        &self,
        descriptor: &ContributionDescriptor,
    ) -> Result<ContributionMetadata, Defect> {
        let metadata = descriptor.load_metadata().map_err(|e| match e {
            MetadataError::Io { .. } => Defect::new(FailReason::MissingFile, e.to_string()),
            _ => Defect::new(FailReason::InvalidMetadata, e.to_string()),
        })?;

        match (metadata.native_extension, descriptor.has_native_build()) {
            (true, false) => Err(Defect::new(
                FailReason::MissingFile,
                format!(
                    "native_extension = true but `{}` is missing",
                    self.layout.native_descriptor
                ),
            )),
            (false, true) => Err(Defect::new(
                FailReason::InvalidMetadata,
                format!(
                    "{}: field `native_extension`: `{}` is present but the capability is not declared",
                    self.layout.metadata_file, self.layout.native_descriptor
                ),
            )),
            _ => Ok(metadata),
        }
    }

    fn check_examples(
        &self,
        descriptor: &ContributionDescriptor,
        metadata: &ContributionMetadata,
    ) -> Result<(), Defect> {
        for example in &metadata.examples {
            self.check_example_symbol(descriptor, example)?;
            if let Some(input) = &example.input {
                check_example_input(descriptor, &example.name, input)?;
            }
        }
        Ok(())
    }

    fn check_example_symbol(
        &self,
        descriptor: &ContributionDescriptor,
        example: &ExampleDecl,
    ) -> Result<(), Defect> {
        let dangling = |message: String| {
            Defect::new(
                FailReason::DanglingExampleReference,
                format!("example `{}`: {message}", example.name),
            )
        };

        let symbol = example.symbol_path().map_err(&dangling)?;
        let module_file = self.resolve_module(descriptor, &symbol).ok_or_else(|| {
            dangling(format!(
                "module `{}` not found (expected `{}`)",
                symbol.module,
                symbol.module_file(&self.layout.module_extension).display()
            ))
        })?;

        let source = std::fs::read_to_string(&module_file)
            .map_err(|e| dangling(format!("cannot read `{}`: {e}", module_file.display())))?;

        let (top, nested) = symbol
            .attrs
            .split_first()
            .ok_or_else(|| dangling(format!("`{}` names no attribute", example.symbol)))?;

        if !defines_top_level(&source, top) {
            return Err(dangling(format!(
                "`{top}` is not defined at the top level of `{}`",
                symbol.module
            )));
        }
        for attr in nested {
            if !defines_nested(&source, attr) {
                return Err(dangling(format!(
                    "`{attr}` (from `{}`) is not defined in `{}`",
                    example.symbol, symbol.module
                )));
            }
        }
        Ok(())
    }

    /// Module source file, as `<module>.<ext>` or a package folder with the
    /// entry module inside.
    fn resolve_module(
        &self,
        descriptor: &ContributionDescriptor,
        symbol: &SymbolPath,
    ) -> Option<std::path::PathBuf> {
        let file = descriptor
            .root
            .join(symbol.module_file(&self.layout.module_extension));
        if file.is_file() {
            return Some(file);
        }
        let package = descriptor
            .root
            .join(symbol.module.replace('.', "/"))
            .join(&self.layout.entry_module);
        package.is_file().then_some(package)
    }

    fn check_naming(
        &self,
        descriptor: &ContributionDescriptor,
        metadata: &ContributionMetadata,
    ) -> Result<(), Defect> {
        let id = &descriptor.id;
        if !id.is_snake_case() {
            return Err(Defect::new(
                FailReason::NamingMismatch,
                format!("folder name `{id}` is not snake_case"),
            ));
        }
        if metadata.name != id.as_str() {
            return Err(Defect::new(
                FailReason::NamingMismatch,
                format!(
                    "{}: field `name` is `{}` but the folder is `{id}`",
                    self.layout.metadata_file, metadata.name
                ),
            ));
        }
        if let Some(class_name) = &metadata.class_name {
            let expected = id.camel_case();
            if *class_name != expected {
                return Err(Defect::new(
                    FailReason::NamingMismatch,
                    format!(
                        "{}: field `class_name` is `{class_name}`, expected `{expected}`",
                        self.layout.metadata_file
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn check_example_input(
    descriptor: &ContributionDescriptor,
    example: &str,
    input: &Path,
) -> Result<(), Defect> {
    let escapes = input.is_absolute()
        || input
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(Defect::new(
            FailReason::DanglingExampleReference,
            format!(
                "example `{example}`: input `{}` points outside the contribution folder",
                input.display()
            ),
        ));
    }
    if !descriptor.root.join(input).is_file() {
        return Err(Defect::new(
            FailReason::DanglingExampleReference,
            format!("example `{example}`: input `{}` does not exist", input.display()),
        ));
    }
    Ok(())
}

/// `def name`, `async def name`, `class name` or `name =` at column zero.
fn defines_top_level(source: &str, name: &str) -> bool {
    let name = regex::escape(name);
    Regex::new(&format!(
        r"(?m)^(?:(?:async\s+)?def\s+{name}\s*\(|class\s+{name}\b|{name}\s*(?::[^=\n]*)?=[^=])"
    ))
    .map(|re| re.is_match(source))
    .unwrap_or(false)
}

/// An indented `def name` or `name =` anywhere in the module.
fn defines_nested(source: &str, name: &str) -> bool {
    let name = regex::escape(name);
    Regex::new(&format!(
        r"(?m)^[ \t]+(?:(?:async\s+)?def\s+{name}\s*\(|{name}\s*(?::[^=\n]*)?=[^=])"
    ))
    .map(|re| re.is_match(source))
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = "\
import numpy as np

GRID = 32

class GravityDensity:
    n_examples: int = 2

    def forward(self, model):
        return np.asarray(model)

    async def fetch(self):
        pass

def helper(x):
    return x
";

    #[test]
    fn test_top_level_definitions() {
        assert!(defines_top_level(MODULE, "GravityDensity"));
        assert!(defines_top_level(MODULE, "helper"));
        assert!(defines_top_level(MODULE, "GRID"));
        assert!(!defines_top_level(MODULE, "forward"));
        assert!(!defines_top_level(MODULE, "Gravity"));
        assert!(!defines_top_level(MODULE, "np"));
    }

    #[test]
    fn test_nested_definitions() {
        assert!(defines_nested(MODULE, "forward"));
        assert!(defines_nested(MODULE, "fetch"));
        assert!(defines_nested(MODULE, "n_examples"));
        assert!(!defines_nested(MODULE, "helper"));
        assert!(!defines_nested(MODULE, "inverse"));
    }

    #[test]
    fn test_comparison_is_not_assignment() {
        let source = "if GRID == 3:\n    pass\n";
        assert!(!defines_top_level(source, "GRID"));
    }
}
