//! On-disk contribution fixtures (testing only).
//!
//! `ContributionFixture` writes a well-formed contribution folder that passes
//! structural validation; builder methods introduce the defect a test needs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::domain::{ContributionId, DType};

#[derive(Debug, Clone)]
struct FixtureExample {
    name: String,
    ndim: u32,
    dtype: DType,
}

/// Builder for a contribution folder.
#[derive(Debug, Clone)]
pub struct ContributionFixture {
    name: String,
    native: bool,
    examples: Vec<FixtureExample>,
    metadata_override: Option<String>,
    extra_files: Vec<(PathBuf, String)>,
    omitted: Vec<PathBuf>,
}

impl ContributionFixture {
    /// A pure contribution exposing one `basic` example (`ndim = 1`, `float64`).
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            native: false,
            examples: vec![FixtureExample {
                name: "basic".to_string(),
                ndim: 1,
                dtype: DType::Float64,
            }],
            metadata_override: None,
            extra_files: Vec::new(),
            omitted: Vec::new(),
        }
    }

    /// Ship a native build descriptor and declare the capability.
    pub fn native(mut self) -> Self {
        self.native = true;
        self
    }

    /// Add another declared example.
    pub fn example(mut self, name: &str, ndim: u32, dtype: DType) -> Self {
        self.examples.push(FixtureExample {
            name: name.to_string(),
            ndim,
            dtype,
        });
        self
    }

    /// Replace the generated metadata file verbatim.
    pub fn metadata(mut self, text: &str) -> Self {
        self.metadata_override = Some(text.to_string());
        self
    }

    /// Write an extra file (overrides a generated file of the same path).
    pub fn file(mut self, relative: &str, contents: &str) -> Self {
        self.extra_files.push((PathBuf::from(relative), contents.to_string()));
        self
    }

    /// Leave a generated file or folder out.
    pub fn without(mut self, relative: &str) -> Self {
        self.omitted.push(PathBuf::from(relative));
        self
    }

    pub fn id(&self) -> ContributionId {
        ContributionId::new(self.name.as_str())
    }

    /// Class name the generated module exports.
    pub fn class_name(&self) -> String {
        self.id().camel_case()
    }

    /// Generated metadata text.
    pub fn metadata_text(&self) -> String {
        if let Some(text) = &self.metadata_override {
            return text.clone();
        }
        let mut text = format!(
            "name = \"{name}\"\n\
             short_description = \"Fixture contribution {name}\"\n\
             authors = [\"Fixture Author\"]\n\
             class_name = \"{class}\"\n\
             native_extension = {native}\n",
            name = self.name,
            class = self.class_name(),
            native = self.native,
        );
        for example in &self.examples {
            text.push_str(&format!(
                "\n[[examples]]\n\
                 name = \"{ex}\"\n\
                 symbol = \"{name}:{class}.forward\"\n\
                 input = \"data/{ex}.txt\"\n\
                 output = {{ ndim = {ndim}, dtype = \"{dtype}\" }}\n",
                ex = example.name,
                name = self.name,
                class = self.class_name(),
                ndim = example.ndim,
                dtype = example.dtype,
            ));
        }
        text
    }

    fn generated_files(&self) -> Vec<(PathBuf, String)> {
        let class = self.class_name();
        let mut files = vec![
            (PathBuf::from("contribution.toml"), self.metadata_text()),
            (
                PathBuf::from("__init__.py"),
                format!("from .{} import {class}\n", self.name),
            ),
            (
                PathBuf::from(format!("{}.py", self.name)),
                format!(
                    "import numpy as np\n\n\
                     class {class}:\n\
                     \x20   def forward(self, model):\n\
                     \x20       return np.asarray(model, dtype=float)\n"
                ),
            ),
            (
                PathBuf::from("README.md"),
                format!("# {}\n\nFixture contribution.\n", self.name),
            ),
        ];
        for example in &self.examples {
            files.push((
                PathBuf::from(format!("data/{}.txt", example.name)),
                "1.0 2.0 3.0\n".to_string(),
            ));
        }
        if self.native {
            files.push((
                PathBuf::from("CMakeLists.txt"),
                format!(
                    "cmake_minimum_required(VERSION 3.18)\n\
                     project({name} LANGUAGES C)\n\
                     add_library(_{name} MODULE src/{name}.c)\n\
                     install(TARGETS _{name} DESTINATION {name})\n",
                    name = self.name
                ),
            ));
            files.push((
                PathBuf::from(format!("src/{}.c", self.name)),
                "int forward(void) { return 0; }\n".to_string(),
            ));
        }
        files
    }

    /// Write the folder under `root` and return its path.
    pub fn write(&self, root: &Path) -> io::Result<PathBuf> {
        let dir = root.join(&self.name);
        fs::create_dir_all(&dir)?;

        for (relative, contents) in self.generated_files().into_iter().chain(self.extra_files.clone()) {
            if self.is_omitted(&relative) {
                continue;
            }
            let path = dir.join(&relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, contents)?;
        }

        let data = dir.join("data");
        if !self.is_omitted(Path::new("data")) {
            fs::create_dir_all(&data)?;
        }
        Ok(dir)
    }

    fn is_omitted(&self, relative: &Path) -> bool {
        self.omitted.iter().any(|o| relative.starts_with(o))
    }
}
