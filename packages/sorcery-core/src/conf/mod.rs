//! Structured text configuration files.
//!
//! Sectioned `key = value` files with `;` comments and template sections:
//!
//! ```text
//! [base](!)
//! codecs = ulaw
//!
//! [alice](base)
//! port = 5060
//! ```
//!
//! Used both for the mapping file and by the config-file backend.

mod parser;

use std::path::Path;

use thiserror::Error;

use crate::objectset::ObjectSet;

pub use parser::parse;

/// Errors raised while reading structured text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfError {
    /// Key/value line outside of any section
    #[error("line {line}: value outside of any section")]
    NoSection { line: usize },

    /// Malformed section header
    #[error("line {line}: malformed section header '{text}'")]
    BadHeader { line: usize, text: String },

    /// Line that is neither a header, a comment nor a key/value pair
    #[error("line {line}: expected 'key = value', got '{text}'")]
    BadLine { line: usize, text: String },

    /// Section inherits from a template that does not precede it
    #[error("line {line}: unknown template '{template}'")]
    UnknownTemplate { line: usize, template: String },

    /// File could not be read
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },
}

/// One `[section]` of a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    name: String,
    template: bool,
    variables: ObjectSet,
}

impl Category {
    pub(crate) fn new(name: String, template: bool) -> Self {
        Self {
            name,
            template,
            variables: ObjectSet::new(),
        }
    }

    /// Section name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the section was declared with `(!)`.
    pub fn is_template(&self) -> bool {
        self.template
    }

    /// Key/value pairs in file order, inherited values first.
    pub fn variables(&self) -> &ObjectSet {
        &self.variables
    }

    pub(crate) fn variables_mut(&mut self) -> &mut ObjectSet {
        &mut self.variables
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfFile {
    categories: Vec<Category>,
}

impl ConfFile {
    /// Reads and parses a file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        parse(&text)
    }

    pub(crate) fn push(&mut self, category: Category) {
        self.categories.push(category);
    }

    /// All sections in file order, templates included.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Non-template sections in file order.
    pub fn objects(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| !c.template)
    }

    /// First section with the given name.
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Variables of the first section with the given name.
    pub fn section(&self, name: &str) -> Option<&ObjectSet> {
        self.category(name).map(Category::variables)
    }
}
