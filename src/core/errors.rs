// src/core/errors.rs

use crate::core::resolver::ResolveError;
use std::fmt;
use thiserror::Error;

/// The part of a mode spec an entry was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Var,
    Loop,
    Option,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Var => "var",
            Self::Loop => "loop",
            Self::Option => "option",
        };
        f.write_str(name)
    }
}

/// A resolution failure tied to one `key` of one section.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{section} '{key}': {source}")]
pub struct EntryError {
    pub section: Section,
    pub key: String,
    #[source]
    pub source: ResolveError,
}

impl EntryError {
    pub fn new(section: Section, key: impl Into<String>, source: ResolveError) -> Self {
        Self {
            section,
            key: key.into(),
            source,
        }
    }
}

/// Errors that abort command generation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerateError {
    #[error("mode '{mode}' is not defined{}", referenced_by_suffix(.referenced_by))]
    UnknownMode {
        mode: String,
        /// The alias whose list named the missing mode, if any.
        referenced_by: Option<String>,
    },
    #[error("cyclic mode alias: {}", .chain.join(" -> "))]
    CyclicAlias { chain: Vec<String> },
    #[error("mode '{mode}' cannot generate commands: {reason}")]
    MalformedMode { mode: String, reason: String },
    #[error("in mode '{mode}': {source}")]
    Entry {
        mode: String,
        #[source]
        source: EntryError,
    },
}

fn referenced_by_suffix(alias: &Option<String>) -> String {
    alias
        .as_ref()
        .map(|alias| format!(" (referenced by alias '{}')", alias))
        .unwrap_or_default()
}
