// src/models.rs

use crate::core::expression::Expr;
use std::collections::HashMap;
use std::fmt;

// --- CONCRETE VALUES ---
// What a configuration value becomes once the branch has been selected and any
// deferred expression has been evaluated.

/// A fully resolved value, ready to be turned into argument tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An explicit YAML `null` (or `None` in an expression).
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(String),
    /// A list of values.
    List(Vec<Value>),
}

impl Value {
    /// A short, human readable name for the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }
}

/// Renders a value the way it appears on a command line.
///
/// Booleans print as `True`/`False` and null as `None`, the same spelling the
/// expression language uses for them. Floats always carry a fractional part
/// (`1.0`, not `1`) so that a value read as `1.0` from YAML is passed through
/// unchanged.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Self::Str(s) => write!(f, "{}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

// --- RAW CONFIGURATION VALUES ---

/// A deferred expression: the original text after the `eval ` marker, plus its
/// parsed form. Parsing happens once, at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct Deferred {
    pub source: String,
    pub expr: Expr,
}

/// A configuration value as written in the document, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// `null`: a bare flag with no value token.
    Null,
    /// A literal scalar (never `Value::List` or `Value::Null`).
    Scalar(Value),
    /// A list of literal values; each element becomes one token.
    List(Vec<Value>),
    /// A `loop` list whose elements still need resolving: some are `eval`
    /// strings or branch mappings.
    Items(Vec<RawValue>),
    /// A mapping from branch name to the value used on that branch.
    Branches(Branches),
    /// An `eval <expr>` string.
    Deferred(Deferred),
}

/// An ordered set of branch-specific alternatives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Branches {
    pub entries: Vec<(String, RawValue)>,
}

impl Branches {
    pub fn get(&self, branch: &str) -> Option<&RawValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == branch)
            .map(|(_, value)| value)
    }

    /// The branch names, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// An ordered sequence of `key: value` pairs. Used for option blocks, `var`
/// and `loop` sections, where declaration order is significant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entries {
    pub entries: Vec<(String, RawValue)>,
}

impl Entries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, keeping declaration order.
    pub fn push(&mut self, key: impl Into<String>, value: RawValue) {
        self.entries.push((key.into(), value));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, RawValue)> for Entries {
    fn from_iter<I: IntoIterator<Item = (K, RawValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// One option block. Each key becomes a flag, each value its argument(s).
pub type OptionSpec = Entries;

// --- DOCUMENT MODELS ---

/// A mode that produces commands.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModeSpec {
    pub command: String,
    pub option: Vec<OptionSpec>,
    pub var: Entries,
    pub r#loop: Entries,
}

/// A top-level entry of the configuration document.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeEntry {
    Spec(ModeSpec),
    /// A list of other mode names.
    Alias(Vec<String>),
    /// Any other top-level entry. Only an error if a requested mode resolves to it.
    Malformed(String),
}

/// The whole configuration document: an ordered set of named modes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    entries: Vec<(String, ModeEntry)>,
    index: HashMap<String, usize>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a mode. A later insert with the same name replaces the earlier
    /// entry in place.
    pub fn insert(&mut self, name: impl Into<String>, entry: ModeEntry) {
        let name = name.into();
        if let Some(&pos) = self.index.get(&name) {
            if let Some(slot) = self.entries.get_mut(pos) {
                slot.1 = entry;
            }
            return;
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, entry));
    }

    pub fn get(&self, name: &str) -> Option<&ModeEntry> {
        self.index
            .get(name)
            .and_then(|&pos| self.entries.get(pos))
            .map(|(_, entry)| entry)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModeEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// --- GENERATION SETTINGS ---

/// What to do when a branch-keyed value has no entry for the active branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchPolicy {
    /// Log a warning and leave out that entry's contribution.
    #[default]
    Skip,
    /// Abort generation with an error.
    Strict,
}

/// Options that shape how argument strings are rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub branch: Option<String>,
    pub policy: BranchPolicy,
    /// Shell-quote tokens that contain whitespace or shell metacharacters.
    pub quote: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display_matches_command_line_rendering() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Bool(false).to_string(), "False");
        assert_eq!(Value::Null.to_string(), "None");
        let nested = Value::List(vec![Value::Int(1), Value::Str("a".to_string())]);
        assert_eq!(nested.to_string(), "[1, a]");
        let mixed = Value::List(vec![Value::Bool(false), Value::Null]);
        assert_eq!(mixed.to_string(), "[False, None]");
    }

    #[test]
    fn test_document_preserves_insertion_order_and_replaces_in_place() {
        let mut doc = Document::new();
        doc.insert("b", ModeEntry::Alias(vec![]));
        doc.insert("a", ModeEntry::Alias(vec![]));
        doc.insert("b", ModeEntry::Malformed("x".to_string()));
        let names: Vec<&str> = doc.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(matches!(doc.get("b"), Some(ModeEntry::Malformed(_))));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_branches_lookup() {
        let branches = Branches {
            entries: vec![
                ("cori".to_string(), RawValue::Scalar(Value::Int(10))),
                ("gordita".to_string(), RawValue::Scalar(Value::Int(1))),
            ],
        };
        assert_eq!(
            branches.get("gordita"),
            Some(&RawValue::Scalar(Value::Int(1)))
        );
        assert!(branches.get("edison").is_none());
        assert_eq!(branches.names(), vec!["cori", "gordita"]);
    }
}
