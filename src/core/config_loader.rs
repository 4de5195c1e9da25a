//! # Config Loader
//!
//! Reads the YAML metadata file and converts it into a typed `Document`.
//!
//! `serde_yaml::Mapping` keeps keys in the order they appear in the file, which
//! matters twice: option keys are emitted in declaration order, and the first
//! `loop` key varies slowest. YAML merge keys (`<<: *anchor`) are applied before
//! conversion, so anchors can be used to share option blocks between modes.
//!
//! Every `"eval <expr>"` string is parsed here, once. A syntax error is a load
//! error naming the mode and the entry it was found in.
//!
//! Elements of a `loop` list may themselves be `eval` strings or branch
//! mappings; everywhere else list elements are plain values.

use crate::{
    constants::{EVAL_PREFIX, MODE_SPEC_FIELDS},
    core::{
        errors::Section,
        expression::{self, ExprError},
    },
    models::{Branches, Deferred, Document, Entries, ModeEntry, ModeSpec, OptionSpec, RawValue, Value},
};
use serde_yaml::{Mapping, Value as Yaml};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Errors that can occur while loading the YAML metadata file.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The content is not valid YAML.
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// The document root is not a mapping of mode names.
    #[error("the top level of the document must be a mapping of modes, found {found}")]
    NotAMapping { found: &'static str },
    /// A mapping key is not a scalar.
    #[error("{context}: keys must be strings, numbers or booleans, found {found}")]
    InvalidKey { context: String, found: &'static str },
    /// A mode spec field is missing, unknown, or has the wrong shape.
    #[error("mode '{mode}': {message}")]
    InvalidField { mode: String, message: String },
    /// An `eval` expression does not parse.
    #[error("mode '{mode}', {section} '{key}': invalid expression `{source_text}`: {source}")]
    Expression {
        mode: String,
        section: Section,
        key: String,
        source_text: String,
        #[source]
        source: ExprError,
    },
}

type Result<T> = std::result::Result<T, LoadError>;

/// Loads a document from a YAML file.
pub fn load_file(path: &Path) -> Result<Document> {
    log::debug!("Loading metadata from {}", path.display());
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_str(&content)
}

/// Loads a document from YAML text.
pub fn load_str(content: &str) -> Result<Document> {
    let mut root: Yaml = serde_yaml::from_str(content)?;
    root.apply_merge()?;
    from_yaml(root)
}

/// Converts an already parsed YAML value into a document.
pub fn from_yaml(root: Yaml) -> Result<Document> {
    let mapping = match root {
        Yaml::Mapping(mapping) => mapping,
        // An empty file.
        Yaml::Null => Mapping::new(),
        other => return Err(LoadError::NotAMapping { found: yaml_kind(&other) }),
    };

    let mut document = Document::new();
    for (key, value) in mapping {
        let name = key_to_string(&key).ok_or_else(|| LoadError::InvalidKey {
            context: "top level".to_string(),
            found: yaml_kind(&key),
        })?;
        let entry = mode_entry(&name, value)?;
        log::trace!("Loaded '{}' as {}", name, entry_kind(&entry));
        document.insert(name, entry);
    }
    log::debug!("Loaded {} top-level entries", document.len());
    Ok(document)
}

// --- TOP-LEVEL ENTRIES ---

/// Classifies a top-level entry.
///
/// A mapping with a `command` or `option` field is a mode spec. A list of
/// strings is an alias. Everything else (for example a mapping that only
/// exists to hold anchors) is kept as `Malformed`, and so is a mode spec with
/// a missing or ill-shaped field: it only fails if it is requested. Expression
/// syntax errors still fail the load.
fn mode_entry(name: &str, value: Yaml) -> Result<ModeEntry> {
    match value {
        Yaml::Mapping(mapping) if is_mode_spec(&mapping) => match mode_spec(name, mapping) {
            Ok(spec) => Ok(ModeEntry::Spec(spec)),
            Err(e @ LoadError::Expression { .. }) => Err(e),
            Err(LoadError::InvalidField { message, .. }) => {
                log::debug!("'{}' is not a usable mode spec: {}", name, message);
                Ok(ModeEntry::Malformed(message))
            }
            Err(e) => Ok(ModeEntry::Malformed(e.to_string())),
        },
        Yaml::Sequence(items) => {
            let members: Option<Vec<String>> = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect();
            Ok(match members {
                Some(members) => ModeEntry::Alias(members),
                None => ModeEntry::Malformed("an alias must be a list of mode names".to_string()),
            })
        }
        Yaml::Tagged(tagged) => mode_entry(name, tagged.value),
        other => Ok(ModeEntry::Malformed(format!(
            "expected a mode spec or a list of mode names, found {}",
            yaml_kind(&other)
        ))),
    }
}

fn is_mode_spec(mapping: &Mapping) -> bool {
    mapping.contains_key("command") || mapping.contains_key("option")
}

fn mode_spec(mode: &str, mapping: Mapping) -> Result<ModeSpec> {
    let invalid = |message: String| LoadError::InvalidField {
        mode: mode.to_string(),
        message,
    };

    let mut command = None;
    let mut option = None;
    let mut spec = ModeSpec::default();

    for (key, value) in mapping {
        let field = key.as_str().unwrap_or_default();
        match field {
            "command" => match value {
                Yaml::String(s) => command = Some(s),
                other => {
                    return Err(invalid(format!(
                        "`command` must be a string, found {}",
                        yaml_kind(&other)
                    )));
                }
            },
            "option" => option = Some(option_blocks(mode, value)?),
            "var" => spec.var = section_entries(mode, Section::Var, value)?,
            "loop" => spec.r#loop = section_entries(mode, Section::Loop, value)?,
            _ => {
                let shown = key_to_string(&key).unwrap_or_else(|| yaml_kind(&key).to_string());
                log::warn!(
                    "Mode '{}': ignoring unknown field `{}` (expected one of {})",
                    mode,
                    shown,
                    MODE_SPEC_FIELDS.join(", ")
                );
            }
        }
    }

    spec.command = command.ok_or_else(|| invalid("missing field `command`".to_string()))?;
    spec.option = option.ok_or_else(|| invalid("missing field `option`".to_string()))?;
    Ok(spec)
}

/// `option` is a list of mappings. A single mapping is one block.
fn option_blocks(mode: &str, value: Yaml) -> Result<Vec<OptionSpec>> {
    match value {
        Yaml::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Yaml::Mapping(block) => entries(mode, Section::Option, block),
                Yaml::Null => Ok(OptionSpec::new()),
                other => Err(LoadError::InvalidField {
                    mode: mode.to_string(),
                    message: format!("option block {} must be a mapping, found {}", i, yaml_kind(&other)),
                }),
            })
            .collect(),
        Yaml::Mapping(block) => Ok(vec![entries(mode, Section::Option, block)?]),
        other => Err(LoadError::InvalidField {
            mode: mode.to_string(),
            message: format!("`option` must be a list of mappings, found {}", yaml_kind(&other)),
        }),
    }
}

/// `var` and `loop` are optional mappings; `null` means empty.
fn section_entries(mode: &str, section: Section, value: Yaml) -> Result<Entries> {
    match value {
        Yaml::Mapping(mapping) => entries(mode, section, mapping),
        Yaml::Null => Ok(Entries::new()),
        other => Err(LoadError::InvalidField {
            mode: mode.to_string(),
            message: format!("`{}` must be a mapping, found {}", section, yaml_kind(&other)),
        }),
    }
}

fn entries(mode: &str, section: Section, mapping: Mapping) -> Result<Entries> {
    let mut entries = Entries::new();
    for (key, value) in mapping {
        let name = key_to_string(&key).ok_or_else(|| LoadError::InvalidKey {
            context: format!("mode '{}', {}", mode, section),
            found: yaml_kind(&key),
        })?;
        let ctx = EntryContext {
            mode,
            section,
            key: &name,
        };
        let raw = raw_value(&ctx, value)?;
        entries.push(name, raw);
    }
    Ok(entries)
}

// --- VALUES ---

/// Where a value was found, for error messages.
struct EntryContext<'a> {
    mode: &'a str,
    section: Section,
    key: &'a str,
}

impl EntryContext<'_> {
    fn invalid(&self, message: String) -> LoadError {
        LoadError::InvalidField {
            mode: self.mode.to_string(),
            message: format!("{} '{}': {}", self.section, self.key, message),
        }
    }
}

fn raw_value(ctx: &EntryContext<'_>, value: Yaml) -> Result<RawValue> {
    match value {
        Yaml::Null => Ok(RawValue::Null),
        Yaml::String(s) => match s.strip_prefix(EVAL_PREFIX) {
            Some(source) => deferred(ctx, source).map(RawValue::Deferred),
            None => Ok(RawValue::Scalar(Value::Str(s))),
        },
        Yaml::Sequence(items) if ctx.section == Section::Loop && items.iter().any(needs_resolving) => items
            .into_iter()
            .map(|item| raw_value(ctx, item))
            .collect::<Result<Vec<_>>>()
            .map(RawValue::Items),
        Yaml::Sequence(items) => items
            .into_iter()
            .map(|item| concrete(ctx, item))
            .collect::<Result<Vec<_>>>()
            .map(RawValue::List),
        Yaml::Mapping(mapping) => {
            let mut entries = Vec::with_capacity(mapping.len());
            for (key, value) in mapping {
                let branch = key_to_string(&key).ok_or_else(|| LoadError::InvalidKey {
                    context: format!("mode '{}', {} '{}'", ctx.mode, ctx.section, ctx.key),
                    found: yaml_kind(&key),
                })?;
                entries.push((branch, raw_value(ctx, value)?));
            }
            Ok(RawValue::Branches(Branches { entries }))
        }
        Yaml::Tagged(tagged) => raw_value(ctx, tagged.value),
        scalar => concrete(ctx, scalar).map(RawValue::Scalar),
    }
}

/// True for a list element that is an `eval` string or a branch mapping.
fn needs_resolving(item: &Yaml) -> bool {
    match item {
        Yaml::String(s) => s.starts_with(EVAL_PREFIX),
        Yaml::Mapping(_) => true,
        Yaml::Tagged(tagged) => needs_resolving(&tagged.value),
        _ => false,
    }
}

fn deferred(ctx: &EntryContext<'_>, source: &str) -> Result<Deferred> {
    let expr = expression::parse(source).map_err(|e| LoadError::Expression {
        mode: ctx.mode.to_string(),
        section: ctx.section,
        key: ctx.key.to_string(),
        source_text: source.to_string(),
        source: e,
    })?;
    Ok(Deferred {
        source: source.to_string(),
        expr,
    })
}

/// Converts a list element. Outside `loop`, lists hold plain values only: no
/// branches and no expressions.
fn concrete(ctx: &EntryContext<'_>, value: Yaml) -> Result<Value> {
    match value {
        Yaml::Null => Ok(Value::Null),
        Yaml::Bool(b) => Ok(Value::Bool(b)),
        Yaml::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Value::Int(i)),
            (None, Some(f)) => Ok(Value::Float(f)),
            (None, None) => Err(ctx.invalid(format!("unsupported number {}", n))),
        },
        Yaml::String(s) => Ok(Value::Str(s)),
        Yaml::Sequence(items) => items
            .into_iter()
            .map(|item| concrete(ctx, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Yaml::Mapping(_) => Err(ctx.invalid("list elements cannot be mappings".to_string())),
        Yaml::Tagged(tagged) => concrete(ctx, tagged.value),
    }
}

// --- HELPERS ---

/// Scalar keys become strings: `1` → `"1"`, `true` → `"true"`.
fn key_to_string(key: &Yaml) -> Option<String> {
    match key {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        Yaml::Null => Some("null".to_string()),
        Yaml::Tagged(tagged) => key_to_string(&tagged.value),
        Yaml::Sequence(_) | Yaml::Mapping(_) => None,
    }
}

fn yaml_kind(value: &Yaml) -> &'static str {
    match value {
        Yaml::Null => "null",
        Yaml::Bool(_) => "a boolean",
        Yaml::Number(_) => "a number",
        Yaml::String(_) => "a string",
        Yaml::Sequence(_) => "a list",
        Yaml::Mapping(_) => "a mapping",
        Yaml::Tagged(_) => "a tagged value",
    }
}

fn entry_kind(entry: &ModeEntry) -> &'static str {
    match entry {
        ModeEntry::Spec(_) => "mode spec",
        ModeEntry::Alias(_) => "alias",
        ModeEntry::Malformed(_) => "malformed entry",
    }
}
