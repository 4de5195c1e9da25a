// src/core/modes.rs

use crate::{
    core::errors::GenerateError,
    models::{Document, ModeEntry},
};

/// Expands mode aliases into the list of leaf modes they name.
///
/// Traversal is depth-first, left-to-right. Any entry that is not an alias is
/// a leaf and contributes its own name. Names may repeat in the output if
/// several aliases include the same mode.
pub fn flatten_modes<S: AsRef<str>>(document: &Document, names: &[S]) -> Result<Vec<String>, GenerateError> {
    let mut flattened = Vec::new();
    let mut stack = Vec::new();
    for name in names {
        flatten_into(document, name.as_ref(), None, &mut stack, &mut flattened)?;
    }
    log::debug!("Flattened modes: {:?}", flattened);
    Ok(flattened)
}

fn flatten_into(
    document: &Document,
    name: &str,
    referenced_by: Option<&str>,
    stack: &mut Vec<String>,
    out: &mut Vec<String>,
) -> Result<(), GenerateError> {
    let entry = document
        .get(name)
        .ok_or_else(|| GenerateError::UnknownMode {
            mode: name.to_string(),
            referenced_by: referenced_by.map(str::to_string),
        })?;

    let ModeEntry::Alias(members) = entry else {
        out.push(name.to_string());
        return Ok(());
    };

    if stack.iter().any(|visited| visited == name) {
        let mut chain = stack.clone();
        chain.push(name.to_string());
        return Err(GenerateError::CyclicAlias { chain });
    }

    stack.push(name.to_string());
    for member in members {
        flatten_into(document, member, Some(name), stack, out)?;
    }
    stack.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModeSpec;

    fn alias(members: &[&str]) -> ModeEntry {
        ModeEntry::Alias(members.iter().map(|m| m.to_string()).collect())
    }

    fn leaf() -> ModeEntry {
        ModeEntry::Spec(ModeSpec::default())
    }

    fn metadata() -> Document {
        let mut doc = Document::new();
        doc.insert("a", alias(&["b", "c"]));
        doc.insert("b", alias(&["d", "e"]));
        doc.insert("c", leaf());
        doc.insert("d", alias(&["f", "g"]));
        doc.insert("e", leaf());
        doc.insert("f", leaf());
        doc.insert("g", ModeEntry::Malformed("1".to_string()));
        doc
    }

    #[test]
    fn test_flatten_is_depth_first() {
        let flat = flatten_modes(&metadata(), &["a"]).unwrap();
        assert_eq!(flat, vec!["f", "g", "e", "c"]);
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let doc = metadata();
        let once = flatten_modes(&doc, &["a", "e", "d"]).unwrap();
        let twice = flatten_modes(&doc, &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_mode_names_the_alias() {
        let mut doc = metadata();
        doc.insert("broken", alias(&["c", "nope"]));
        let err = flatten_modes(&doc, &["broken"]).unwrap_err();
        assert_eq!(
            err,
            GenerateError::UnknownMode {
                mode: "nope".to_string(),
                referenced_by: Some("broken".to_string()),
            }
        );
        assert_eq!(
            err.to_string(),
            "mode 'nope' is not defined (referenced by alias 'broken')"
        );

        let err = flatten_modes(&doc, &["missing"]).unwrap_err();
        assert_eq!(err.to_string(), "mode 'missing' is not defined");
    }

    #[test]
    fn test_cyclic_alias_is_detected() {
        let mut doc = Document::new();
        doc.insert("x", alias(&["y"]));
        doc.insert("y", alias(&["leaf", "x"]));
        doc.insert("leaf", leaf());
        let err = flatten_modes(&doc, &["x"]).unwrap_err();
        assert_eq!(
            err,
            GenerateError::CyclicAlias {
                chain: vec!["x".to_string(), "y".to_string(), "x".to_string()],
            }
        );
        assert_eq!(err.to_string(), "cyclic mode alias: x -> y -> x");
    }

    #[test]
    fn test_repeated_alias_in_siblings_is_not_a_cycle() {
        let mut doc = Document::new();
        doc.insert("both", alias(&["one", "one"]));
        doc.insert("one", alias(&["leaf"]));
        doc.insert("leaf", leaf());
        let flat = flatten_modes(&doc, &["both"]).unwrap();
        assert_eq!(flat, vec!["leaf", "leaf"]);
    }
}
