// src/core/resolver.rs

use crate::{
    core::expression::{ExprError, Scope},
    models::{RawValue, Value},
};
use thiserror::Error;

/// Recursion guard for branch mappings nested inside branch mappings.
const MAX_BRANCH_DEPTH: u32 = 32;

/// Errors produced while turning a `RawValue` into a concrete `Value`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// The value is keyed by branch, but the active branch is not one of the keys.
    #[error("no entry for branch '{branch}' (available: {})", .available.join(", "))]
    UnknownBranch {
        branch: String,
        available: Vec<String>,
    },
    /// The value is keyed by branch, but no branch was selected.
    #[error("value is keyed by branch but no branch was selected (available: {})", .available.join(", "))]
    NoBranchSelected { available: Vec<String> },
    /// A deferred expression failed to evaluate.
    #[error("failed to evaluate `{source_text}`: {source}")]
    ExpressionEvaluation {
        source_text: String,
        #[source]
        source: ExprError,
    },
    /// A loop entry resolved to something other than a list.
    #[error("loop values must be lists, found {found} '{value}'")]
    InvalidLoopValue { found: &'static str, value: String },
    #[error("branch mappings are nested more than {max} levels deep", max = MAX_BRANCH_DEPTH)]
    TooDeep,
}

impl ResolveError {
    /// True for the errors governed by `BranchPolicy`.
    pub fn is_branch_miss(&self) -> bool {
        matches!(
            self,
            Self::UnknownBranch { .. } | Self::NoBranchSelected { .. }
        )
    }
}

/// Resolves a raw configuration value for `branch`.
///
/// Branch mappings are followed recursively until a non-mapping value is found;
/// deferred expressions are then evaluated against `scope`.
pub fn resolve(value: &RawValue, branch: Option<&str>, scope: &dyn Scope) -> Result<Value, ResolveError> {
    let selected = select_branch(value, branch)?;
    match selected {
        RawValue::Null => Ok(Value::Null),
        RawValue::Scalar(v) => Ok(v.clone()),
        RawValue::List(items) => Ok(Value::List(items.clone())),
        RawValue::Items(items) => items
            .iter()
            .map(|item| resolve(item, branch, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        RawValue::Deferred(deferred) => {
            log::trace!("Evaluating deferred expression `{}`", deferred.source);
            deferred
                .expr
                .eval(scope)
                .map_err(|source| ResolveError::ExpressionEvaluation {
                    source_text: deferred.source.clone(),
                    source,
                })
        }
        // `select_branch` never returns a mapping.
        RawValue::Branches(_) => Err(ResolveError::TooDeep),
    }
}

/// Follows branch mappings without evaluating anything. Used to check branch
/// coverage before any command is generated.
pub fn select_branch<'v>(value: &'v RawValue, branch: Option<&str>) -> Result<&'v RawValue, ResolveError> {
    let mut current = value;
    for _ in 0..MAX_BRANCH_DEPTH {
        let RawValue::Branches(branches) = current else {
            return Ok(current);
        };
        let available = || branches.names().into_iter().map(str::to_string).collect();
        current = match branch {
            Some(name) => branches.get(name).ok_or_else(|| ResolveError::UnknownBranch {
                branch: name.to_string(),
                available: available(),
            })?,
            None => {
                return Err(ResolveError::NoBranchSelected {
                    available: available(),
                });
            }
        };
    }
    Err(ResolveError::TooDeep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expression::{self, EmptyScope};
    use crate::models::{Branches, Deferred};
    use std::collections::HashMap;

    fn branches(entries: Vec<(&str, RawValue)>) -> RawValue {
        RawValue::Branches(Branches {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        })
    }

    fn deferred(source: &str) -> RawValue {
        RawValue::Deferred(Deferred {
            source: source.to_string(),
            expr: expression::parse(source).unwrap(),
        })
    }

    #[test]
    fn test_literal_values_are_returned_unchanged() {
        let value = RawValue::Scalar(Value::Str("x".to_string()));
        assert_eq!(resolve(&value, None, &EmptyScope).unwrap(), Value::Str("x".to_string()));
        assert_eq!(resolve(&RawValue::Null, Some("cori"), &EmptyScope).unwrap(), Value::Null);
    }

    #[test]
    fn test_branch_selection_is_recursive() {
        let value = branches(vec![
            ("cori", branches(vec![("cori", RawValue::Scalar(Value::Int(10)))])),
            ("gordita", RawValue::Scalar(Value::Int(1))),
        ]);
        assert_eq!(resolve(&value, Some("cori"), &EmptyScope).unwrap(), Value::Int(10));
        assert_eq!(resolve(&value, Some("gordita"), &EmptyScope).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_unknown_branch_reports_available_keys() {
        let value = branches(vec![
            ("cori", RawValue::Scalar(Value::Int(10))),
            ("gordita", RawValue::Scalar(Value::Int(1))),
        ]);
        let err = resolve(&value, Some("edison"), &EmptyScope).unwrap_err();
        assert!(err.is_branch_miss());
        assert_eq!(
            err.to_string(),
            "no entry for branch 'edison' (available: cori, gordita)"
        );
        assert!(matches!(
            resolve(&value, None, &EmptyScope),
            Err(ResolveError::NoBranchSelected { .. })
        ));
    }

    #[test]
    fn test_deferred_expression_sees_scope() {
        let mut scope = HashMap::new();
        scope.insert("n".to_string(), Value::Int(3));
        let value = branches(vec![("cori", deferred("n * 2"))]);
        assert_eq!(resolve(&value, Some("cori"), &scope).unwrap(), Value::Int(6));

        let err = resolve(&deferred("m"), None, &scope).unwrap_err();
        assert!(!err.is_branch_miss());
        assert!(matches!(err, ResolveError::ExpressionEvaluation { .. }));
    }
}
