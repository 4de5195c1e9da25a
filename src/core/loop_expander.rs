// src/core/loop_expander.rs

use crate::{
    core::{
        env::Env,
        errors::{EntryError, Section},
        resolver::{self, ResolveError},
    },
    models::{BranchPolicy, Entries, RawValue, Value},
};
use std::sync::Arc;

/// One element of the Cartesian product: a value for every loop variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
    values: Vec<(String, Value)>,
}

impl Binding {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<(String, Value)>> for Binding {
    fn from(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }
}

/// A lazy Cartesian product over the resolved loop lists.
///
/// Works like an odometer: the last declared variable varies fastest, the
/// first one slowest. Cloning is cheap (the lists are shared), which lets the
/// same product be replayed once per option block.
#[derive(Debug, Clone)]
pub struct LoopBindings {
    dims: Arc<Vec<(String, Vec<Value>)>>,
    indices: Vec<usize>,
    emitted: usize,
    done: bool,
}

impl LoopBindings {
    pub fn new(dims: Vec<(String, Vec<Value>)>) -> Self {
        Self::new_shared(Arc::new(dims))
    }

    /// Total number of bindings, or `None` if it does not fit in a `usize`.
    pub fn total(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, (_, values)| acc.checked_mul(values.len()))
    }

    /// The loop variable names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dims.iter().map(|(name, _)| name.as_str())
    }

    /// A fresh iterator over the same product, starting from the first binding.
    pub fn restart(&self) -> Self {
        Self::new_shared(Arc::clone(&self.dims))
    }

    fn new_shared(dims: Arc<Vec<(String, Vec<Value>)>>) -> Self {
        let done = dims.iter().any(|(_, values)| values.is_empty());
        Self {
            indices: vec![0; dims.len()],
            dims,
            emitted: 0,
            done,
        }
    }

    fn advance(&mut self) {
        for (pos, (_, values)) in self.dims.iter().enumerate().rev() {
            if let Some(index) = self.indices.get_mut(pos) {
                *index += 1;
                if *index < values.len() {
                    return;
                }
                *index = 0;
            }
        }
        self.done = true;
    }
}

impl Iterator for LoopBindings {
    type Item = Binding;

    fn next(&mut self) -> Option<Binding> {
        if self.done {
            return None;
        }
        let values = self
            .dims
            .iter()
            .zip(&self.indices)
            .map(|((name, values), &index)| values.get(index).map(|v| (name.clone(), v.clone())))
            .collect::<Option<Vec<_>>>()?;
        self.advance();
        self.emitted += 1;
        Some(Binding { values })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        match self.total() {
            Some(total) => {
                let remaining = total.saturating_sub(self.emitted);
                (remaining, Some(remaining))
            }
            None => (usize::MAX, None),
        }
    }
}

/// Resolves every `loop` entry to a list and returns the lazy product over them.
///
/// Entries are resolved against `env` in declaration order. An empty `loop`
/// section yields exactly one empty binding; an empty list yields none.
/// With `BranchPolicy::Skip`, an entry without a value for `branch` is dropped
/// from the product, and so is a list element without one.
pub fn expand_loop(
    loop_spec: &Entries,
    branch: Option<&str>,
    env: &Env,
    policy: BranchPolicy,
) -> Result<LoopBindings, EntryError> {
    let mut dims = Vec::with_capacity(loop_spec.len());
    for (name, raw) in loop_spec.iter() {
        let resolved = match resolve_entry(name, raw, branch, env, policy) {
            Ok(value) => value,
            Err(e) if e.is_branch_miss() && policy == BranchPolicy::Skip => {
                log::warn!("Skipping loop variable '{}': {}", name, e);
                continue;
            }
            Err(e) => return Err(EntryError::new(Section::Loop, name, e)),
        };
        match resolved {
            Value::List(values) => {
                log::debug!("loop {} has {} value(s)", name, values.len());
                dims.push((name.to_string(), values));
            }
            other => {
                return Err(EntryError::new(
                    Section::Loop,
                    name,
                    ResolveError::InvalidLoopValue {
                        found: other.kind(),
                        value: other.to_string(),
                    },
                ));
            }
        }
    }
    Ok(LoopBindings::new(dims))
}

/// Resolves one loop entry. Elements of an unresolved list are resolved one by
/// one, so a branch miss on an element only costs that element under `Skip`.
fn resolve_entry(
    name: &str,
    raw: &RawValue,
    branch: Option<&str>,
    env: &Env,
    policy: BranchPolicy,
) -> Result<Value, ResolveError> {
    let RawValue::Items(items) = resolver::select_branch(raw, branch)? else {
        return resolver::resolve(raw, branch, env);
    };
    let mut values = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match resolver::resolve(item, branch, env) {
            Ok(value) => values.push(value),
            Err(e) if e.is_branch_miss() && policy == BranchPolicy::Skip => {
                log::warn!("Skipping element {} of loop variable '{}': {}", i, name, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(Value::List(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expression;
    use crate::models::{Branches, Deferred};

    fn deferred(source: &str) -> RawValue {
        RawValue::Deferred(Deferred {
            source: source.to_string(),
            expr: expression::parse(source).unwrap(),
        })
    }

    fn branches(entries: &[(&str, i64)]) -> RawValue {
        RawValue::Branches(Branches {
            entries: entries
                .iter()
                .map(|&(name, v)| (name.to_string(), RawValue::Scalar(Value::Int(v))))
                .collect(),
        })
    }

    fn list(values: &[i64]) -> RawValue {
        RawValue::List(values.iter().copied().map(Value::Int).collect())
    }

    fn flatten(bindings: LoopBindings) -> Vec<Vec<(String, i64)>> {
        bindings
            .map(|b| {
                b.iter()
                    .map(|(k, v)| match v {
                        Value::Int(i) => (k.to_string(), *i),
                        other => panic!("unexpected value {:?}", other),
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_empty_loop_yields_one_empty_binding() {
        let bindings = expand_loop(&Entries::new(), None, &Env::new(), BranchPolicy::Strict).unwrap();
        assert_eq!(bindings.total(), Some(1));
        let all: Vec<Binding> = bindings.collect();
        assert_eq!(all, vec![Binding::default()]);
    }

    #[test]
    fn test_product_order_first_key_varies_slowest() {
        let spec: Entries = [("a", list(&[1, 2])), ("b", list(&[10, 20, 30]))]
            .into_iter()
            .collect();
        let bindings = expand_loop(&spec, None, &Env::new(), BranchPolicy::Strict).unwrap();
        assert_eq!(bindings.size_hint(), (6, Some(6)));
        let got = flatten(bindings);
        let expected: Vec<Vec<(String, i64)>> = [(1, 10), (1, 20), (1, 30), (2, 10), (2, 20), (2, 30)]
            .iter()
            .map(|&(a, b)| vec![("a".to_string(), a), ("b".to_string(), b)])
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_product_size_is_product_of_lengths() {
        let spec: Entries = [
            ("a", list(&[1, 2, 3])),
            ("b", list(&[1, 2])),
            ("c", list(&[1, 2, 3, 4])),
        ]
        .into_iter()
        .collect();
        let bindings = expand_loop(&spec, None, &Env::new(), BranchPolicy::Strict).unwrap();
        assert_eq!(bindings.total(), Some(24));
        assert_eq!(bindings.restart().count(), 24);
        assert_eq!(bindings.count(), 24);
    }

    #[test]
    fn test_empty_list_yields_no_bindings() {
        let spec: Entries = [("a", list(&[1, 2])), ("b", list(&[]))].into_iter().collect();
        let bindings = expand_loop(&spec, None, &Env::new(), BranchPolicy::Strict).unwrap();
        assert_eq!(bindings.count(), 0);
    }

    #[test]
    fn test_loop_values_can_use_env() {
        let env: Env = [("n".to_string(), Value::Int(3))].into_iter().collect();
        let spec: Entries = [(
            "i",
            RawValue::Deferred(Deferred {
                source: "range(n)".to_string(),
                expr: expression::parse("range(n)").unwrap(),
            }),
        )]
        .into_iter()
        .collect();
        let bindings = expand_loop(&spec, None, &env, BranchPolicy::Strict).unwrap();
        let names: Vec<&str> = bindings.names().collect();
        assert_eq!(names, vec!["i"]);
        assert_eq!(bindings.count(), 3);
    }

    #[test]
    fn test_non_list_loop_value_is_rejected() {
        let spec: Entries = [("a", RawValue::Scalar(Value::Int(5)))].into_iter().collect();
        let err = expand_loop(&spec, None, &Env::new(), BranchPolicy::Skip).unwrap_err();
        assert_eq!(err.section, Section::Loop);
        assert!(matches!(
            err.source,
            ResolveError::InvalidLoopValue { found: "int", .. }
        ));
    }

    #[test]
    fn test_list_elements_are_evaluated() {
        let env: Env = [("n".to_string(), Value::Int(3))].into_iter().collect();
        let spec: Entries = [(
            "i",
            RawValue::Items(vec![deferred("n * 2"), RawValue::Scalar(Value::Int(5))]),
        )]
        .into_iter()
        .collect();
        let bindings = expand_loop(&spec, None, &env, BranchPolicy::Strict).unwrap();
        let got = flatten(bindings);
        assert_eq!(got, vec![vec![("i".to_string(), 6)], vec![("i".to_string(), 5)]]);
    }

    #[test]
    fn test_list_elements_pick_the_active_branch() {
        let spec: Entries = [(
            "i",
            RawValue::Items(vec![
                branches(&[("cori", 1), ("edison", 2)]),
                RawValue::Scalar(Value::Int(5)),
            ]),
        )]
        .into_iter()
        .collect();

        let got = flatten(expand_loop(&spec, Some("cori"), &Env::new(), BranchPolicy::Strict).unwrap());
        assert_eq!(got, vec![vec![("i".to_string(), 1)], vec![("i".to_string(), 5)]]);

        let got = flatten(expand_loop(&spec, Some("gordita"), &Env::new(), BranchPolicy::Skip).unwrap());
        assert_eq!(got, vec![vec![("i".to_string(), 5)]]);

        let err = expand_loop(&spec, Some("gordita"), &Env::new(), BranchPolicy::Strict).unwrap_err();
        assert_eq!(err.key, "i");
        assert!(matches!(err.source, ResolveError::UnknownBranch { .. }));
    }

    #[test]
    fn test_branch_miss_drops_the_dimension_when_skipping() {
        let spec: Entries = [
            ("a", list(&[1, 2])),
            (
                "nodes",
                RawValue::Branches(Branches {
                    entries: vec![("cori".to_string(), list(&[8, 16, 32]))],
                }),
            ),
        ]
        .into_iter()
        .collect();

        let full = expand_loop(&spec, Some("cori"), &Env::new(), BranchPolicy::Skip).unwrap();
        assert_eq!(full.total(), Some(6));

        let reduced = expand_loop(&spec, Some("edison"), &Env::new(), BranchPolicy::Skip).unwrap();
        let names: Vec<&str> = reduced.names().collect();
        assert_eq!(names, vec!["a"]);
        assert_eq!(
            flatten(reduced),
            vec![vec![("a".to_string(), 1)], vec![("a".to_string(), 2)]]
        );

        let err = expand_loop(&spec, Some("edison"), &Env::new(), BranchPolicy::Strict).unwrap_err();
        assert_eq!(err.section, Section::Loop);
        assert_eq!(err.key, "nodes");
        assert!(matches!(err.source, ResolveError::UnknownBranch { .. }));

        let err = expand_loop(&spec, None, &Env::new(), BranchPolicy::Strict).unwrap_err();
        assert!(matches!(err.source, ResolveError::NoBranchSelected { .. }));
    }
}
