// src/core/env.rs

use crate::{
    core::{
        errors::{EntryError, Section},
        expression::{EmptyScope, Scope},
        loop_expander::Binding,
        resolver,
    },
    models::{BranchPolicy, Entries, Value},
};
use std::collections::HashMap;

/// The variables of one mode, resolved for one branch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Env {
    vars: HashMap<String, Value>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// A scope in which `binding` shadows these variables.
    pub fn with_binding<'a>(&'a self, binding: &'a Binding) -> LayeredScope<'a> {
        LayeredScope { env: self, binding }
    }
}

impl FromIterator<(String, Value)> for Env {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

impl Scope for Env {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

/// Loop variables layered over the mode's variables.
#[derive(Debug, Clone, Copy)]
pub struct LayeredScope<'a> {
    env: &'a Env,
    binding: &'a Binding,
}

impl Scope for LayeredScope<'_> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.binding.get(name).or_else(|| self.env.get(name))
    }
}

/// Builds the variable environment from a `var` section.
///
/// Every entry is resolved against an empty scope: a variable cannot refer to
/// another variable. With `BranchPolicy::Skip`, entries that have no value for
/// `branch` are left undefined.
pub fn build_env(var_spec: &Entries, branch: Option<&str>, policy: BranchPolicy) -> Result<Env, EntryError> {
    let mut vars = HashMap::with_capacity(var_spec.len());
    for (name, raw) in var_spec.iter() {
        match resolver::resolve(raw, branch, &EmptyScope) {
            Ok(value) => {
                log::debug!("var {} = {}", name, value);
                vars.insert(name.to_string(), value);
            }
            Err(e) if e.is_branch_miss() && policy == BranchPolicy::Skip => {
                log::warn!("Skipping var '{}': {}", name, e);
            }
            Err(e) => return Err(EntryError::new(Section::Var, name, e)),
        }
    }
    Ok(Env { vars })
}
