// src/core/serializer.rs

use crate::{
    core::{
        env::Env,
        errors::{EntryError, Section},
        loop_expander::Binding,
        resolver,
    },
    models::{BranchPolicy, OptionSpec, RenderOptions, Value},
};
use std::borrow::Cow;

/// Returns the flag for an option key: `-k` for one-character keys, `--key` otherwise.
pub fn flag_token(key: &str) -> String {
    if key.chars().count() == 1 {
        format!("-{}", key)
    } else {
        format!("--{}", key)
    }
}

/// Converts one option block into argument tokens for one loop binding.
///
/// Entries are emitted in declaration order:
/// - a list becomes the flag followed by every element,
/// - `null` becomes the bare flag,
/// - anything else becomes the flag followed by its value.
///
/// Loop variables in `binding` shadow variables of the same name in `env`.
pub fn tokens(
    option_spec: &OptionSpec,
    opts: &RenderOptions,
    env: &Env,
    binding: &Binding,
) -> Result<Vec<String>, EntryError> {
    let scope = env.with_binding(binding);
    let mut tokens = Vec::with_capacity(option_spec.len() * 2);

    for (key, raw) in option_spec.iter() {
        let value = match resolver::resolve(raw, opts.branch.as_deref(), &scope) {
            Ok(value) => value,
            Err(e) if e.is_branch_miss() && opts.policy == BranchPolicy::Skip => {
                // Reported once per mode by the assembler's preflight.
                log::debug!("Omitting option '{}': {}", key, e);
                continue;
            }
            Err(e) => return Err(EntryError::new(Section::Option, key, e)),
        };

        tokens.push(flag_token(key));
        match value {
            Value::List(items) => tokens.extend(items.iter().map(Value::to_string)),
            Value::Null => {}
            other => tokens.push(other.to_string()),
        }
    }
    Ok(tokens)
}

/// Serializes one option block into a single, space-joined argument string.
pub fn serialize(
    option_spec: &OptionSpec,
    opts: &RenderOptions,
    env: &Env,
    binding: &Binding,
) -> Result<String, EntryError> {
    let tokens = tokens(option_spec, opts, env, binding)?;
    if !opts.quote {
        return Ok(tokens.join(" "));
    }
    let quoted: Vec<Cow<'_, str>> = tokens.iter().map(|token| quote_token(token)).collect();
    Ok(quoted.join(" "))
}

/// Shell-quotes a token when it needs it. Tokens that cannot be quoted (they
/// contain a NUL byte) are passed through untouched.
fn quote_token(token: &str) -> Cow<'_, str> {
    shlex::try_quote(token).unwrap_or(Cow::Borrowed(token))
}
