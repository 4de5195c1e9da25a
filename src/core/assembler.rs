//! # Assembler
//!
//! Turns a list of modes into command lines. Work happens in two phases:
//!
//! 1. **Preparation** (eager, parallel): for every mode, the `var` section is
//!    resolved, the `loop` lists are resolved and every option value is checked
//!    for branch coverage. Each mode reads only its own subtree of the document,
//!    so modes are prepared in parallel with `rayon`. Any structural error is
//!    reported here, before a single command has been produced.
//!
//! 2. **Generation** (lazy): `Commands` walks modes, then option blocks, then
//!    loop bindings, serializing one command per step. Nothing is buffered, so
//!    arbitrarily large products can be streamed to disk.

use crate::{
    core::{
        env::{self, Env},
        errors::{EntryError, GenerateError, Section},
        loop_expander::{self, LoopBindings},
        modes, resolver, serializer,
    },
    models::{BranchPolicy, Document, ModeEntry, ModeSpec, RenderOptions},
};
use rayon::prelude::*;

/// A mode whose variables and loop lists have been resolved.
#[derive(Debug)]
pub struct PreparedMode<'a> {
    pub name: String,
    pub spec: &'a ModeSpec,
    pub env: Env,
    pub bindings: LoopBindings,
}

impl PreparedMode<'_> {
    /// Number of commands this mode will produce, if it fits in a `usize`.
    pub fn command_count(&self) -> Option<usize> {
        self.bindings
            .total()
            .and_then(|per_block| per_block.checked_mul(self.spec.option.len()))
    }
}

/// Flattens `requested` and assembles the commands of every resulting mode.
pub fn generate<'a, S: AsRef<str>>(
    document: &'a Document,
    requested: &[S],
    opts: &RenderOptions,
) -> Result<Commands<'a>, GenerateError> {
    let flat = modes::flatten_modes(document, requested)?;
    assemble(document, &flat, opts)
}

/// Prepares every mode in `flat_modes` and returns the lazy command stream.
///
/// Output order is mode, then option block, then loop binding.
pub fn assemble<'a, S: AsRef<str> + Sync>(
    document: &'a Document,
    flat_modes: &[S],
    opts: &RenderOptions,
) -> Result<Commands<'a>, GenerateError> {
    let prepared = flat_modes
        .par_iter()
        .map(|name| prepare_mode(document, name.as_ref(), opts))
        .collect::<Vec<_>>()
        // Sequential collect keeps the first error in mode order.
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Commands {
        modes: prepared.into_iter(),
        current: None,
        opts: opts.clone(),
        failed: false,
    })
}

/// Resolves the `var` and `loop` sections of one mode and checks that every
/// option value has an entry for the active branch.
pub fn prepare_mode<'a>(
    document: &'a Document,
    name: &str,
    opts: &RenderOptions,
) -> Result<PreparedMode<'a>, GenerateError> {
    let spec = match document.get(name) {
        Some(ModeEntry::Spec(spec)) => spec,
        Some(ModeEntry::Alias(_)) => {
            return Err(GenerateError::MalformedMode {
                mode: name.to_string(),
                reason: "it is an alias and must be flattened first".to_string(),
            });
        }
        Some(ModeEntry::Malformed(reason)) => {
            return Err(GenerateError::MalformedMode {
                mode: name.to_string(),
                reason: reason.clone(),
            });
        }
        None => {
            return Err(GenerateError::UnknownMode {
                mode: name.to_string(),
                referenced_by: None,
            });
        }
    };

    let in_mode = |source: EntryError| GenerateError::Entry {
        mode: name.to_string(),
        source,
    };
    let branch = opts.branch.as_deref();

    let env = env::build_env(&spec.var, branch, opts.policy).map_err(in_mode)?;
    let bindings = loop_expander::expand_loop(&spec.r#loop, branch, &env, opts.policy).map_err(in_mode)?;
    check_option_branches(name, spec, opts).map_err(in_mode)?;

    log::debug!(
        "Prepared mode '{}': {} var(s), {:?} binding(s) per option block",
        name,
        env.len(),
        bindings.total()
    );

    Ok(PreparedMode {
        name: name.to_string(),
        spec,
        env,
        bindings,
    })
}

/// Walks every option value down to its branch. Misses are warned about once
/// here, rather than once per generated command.
fn check_option_branches(name: &str, spec: &ModeSpec, opts: &RenderOptions) -> Result<(), EntryError> {
    for block in &spec.option {
        for (key, raw) in block.iter() {
            match resolver::select_branch(raw, opts.branch.as_deref()) {
                Ok(_) => {}
                Err(e) if opts.policy == BranchPolicy::Skip => {
                    log::warn!("Mode '{}': omitting option '{}': {}", name, key, e);
                }
                Err(e) => return Err(EntryError::new(Section::Option, key, e)),
            }
        }
    }
    Ok(())
}

/// Joins a command with its argument string.
fn join_command(command: &str, args: &str) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args)
    }
}

/// Position inside one prepared mode.
#[derive(Debug)]
struct ModeCursor<'a> {
    mode: PreparedMode<'a>,
    block: usize,
    bindings: LoopBindings,
}

/// The lazy stream of generated commands.
///
/// Yields `Err` at most once; the stream ends after an error.
#[derive(Debug)]
pub struct Commands<'a> {
    modes: std::vec::IntoIter<PreparedMode<'a>>,
    current: Option<ModeCursor<'a>>,
    opts: RenderOptions,
    failed: bool,
}

impl Commands<'_> {
    /// Number of commands still to come, if it fits in a `usize`.
    pub fn remaining(&self) -> Option<usize> {
        let pending = self
            .modes
            .as_slice()
            .iter()
            .try_fold(0usize, |acc, mode| acc.checked_add(mode.command_count()?));
        let in_progress = match &self.current {
            Some(cursor) => {
                let later_blocks = cursor.mode.spec.option.len().saturating_sub(cursor.block + 1);
                let per_block = cursor.mode.bindings.total()?;
                per_block
                    .checked_mul(later_blocks)?
                    .checked_add(cursor.bindings.size_hint().0)?
            }
            None => 0,
        };
        pending?.checked_add(in_progress)
    }
}

impl Iterator for Commands<'_> {
    type Item = Result<String, GenerateError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }

            let Some(cursor) = self.current.as_mut() else {
                let mode = self.modes.next()?;
                log::debug!("Generating commands for mode '{}'", mode.name);
                let bindings = mode.bindings.restart();
                self.current = Some(ModeCursor {
                    mode,
                    block: 0,
                    bindings,
                });
                continue;
            };

            let Some(block) = cursor.mode.spec.option.get(cursor.block) else {
                self.current = None;
                continue;
            };

            let Some(binding) = cursor.bindings.next() else {
                cursor.block += 1;
                cursor.bindings = cursor.mode.bindings.restart();
                continue;
            };

            log::trace!("Mode '{}', block {}: {:?}", cursor.mode.name, cursor.block, binding);
            let result = serializer::serialize(block, &self.opts, &cursor.mode.env, &binding)
                .map(|args| join_command(&cursor.mode.spec.command, &args))
                .map_err(|source| GenerateError::Entry {
                    mode: cursor.mode.name.clone(),
                    source,
                });
            if result.is_err() {
                self.failed = true;
            }
            return Some(result);
        }
    }
}
