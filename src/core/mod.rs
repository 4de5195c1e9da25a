//! # Generation Engine
//!
//! Everything between the loaded document and the final command strings.
//!
//! - **`config_loader`**: YAML → `Document`, parsing `eval` expressions once.
//! - **`modes`**: expands mode aliases into leaf modes.
//! - **`expression`**: the sandboxed evaluator behind `eval` values.
//! - **`resolver`**: selects branches and evaluates deferred values.
//! - **`env`** and **`loop_expander`**: the `var` environment and the lazy
//!   Cartesian product of the `loop` section.
//! - **`serializer`**: one option block → one argument string.
//! - **`assembler`**: mode → option block → binding, as a lazy command stream.

pub mod assembler;
pub mod config_loader;
pub mod env;
pub mod errors;
pub mod expression;
pub mod loop_expander;
pub mod modes;
pub mod resolver;
pub mod serializer;
