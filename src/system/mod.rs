//! # System Interaction Layer
//!
//! The boundary between the generation engine and the filesystem.
//!
//! - **`writer`**: streams commands into a single script or a directory of
//!   numbered scripts, and marks them executable.
//! - **`settings`**: loads the optional user `config.toml` with default flag values.

pub mod settings;
pub mod writer;
