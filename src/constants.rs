// src/constants.rs

/// Marks a string value as a deferred expression: `"eval range(4)"`.
pub const EVAL_PREFIX: &str = "eval ";

/// The directory holding user settings (inside the platform config dir).
pub const CONFIG_DIR_NAME: &str = "yaml2cli";

/// The user settings file name (inside `CONFIG_DIR_NAME`).
pub const SETTINGS_FILENAME: &str = "config.toml";

/// Overrides the location of the user settings file.
pub const SETTINGS_ENV_VAR: &str = "YAML2CLI_CONFIG";

/// Extension of the scripts written in `--outdir` mode.
pub const SCRIPT_EXTENSION: &str = "sh";

// --- DEFAULTS ---

pub const DEFAULT_NAME: &str = "job";
pub const DEFAULT_DIGIT: usize = 4;
pub const DEFAULT_PER_SCRIPT: usize = 1;

/// The fields a mode spec mapping may contain.
pub const MODE_SPEC_FIELDS: &[&str] = &["command", "option", "var", "loop"];
