// src/system/settings.rs

use crate::constants::{CONFIG_DIR_NAME, SETTINGS_ENV_VAR, SETTINGS_FILENAME};
use serde::Deserialize;
use std::{env, fs, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not read settings file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for '{field}' in '{path}': must be at least 1")]
    NotPositive { field: &'static str, path: PathBuf },
}

/// The user settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub defaults: Defaults,
}

/// Fallback values for CLI flags. Explicit flags always win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub branch: Option<String>,
    pub name: Option<String>,
    pub digit: Option<usize>,
    pub per_script: Option<usize>,
    pub strict: Option<bool>,
    pub quote: Option<bool>,
}

/// Returns the settings file location: `$YAML2CLI_CONFIG` if set, otherwise
/// `<config dir>/yaml2cli/config.toml`. `None` if neither can be determined.
pub fn settings_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(SETTINGS_ENV_VAR).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(SETTINGS_FILENAME))
}

/// Loads the user settings. A missing file yields the defaults.
pub fn load_settings() -> Result<Settings, SettingsError> {
    match settings_path() {
        Some(path) => load_settings_from(path),
        None => {
            log::debug!("No config directory found, using built-in defaults");
            Ok(Settings::default())
        }
    }
}

pub fn load_settings_from(path: PathBuf) -> Result<Settings, SettingsError> {
    if !path.is_file() {
        log::debug!("No settings file at {}", path.display());
        return Ok(Settings::default());
    }
    let content = fs::read_to_string(&path).map_err(|source| SettingsError::Io {
        path: path.clone(),
        source,
    })?;
    let settings: Settings = toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.clone(),
        source,
    })?;

    if settings.defaults.per_script == Some(0) {
        return Err(SettingsError::NotPositive {
            field: "per_script",
            path,
        });
    }

    log::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_settings_from(dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parses_defaults_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[defaults]\nbranch = \"cori\"\ndigit = 3\nper_script = 10\nstrict = true\n",
        )
        .unwrap();
        let settings = load_settings_from(path).unwrap();
        assert_eq!(settings.defaults.branch.as_deref(), Some("cori"));
        assert_eq!(settings.defaults.digit, Some(3));
        assert_eq!(settings.defaults.per_script, Some(10));
        assert_eq!(settings.defaults.strict, Some(true));
        assert_eq!(settings.defaults.name, None);
        assert_eq!(settings.defaults.quote, None);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[defaults]\nhost = \"cori\"\n").unwrap();
        let err = load_settings_from(path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn test_zero_per_script_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[defaults]\nper_script = 0\n").unwrap();
        let err = load_settings_from(path).unwrap_err();
        assert!(matches!(err, SettingsError::NotPositive { field: "per_script", .. }));
    }
}
