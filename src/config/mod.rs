//! Configuration file support for homerow-mouse.
//!
//! This module handles loading and validating user settings from the configuration file
//! located at `~/.config/homerow-mouse/config.toml`. Settings include the backend choice,
//! cursor speed and acceleration, smoothing, the mode controller flavour, and key bindings.
//!
//! If no config file exists, defaults are used. Invalid values are a startup error:
//! nothing runs with a configuration that failed validation.

pub mod enums;
pub mod keymap;
pub mod types;

// Re-export commonly used types at module level
pub use enums::{BackendKind, ModeVariant};
pub use keymap::{Keymap, KeysConfig};
pub use types::{BackendConfig, ModeConfig, MotionConfig, SmoothingConfig};

use anyhow::{Context, Result};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A configuration value outside its accepted range, or an unusable key binding.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid {field} {value}: {expected}")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid key bindings: {0}")]
    Keys(String),

    #[error("No key bound to {0}")]
    MissingKey(&'static str),
}

/// Main configuration structure containing all user settings.
///
/// # Example TOML
/// ```toml
/// [backend]
/// kind = "direct"
///
/// [motion]
/// move_speed = 2.0
/// acceleration = 1.5
/// tick_interval_ms = 4
///
/// [smoothing]
/// enabled = true
/// steps = 2
///
/// [mode]
/// variant = "hold"
///
/// [keys]
/// mode = ["KEY_LEFTALT", "KEY_RIGHTALT"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, JsonSchema)]
pub struct Config {
    /// Backend selection and failure policy
    #[serde(default)]
    pub backend: BackendConfig,

    /// Speed, acceleration, leap, and scroll settings
    #[serde(default)]
    pub motion: MotionConfig,

    /// Sub-tick interpolation
    #[serde(default)]
    pub smoothing: SmoothingConfig,

    /// Mode controller variant and host quirks
    #[serde(default)]
    pub mode: ModeConfig,

    /// Physical key bindings
    #[serde(default)]
    pub keys: KeysConfig,
}

fn check(
    field: &'static str,
    value: impl ToString,
    valid: bool,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if valid {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            expected,
        })
    }
}

impl Config {
    /// Validates every option and resolves the key bindings.
    ///
    /// Validated ranges:
    /// - `motion.move_speed`: 0 < speed <= 500
    /// - `motion.acceleration`: 1.0 - 10.0
    /// - `motion.speed_ramp`: >= 0
    /// - `motion.max_speed`: move_speed - 5000
    /// - `motion.tick_interval_ms`: 1 - 1000
    /// - `motion.leap_distance`: 1 - 2000
    /// - `motion.scroll_step`: 1 - 100
    /// - `smoothing.steps`: 1 - 32, `smoothing.delay_ms`: 0 - 100
    /// - `backend.command_timeout_ms`: 1 - 5000
    /// - `backend.failure_threshold`: 1 - 100
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<Keymap, ConfigError> {
        let m = &self.motion;
        check(
            "motion.move_speed",
            m.move_speed,
            m.move_speed > 0.0 && m.move_speed <= 500.0,
            "expected 0 < value <= 500",
        )?;
        check(
            "motion.acceleration",
            m.acceleration,
            (1.0..=10.0).contains(&m.acceleration),
            "expected 1.0 - 10.0",
        )?;
        check(
            "motion.speed_ramp",
            m.speed_ramp,
            m.speed_ramp.is_finite() && m.speed_ramp >= 0.0,
            "expected a non-negative number",
        )?;
        check(
            "motion.max_speed",
            m.max_speed,
            m.max_speed >= m.move_speed && m.max_speed <= 5000.0,
            "expected move_speed <= value <= 5000",
        )?;
        check(
            "motion.tick_interval_ms",
            m.tick_interval_ms,
            (1..=1000).contains(&m.tick_interval_ms),
            "expected 1 - 1000",
        )?;
        check(
            "motion.leap_distance",
            m.leap_distance,
            (1..=2000).contains(&m.leap_distance),
            "expected 1 - 2000",
        )?;
        check(
            "motion.scroll_step",
            m.scroll_step,
            (1..=100).contains(&m.scroll_step),
            "expected 1 - 100",
        )?;

        let s = &self.smoothing;
        check(
            "smoothing.steps",
            s.steps,
            (1..=32).contains(&s.steps),
            "expected 1 - 32",
        )?;
        check(
            "smoothing.delay_ms",
            s.delay_ms,
            s.delay_ms <= 100,
            "expected 0 - 100",
        )?;

        let b = &self.backend;
        check(
            "backend.command_timeout_ms",
            b.command_timeout_ms,
            (1..=5000).contains(&b.command_timeout_ms),
            "expected 1 - 5000",
        )?;
        check(
            "backend.failure_threshold",
            b.failure_threshold,
            (1..=100).contains(&b.failure_threshold),
            "expected 1 - 100",
        )?;
        if b.command.trim().is_empty() {
            return Err(ConfigError::OutOfRange {
                field: "backend.command",
                value: String::new(),
                expected: "expected a command name",
            });
        }

        let keymap = self.keys.build_keymap().map_err(ConfigError::Keys)?;
        if self.keys.mode.is_empty() {
            return Err(ConfigError::MissingKey("mode"));
        }
        if self.mode.variant == ModeVariant::Toggle && self.keys.toggle.is_empty() {
            return Err(ConfigError::MissingKey("toggle"));
        }

        Ok(keymap)
    }

    /// Returns the path to the configuration file.
    ///
    /// The config file is located at `~/.config/homerow-mouse/config.toml`.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined (e.g., HOME not set).
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("homerow-mouse");

        Ok(config_dir.join("config.toml"))
    }

    /// Loads configuration from the default path, or returns defaults if not found.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Loads configuration from `config_path`, or returns defaults if it does not exist.
    ///
    /// Values are parsed but not validated; call [`Config::validate`] before use.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or is not valid TOML.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found, using defaults");
            debug!("Expected config at: {}", config_path.display());
            return Ok(Self::default());
        }

        let config_str = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

        info!("Loaded config from {}", config_path.display());
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Creates a documented configuration file at `config_path`.
    ///
    /// # Errors
    /// Returns an error if a file already exists there or it cannot be written.
    pub fn create_default_file(config_path: &Path) -> Result<()> {
        if config_path.exists() {
            return Err(anyhow::anyhow!(
                "Config file already exists at {}",
                config_path.display()
            ));
        }

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        fs::write(config_path, EXAMPLE_CONFIG)
            .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

        info!("Created default config at {}", config_path.display());
        Ok(())
    }

    /// JSON schema describing the configuration file.
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Config)
    }
}

/// Documented example shipped with the binary and written by `--init-config`.
pub const EXAMPLE_CONFIG: &str = include_str!("../../config.example.toml");

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_validate() {
        let keymap = Config::default().validate().unwrap();
        assert!(!keymap.is_empty());
    }

    #[test]
    fn example_config_matches_defaults() {
        let parsed: Config = toml::from_str(EXAMPLE_CONFIG).unwrap();
        parsed.validate().unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.backend.kind, defaults.backend.kind);
        assert_eq!(parsed.motion.tick_interval_ms, defaults.motion.tick_interval_ms);
        assert_eq!(parsed.motion.leap_distance, defaults.motion.leap_distance);
        assert_eq!(parsed.smoothing.steps, defaults.smoothing.steps);
        assert_eq!(parsed.keys.mode, defaults.keys.mode);
        assert_eq!(parsed.mode.suppress_keys, defaults.mode.suppress_keys);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str("[motion]\nmove_speed = 4.0\n").unwrap();
        assert_eq!(config.motion.move_speed, 4.0);
        assert_eq!(config.motion.acceleration, 1.5);
        assert_eq!(config.backend.failure_threshold, 3);
        assert!(config.mode.suppress_keys);
    }

    #[test]
    fn backend_aliases_are_accepted() {
        let config: Config = toml::from_str("[backend]\nkind = \"xdotool\"\n").unwrap();
        assert_eq!(config.backend.kind, BackendKind::Command);
        let config: Config = toml::from_str("[backend]\nkind = \"xlib\"\n").unwrap();
        assert_eq!(config.backend.kind, BackendKind::Direct);
        let config: Config = toml::from_str("[backend]\nkind = \"uinput\"\n").unwrap();
        assert_eq!(config.backend.kind, BackendKind::Device);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = Config::default();
        config.motion.tick_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "motion.tick_interval_ms",
                ..
            })
        ));

        let mut config = Config::default();
        config.motion.acceleration = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.motion.max_speed = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.smoothing.steps = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.backend.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn mode_key_is_required() {
        let mut config = Config::default();
        config.keys.mode.clear();
        assert_eq!(config.validate().unwrap_err(), ConfigError::MissingKey("mode"));
    }

    #[test]
    fn toggle_variant_requires_toggle_key() {
        let mut config = Config::default();
        config.mode.variant = ModeVariant::Toggle;
        config.keys.toggle.clear();
        assert_eq!(config.validate().unwrap_err(), ConfigError::MissingKey("toggle"));
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.motion.leap_distance, 10);
    }

    #[test]
    fn load_from_reports_parse_errors_with_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[motion\nmove_speed = ").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn create_default_file_refuses_to_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        Config::create_default_file(&path).unwrap();
        assert!(path.exists());
        assert!(Config::create_default_file(&path).is_err());
    }

    #[test]
    fn schema_mentions_sections() {
        let schema = serde_json::to_string(&Config::json_schema()).unwrap();
        assert!(schema.contains("motion"));
        assert!(schema.contains("smoothing"));
    }
}
