use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::environment::EnvironmentOptions;

const APP_NAME: &str = "moonbridge";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to parse config: {0}")]
    Parse(String),
    #[error("IO error reading config: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Whether scripts are loaded at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Directory containing top-level scripts (default: <data dir>/moonbridge/scripts)
    #[serde(default)]
    pub script_dir: Option<PathBuf>,

    /// Directory whose subdirectories are mods (default: <data dir>/moonbridge/mods)
    #[serde(default)]
    pub mods_dir: Option<PathBuf>,

    /// Host tick interval in milliseconds (default: 50ms)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Exposed to scripts as `MOONBRIDGE_VERSION`
    #[serde(default = "default_mod_version")]
    pub mod_version: String,

    /// Exposed to scripts as `GAME_VERSION`
    #[serde(default = "default_game_version")]
    pub game_version: String,

    /// Per-script configuration (script base name -> config values)
    #[serde(default)]
    pub config: HashMap<String, toml::Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    50
}

fn default_mod_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_game_version() -> String {
    "unknown".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            script_dir: None,
            mods_dir: None,
            tick_interval_ms: default_tick_interval(),
            mod_version: default_mod_version(),
            game_version: default_game_version(),
            config: HashMap::new(),
        }
    }
}

fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.data_dir().to_path_buf())
}

impl BridgeConfig {
    /// Default location of the config file, if a home directory can be found
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|d| d.config_dir().join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigLoadError::Io(e.to_string()))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigLoadError> {
        toml::from_str(content).map_err(|e| ConfigLoadError::Parse(e.to_string()))
    }

    /// Get the script directory path (use provided or default)
    pub fn script_dir(&self) -> PathBuf {
        self.script_dir.clone().unwrap_or_else(|| {
            data_dir()
                .map(|d| d.join("scripts"))
                .unwrap_or_else(|| PathBuf::from(".scripts"))
        })
    }

    /// Get the mods directory path (use provided or default)
    pub fn mods_dir(&self) -> PathBuf {
        self.mods_dir.clone().unwrap_or_else(|| {
            data_dir()
                .map(|d| d.join("mods"))
                .unwrap_or_else(|| PathBuf::from(".mods"))
        })
    }

    /// Tick interval, never shorter than one millisecond
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Whether the script with this base name should be loaded
    ///
    /// Scripts are enabled unless their config table sets `enabled = false`.
    pub fn script_enabled(&self, script_name: &str) -> bool {
        self.config
            .get(script_name)
            .and_then(|value| value.get("enabled"))
            .and_then(toml::Value::as_bool)
            .unwrap_or(true)
    }

    pub fn environment_options(&self) -> EnvironmentOptions {
        EnvironmentOptions {
            scripts_dir: self.script_dir(),
            host_version: self.mod_version.clone(),
            game_version: self.game_version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert!(config.enabled);
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.game_version, "unknown");
        assert_eq!(config.mod_version, env!("CARGO_PKG_VERSION"));
        assert!(config.config.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config = BridgeConfig::from_toml_str(
            r#"
            enabled = false
            script_dir = "/srv/scripts"
            mods_dir = "/srv/mods"
            tick_interval_ms = 100
            mod_version = "2.0.0"
            game_version = "0.3.4f1"

            [config.chatty]
            enabled = false
            greeting = "hi"

            [config.quiet]
            volume = 0
            "#,
        )
        .unwrap();

        assert!(!config.enabled);
        assert_eq!(config.script_dir(), PathBuf::from("/srv/scripts"));
        assert_eq!(config.mods_dir(), PathBuf::from("/srv/mods"));
        assert_eq!(config.tick_interval(), Duration::from_millis(100));

        assert!(!config.script_enabled("chatty"));
        assert!(config.script_enabled("quiet"));
        assert!(config.script_enabled("unlisted"));

        let options = config.environment_options();
        assert_eq!(options.scripts_dir, PathBuf::from("/srv/scripts"));
        assert_eq!(options.host_version, "2.0.0");
        assert_eq!(options.game_version, "0.3.4f1");
    }

    #[test]
    fn test_zero_tick_interval_is_clamped() {
        let config = BridgeConfig::from_toml_str("tick_interval_ms = 0").unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_load_errors() {
        let temp_dir = TempDir::new().unwrap();

        let missing = temp_dir.path().join("missing.toml");
        assert!(matches!(
            BridgeConfig::load(&missing),
            Err(ConfigLoadError::NotFound(path)) if path == missing
        ));

        let broken = temp_dir.path().join("broken.toml");
        fs::write(&broken, "enabled = [").unwrap();
        assert!(matches!(
            BridgeConfig::load(&broken),
            Err(ConfigLoadError::Parse(_))
        ));

        let good = temp_dir.path().join("good.toml");
        fs::write(&good, "game_version = \"1.0\"").unwrap();
        assert_eq!(BridgeConfig::load(&good).unwrap().game_version, "1.0");
    }
}
