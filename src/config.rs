//! Configuration for the bridge daemon
//!
//! Loads configuration from TOML file at `~/.config/nwm-bridge/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use nwm_bridge_ipc::codes::{HORIZONTAL_SCROLL_FLAG, WHEEL_DELTA};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub input: InputConfig,
    pub startup: StartupConfig,
    pub clipboard: ClipboardConfig,
    pub ipc: IpcConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).context("Failed to read config file")?;
        let config = Self::parse(&content)?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nwm-bridge");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize default config")?;
        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Display configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Host screen density in dpi
    pub startup_dpi: u32,
    /// Keep a reserved content object at the front of every client container
    pub reserve_front_view: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            startup_dpi: 160,
            reserve_front_view: true,
        }
    }
}

/// Input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Scroll amount per wheel notch
    pub wheel_step: i32,
    /// Bit marking horizontal scroll events
    pub horizontal_scroll_flag: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            wheel_step: WHEEL_DELTA,
            horizontal_scroll_flag: HORIZONTAL_SCROLL_FLAG,
        }
    }
}

/// Startup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    pub desktop_name: String,
    /// Commands run once on a fresh prefix, after the desktop is ready
    pub first_run_commands: Vec<Vec<String>>,
    /// Prefix directory; first run is detected through a marker file in it
    pub prefix: Option<PathBuf>,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            desktop_name: "shell".to_string(),
            first_run_commands: Vec::new(),
            prefix: None,
        }
    }
}

/// Clipboard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    /// Content authority used to tag clips we publish
    pub provider_authority: Option<String>,
}

/// IPC configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Socket path; defaults to `$XDG_RUNTIME_DIR/nwm-bridge.sock`
    pub socket_path: Option<PathBuf>,
}

impl IpcConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path.clone().unwrap_or_else(nwm_bridge_ipc::socket_path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "nwm_bridge=debug,info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [display]
            startup_dpi = 240

            [startup]
            first_run_commands = [["wineboot", "-u"]]
            "#,
        )
        .unwrap();

        assert_eq!(config.display.startup_dpi, 240);
        assert!(config.display.reserve_front_view);
        assert_eq!(config.input.wheel_step, 120);
        assert_eq!(config.startup.first_run_commands, vec![vec!["wineboot".to_string(), "-u".to_string()]]);
        assert_eq!(config.logging.filter, "nwm_bridge=debug,info");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(Config::parse("[display]\nstartup_dpi = \"high\"").is_err());
    }

    #[test]
    fn test_default_survives_serialization() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert_eq!(Config::parse(&text).unwrap(), Config::default());
    }

    #[test]
    fn test_malformed_file_on_disk_is_not_replaced() {
        let dir = std::env::temp_dir().join(format!("nwm-bridge-bad-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, "[input]\nwheel_step = [").unwrap();

        assert!(Config::load_from(&path).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[input]\nwheel_step = [");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = std::env::temp_dir().join(format!("nwm-bridge-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = fs::remove_dir_all(&dir);

        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
        assert!(path.exists());
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
        let _ = fs::remove_dir_all(&dir);
    }
}
