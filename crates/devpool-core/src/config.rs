//! Daemon configuration
//!
//! Settings are loaded once at process start and passed into every
//! component constructor. There is no ambient global lookup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = "devpool";

/// Daemon settings (`~/.config/devpool/config.toml`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub reservation: ReservationSettings,

    #[serde(default)]
    pub android: AndroidSettings,

    #[serde(default)]
    pub ios: IosSettings,

    #[serde(default)]
    pub automation: AutomationSettings,

    #[serde(default)]
    pub tools: ToolSettings,
}

/// Reservation reconciler timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReservationSettings {
    /// Delay between reconciliation passes, in milliseconds
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// Backoff after a transient pass failure, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            refresh_ms: default_refresh_ms(),
            reconnect_backoff_ms: default_backoff_ms(),
        }
    }
}

impl ReservationSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AndroidSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay between enumeration ticks, in milliseconds
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
}

impl Default for AndroidSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_ms: default_refresh_ms(),
        }
    }
}

impl AndroidSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IosSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// Root directory holding developer disk images, one subdirectory per
    /// iOS version (e.g. `<root>/16.4/DeveloperDiskImage.dmg`). Required
    /// when iOS support is enabled.
    #[serde(default)]
    pub developer_image_root: Option<PathBuf>,
}

impl Default for IosSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            refresh_ms: default_refresh_ms(),
            developer_image_root: None,
        }
    }
}

impl IosSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

/// Per-device automation server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutomationSettings {
    /// Command used to start the automation server
    #[serde(default = "default_server_command")]
    pub server_command: String,

    /// Address the automation server binds and advertises
    #[serde(default = "default_host")]
    pub host: String,

    /// Inclusive lower bound of the automation port range
    #[serde(default = "default_port_min")]
    pub port_min: u16,

    /// Exclusive upper bound of the automation port range
    #[serde(default = "default_port_max")]
    pub port_max: u16,

    /// Directory for per-device server log files; no file logging when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            server_command: default_server_command(),
            host: default_host(),
            port_min: default_port_min(),
            port_max: default_port_max(),
            log_dir: None,
        }
    }
}

/// External tool invocation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolSettings {
    /// Timeout for a single external tool invocation, in milliseconds
    #[serde(default = "default_tool_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_tool_timeout_ms(),
        }
    }
}

impl ToolSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_refresh_ms() -> u64 {
    5_000
}

fn default_backoff_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_server_command() -> String {
    "appium".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port_min() -> u16 {
    4774
}

fn default_port_max() -> u16 {
    4974
}

fn default_tool_timeout_ms() -> u64 {
    30_000
}

impl Settings {
    /// Load settings from an explicit path, or from the default location
    /// when `path` is `None`. A missing default file yields `Settings::default()`;
    /// a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(Error::ConfigNotFound { path });
            }
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let settings: Settings = toml::from_str(&contents)
            .map_err(|e| Error::config(format!("failed to parse {}: {e}", path.display())))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.automation.port_min >= self.automation.port_max {
            return Err(Error::config(format!(
                "automation port range is empty: [{}, {})",
                self.automation.port_min, self.automation.port_max
            )));
        }

        if self.ios.enabled && self.ios.developer_image_root.is_none() {
            return Err(Error::config(
                "ios.developer_image_root must be set when iOS support is enabled",
            ));
        }

        Ok(())
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILENAME)
}
