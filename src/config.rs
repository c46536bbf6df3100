use crate::error::ValidationError;
use crate::monitor::Limits;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub limits: Option<LimitsSection>,
    #[serde(default)]
    pub notifications: Option<NotificationsSection>,
    #[serde(default)]
    pub store: Option<StoreSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

/// Fallback limits for assets that have none stored.
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsSection {
    pub tilt_limit_degrees: Option<f64>,
    pub min_temp_f: Option<f64>,
    pub max_temp_f: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsSection {
    /// Push delivery is dormant unless switched on here.
    #[serde(default)]
    pub push_enabled: bool,
    pub push_target: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSection {
    pub seed_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.default_limits().temperature_zone()?;
    Ok(config)
}

impl Config {
    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Configured fallback limits, each defaulting to 15°, 40°F and 90°F.
    pub fn default_limits(&self) -> Limits {
        let defaults = Limits::default();
        match &self.limits {
            Some(section) => Limits {
                tilt_limit_degrees: section
                    .tilt_limit_degrees
                    .unwrap_or(defaults.tilt_limit_degrees),
                min_temp_f: section.min_temp_f.unwrap_or(defaults.min_temp_f),
                max_temp_f: section.max_temp_f.unwrap_or(defaults.max_temp_f),
            },
            None => defaults,
        }
    }

    /// Push target when push delivery is enabled and a target is set.
    pub fn push_target(&self) -> Option<&str> {
        let section = self.notifications.as_ref()?;
        if !section.push_enabled {
            return None;
        }
        section
            .push_target
            .as_deref()
            .filter(|target| !target.trim().is_empty())
    }

    pub fn seed_path(&self) -> Option<&Path> {
        let path = self.store.as_ref()?.seed_path.as_deref()?;
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }
}
