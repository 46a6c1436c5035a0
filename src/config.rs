//! Configuration module
//!
//! Loaded from TOML (`~/.config/ev-fleet-csms/config.toml` by default, or the
//! path in `OCPP_CONFIG`). Every field has a default, so a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `<config dir>/ev-fleet-csms/config.toml`, falling back to the working directory.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ev-fleet-csms")
        .join("config.toml")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub liveness: LivenessConfig,
    pub commands: CommandsConfig,
    pub simulation: SimulationConfig,
    pub phase: PhaseConfig,
    pub pricing: PricingConfig,
    pub metrics: MetricsConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, raw).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Interval handed to chargers in BootNotification.conf, seconds
    pub heartbeat_interval: u32,
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            heartbeat_interval: 30,
            shutdown_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "plain" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "plain".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub sweep_interval_secs: u64,
    pub offline_threshold_secs: u64,
}

impl LivenessConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn offline_threshold(&self) -> Duration {
        Duration::from_secs(self.offline_threshold_secs)
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            offline_threshold_secs: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub response_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl CommandsConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: 30,
            sweep_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub heartbeat_secs: u64,
    pub meter_interval_secs: u64,
    pub pack_kwh: f64,
    pub default_start_soc: f64,
    pub id_tag: String,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn meter_interval(&self) -> Duration {
        Duration::from_secs(self.meter_interval_secs)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 10,
            meter_interval_secs: 2,
            pack_kwh: 60.0,
            default_start_soc: 20.0,
            id_tag: "SIMULATOR".to_string(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    /// How long a real station may take to report StartTransaction
    pub await_secs: u64,
    /// Delay before the demo station "plugs in" on its own
    pub demo_await_secs: u64,
    pub demo_station_id: Option<String>,
}

impl PhaseConfig {
    pub fn await_window(&self) -> Duration {
        Duration::from_secs(self.await_secs)
    }

    pub fn demo_await_window(&self) -> Duration {
        Duration::from_secs(self.demo_await_secs)
    }
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            await_secs: 60,
            demo_await_secs: 5,
            demo_station_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub default_price_per_kwh: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_price_per_kwh: 0.35,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "0.0.0.0:9100".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [server]
            port = 9300

            [phase]
            demo_station_id = "DEMO-1"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9300);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.phase.demo_station_id.as_deref(), Some("DEMO-1"));
        assert_eq!(cfg.liveness.offline_threshold_secs, 40);
        assert_eq!(cfg.pricing.default_price_per_kwh, 0.35);
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("ev-fleet-csms-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.simulation.seed = Some(7);
        cfg.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = AppConfig::load(Path::new("/nonexistent/ev-fleet-csms.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
