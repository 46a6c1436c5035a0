//! EV Fleet CSMS
//!
//! OCPP 1.6 WebSocket central system for a fleet of EV charging stations.
//! Reads configuration from `OCPP_CONFIG` or
//! `~/.config/ev-fleet-csms/config.toml`.

use tracing::{error, info};

use ev_fleet_csms::support::telemetry::{init_tracing, install_metrics};
use ev_fleet_csms::{default_config_path, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("OCPP_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());

    let config = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            init_tracing(&cfg.logging);
            info!(path = %config_path.display(), "Configuration loaded");
            cfg
        }
        Err(e) => {
            let cfg = AppConfig::default();
            init_tracing(&cfg.logging);
            error!(error = %e, "Failed to load config, using defaults");
            cfg
        }
    };

    info!("Starting EV Fleet CSMS...");

    if let Err(e) = install_metrics(&config.metrics) {
        error!(error = %e, "Failed to install Prometheus exporter");
    }

    ev_fleet_csms::server::run(config).await.map_err(|e| e as Box<dyn std::error::Error>)?;
    Ok(())
}
