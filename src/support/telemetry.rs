//! Logging and metrics setup

use tracing_subscriber::EnvFilter;

use crate::config::{LoggingConfig, MetricsConfig};

/// `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(config));
    let result = if config.format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Start the Prometheus scrape endpoint when enabled.
pub fn install_metrics(config: &MetricsConfig) -> Result<bool, Box<dyn std::error::Error>> {
    if !config.enabled {
        return Ok(false);
    }
    let addr: std::net::SocketAddr = config.listen.parse()?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(listen = %addr, "📊 Prometheus exporter listening");
    Ok(true)
}
