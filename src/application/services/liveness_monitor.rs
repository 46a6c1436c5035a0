//! Liveness monitor
//!
//! Periodically forces offline any ocpp-connected station whose last inbound
//! message is older than the configured threshold. Simulated and externally
//! ingested stations are never touched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::application::session::SharedSessionManager;
use crate::config::LivenessConfig;
use crate::domain::{ConnectionSource, StationStatus};
use crate::support::shutdown::ShutdownSignal;

/// Per-station liveness view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessStatus {
    pub station_id: String,
    pub source: ConnectionSource,
    pub connected: bool,
    pub status: StationStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub seconds_since_heartbeat: Option<i64>,
    pub stale: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub stale: usize,
}

pub struct LivenessMonitor {
    sessions: SharedSessionManager,
    config: LivenessConfig,
    running: Arc<AtomicBool>,
}

impl LivenessMonitor {
    pub fn new(sessions: SharedSessionManager, config: LivenessConfig) -> Self {
        Self {
            sessions,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the sweep loop; it exits when `shutdown` fires.
    pub fn start(&self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let sessions = self.sessions.clone();
        let config = self.config.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            running.store(true, Ordering::SeqCst);
            info!(
                sweep_secs = config.sweep_interval_secs,
                threshold_secs = config.offline_threshold_secs,
                "Liveness monitor started"
            );

            let mut interval = tokio::time::interval(config.sweep_interval());
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = sessions.sweep_stale(Utc::now(), config.offline_threshold());
                        if evicted.is_empty() {
                            debug!("Liveness sweep: all stations fresh");
                        } else {
                            info!(count = evicted.len(), "Liveness sweep evicted stations");
                        }
                    }
                    _ = shutdown.wait() => break,
                }
            }

            running.store(false, Ordering::SeqCst);
            info!("Liveness monitor stopped");
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> Vec<LivenessStatus> {
        let now = Utc::now();
        self.sessions
            .registry()
            .list()
            .into_iter()
            .map(|station| {
                let seconds_since = station
                    .last_heartbeat
                    .map(|hb| now.signed_duration_since(hb).num_seconds());
                let threshold = self.config.offline_threshold_secs as i64;
                let stale = station.connected
                    && station.connection_source == ConnectionSource::Ocpp
                    && seconds_since.map_or(true, |s| s > threshold);
                LivenessStatus {
                    station_id: station.id,
                    source: station.connection_source,
                    connected: station.connected,
                    status: station.status,
                    last_heartbeat: station.last_heartbeat,
                    seconds_since_heartbeat: seconds_since,
                    stale,
                }
            })
            .collect()
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        let statuses = self.statuses();
        let online = statuses.iter().filter(|s| s.connected).count();
        ConnectionStats {
            total: statuses.len(),
            online,
            offline: statuses.len() - online,
            stale: statuses.iter().filter(|s| s.stale).count(),
        }
    }
}
