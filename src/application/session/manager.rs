//! Session manager: identity binding, activity tracking and teardown
//!
//! Owns the rules that tie a transport handle to a station record:
//! identifying marks the station connected, every inbound frame refreshes
//! liveness, and losing the transport (close or liveness eviction) finalizes
//! anything left dangling and takes the station offline.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::registry::SharedSessionRegistry;
use crate::application::charging::TransactionMachine;
use crate::application::commands::SharedCommandSender;
use crate::application::events::{Event, StationConnectedEvent, StationDisconnectedEvent};
use crate::application::registry::SharedStationRegistry;
use crate::application::simulation::SharedSimulationEngine;
use crate::domain::{ConnectionSource, DomainResult, OcppVersion};

pub struct SessionManager {
    registry: SharedStationRegistry,
    sessions: SharedSessionRegistry,
    machine: Arc<TransactionMachine>,
    commands: SharedCommandSender,
    simulation: SharedSimulationEngine,
}

pub type SharedSessionManager = Arc<SessionManager>;

impl SessionManager {
    pub fn new(
        registry: SharedStationRegistry,
        sessions: SharedSessionRegistry,
        machine: Arc<TransactionMachine>,
        commands: SharedCommandSender,
        simulation: SharedSimulationEngine,
    ) -> Self {
        Self {
            registry,
            sessions,
            machine,
            commands,
            simulation,
        }
    }

    pub fn sessions(&self) -> &SharedSessionRegistry {
        &self.sessions
    }

    pub fn registry(&self) -> &SharedStationRegistry {
        &self.registry
    }

    /// Bind an identified transport to its station. Returns the session generation.
    pub fn identify(
        &self,
        station_id: &str,
        sender: mpsc::UnboundedSender<String>,
        ocpp_version: OcppVersion,
        close_guard: Option<oneshot::Sender<()>>,
    ) -> DomainResult<u64> {
        self.registry.ensure(station_id);
        if let Some(superseded) = self.simulation.supersede(station_id) {
            if superseded.was_charging {
                self.machine.finalize_dangling(station_id, "superseded");
            }
        }

        let (generation, replaced) =
            self.sessions.bind(station_id, sender, ocpp_version, close_guard);
        if replaced.is_some() {
            self.commands.cleanup_station(station_id);
        }

        self.registry.update(station_id, |station| {
            station.mark_connected(ConnectionSource::Ocpp, Utc::now());
        })?;

        info!(station_id, generation, %ocpp_version, "Station identified");
        self.registry
            .event_bus()
            .publish(Event::StationConnected(StationConnectedEvent {
                station_id: station_id.to_string(),
                source: ConnectionSource::Ocpp,
                ocpp_version: Some(ocpp_version.version_string().to_string()),
                timestamp: Utc::now(),
            }));
        Ok(generation)
    }

    pub fn is_current(&self, station_id: &str, generation: u64) -> bool {
        self.sessions.is_current(station_id, generation)
    }

    /// Liveness refresh for an inbound Call or CallResult.
    pub fn record_activity(&self, station_id: &str) {
        self.sessions.touch(station_id);
        if let Err(e) = self.registry.update(station_id, |station| station.touch(Utc::now())) {
            warn!(station_id, error = %e, "Activity for unknown station");
        }
    }

    /// Transport closed. A stale generation is ignored.
    pub fn disconnect(&self, station_id: &str, generation: u64, reason: &str) -> bool {
        if !self.sessions.unbind(station_id, generation) {
            return false;
        }
        self.teardown(station_id, reason);
        true
    }

    /// Force a station offline regardless of which handle is current.
    pub fn evict(&self, station_id: &str, reason: &str) {
        if let Some(generation) = self.sessions.evict(station_id) {
            info!(station_id, generation, reason, "Session evicted");
        }
        self.teardown(station_id, reason);
    }

    fn teardown(&self, station_id: &str, reason: &str) {
        self.commands.cleanup_station(station_id);

        let is_ocpp = self
            .registry
            .get(station_id)
            .is_ok_and(|s| s.connection_source == ConnectionSource::Ocpp);
        if !is_ocpp {
            return;
        }

        self.machine.finalize_dangling(station_id, reason);
        let _ = self.registry.update(station_id, |station| {
            if station.connection_source == ConnectionSource::Ocpp {
                station.mark_offline();
            }
        });

        info!(station_id, reason, "Station offline");
        self.registry
            .event_bus()
            .publish(Event::StationDisconnected(StationDisconnectedEvent {
                station_id: station_id.to_string(),
                source: ConnectionSource::Ocpp,
                reason: Some(reason.to_string()),
                timestamp: Utc::now(),
            }));
    }

    /// Evict ocpp-connected stations silent for longer than `threshold`.
    /// Returns the evicted ids.
    pub fn sweep_stale(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<String> {
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        let stale: Vec<String> = self
            .registry
            .list()
            .into_iter()
            .filter(|s| s.connected && s.connection_source == ConnectionSource::Ocpp)
            .filter(|s| {
                s.last_heartbeat
                    .map_or(true, |last| now.signed_duration_since(last) > threshold)
            })
            .map(|s| s.id)
            .collect();

        for station_id in &stale {
            warn!(station_id = %station_id, "Liveness lost, forcing offline");
            metrics::counter!("ocpp_liveness_evictions_total").increment(1);
            self.evict(station_id, "liveness timeout");
        }
        stale
    }

    /// Close every live session. Used on shutdown.
    pub fn disconnect_all(&self) {
        for (station_id, generation) in self.sessions.drain() {
            info!(station_id = %station_id, generation, "Closing session for shutdown");
            self.teardown(&station_id, "server shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::charging::StartRequest;
    use crate::application::commands::CommandSender;
    use crate::application::events::create_event_bus;
    use crate::application::registry::StationRegistry;
    use crate::application::session::SessionRegistry;
    use crate::application::simulation::{SimulateStart, SimulationEngine};
    use crate::config::SimulationConfig;
    use crate::domain::StationStatus;

    fn manager() -> SessionManager {
        let registry = Arc::new(StationRegistry::new(create_event_bus(), 0.35));
        let machine = Arc::new(TransactionMachine::new(registry.clone()));
        let sessions = SessionRegistry::shared();
        let commands = Arc::new(CommandSender::new(sessions.clone(), machine.clone()));
        let simulation = SimulationEngine::new(machine.clone(), SimulationConfig::default()).shared();
        SessionManager::new(registry, sessions, machine, commands, simulation)
    }

    fn identify(m: &SessionManager, id: &str) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (m.identify(id, tx, OcppVersion::V16, None).unwrap(), rx)
    }

    #[tokio::test]
    async fn identify_auto_registers_and_connects() {
        let m = manager();
        let (generation, _rx) = identify(&m, "CP1");
        assert!(m.is_current("CP1", generation));

        let s = m.registry().get("CP1").unwrap();
        assert!(s.connected);
        assert_eq!(s.connection_source, ConnectionSource::Ocpp);
        assert_eq!(s.status, StationStatus::Available);
        assert!(s.connected_at.is_some());
    }

    #[tokio::test]
    async fn activity_bumps_message_count() {
        let m = manager();
        let (_g, _rx) = identify(&m, "CP1");
        m.record_activity("CP1");
        m.record_activity("CP1");
        assert_eq!(m.registry().get("CP1").unwrap().message_count, 2);
    }

    #[tokio::test]
    async fn stale_close_after_reconnect_is_ignored() {
        let m = manager();
        let (old, _rx1) = identify(&m, "CP1");
        let (new, _rx2) = identify(&m, "CP1");

        assert!(!m.disconnect("CP1", old, "closed"));
        assert!(m.registry().get("CP1").unwrap().connected);

        assert!(m.disconnect("CP1", new, "closed"));
        let s = m.registry().get("CP1").unwrap();
        assert!(!s.connected);
        assert_eq!(s.status, StationStatus::Offline);
    }

    #[tokio::test]
    async fn close_finalizes_dangling_transaction() {
        let m = manager();
        let (generation, _rx) = identify(&m, "CP1");
        m.machine
            .start_transaction(
                "CP1",
                StartRequest {
                    id_tag: "TAG".into(),
                    meter_start: 100.0,
                    ..Default::default()
                },
                ConnectionSource::Ocpp,
            )
            .unwrap();

        m.disconnect("CP1", generation, "closed");
        let s = m.registry().get("CP1").unwrap();
        assert!(s.current_transaction.is_none());
        assert_eq!(s.session_history.len(), 1);
        assert_eq!(s.status, StationStatus::Offline);
    }

    #[tokio::test]
    async fn sweep_only_touches_silent_ocpp_stations() {
        let m = manager();
        let (_g, _rx) = identify(&m, "CP1");
        let (_g2, _rx2) = identify(&m, "CP2");
        m.registry().ensure("SIM");
        m.registry()
            .update("SIM", |s| s.mark_connected(ConnectionSource::Simulation, Utc::now()))
            .unwrap();

        let later = Utc::now() + chrono::Duration::seconds(41);
        m.registry()
            .update("CP2", |s| s.last_heartbeat = Some(later))
            .unwrap();

        let evicted = m.sweep_stale(later, Duration::from_secs(40));
        assert_eq!(evicted, vec!["CP1".to_string()]);
        assert!(!m.registry().get("CP1").unwrap().connected);
        assert!(!m.sessions().is_connected("CP1"));
        assert!(m.registry().get("CP2").unwrap().connected);
        assert!(m.registry().get("SIM").unwrap().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn real_charger_closes_out_simulated_transaction() {
        let m = manager();
        m.registry().ensure("CP1");
        m.simulation.simulate_connect("CP1").unwrap();
        let simulated = m
            .simulation
            .simulate_start("CP1", SimulateStart::default())
            .unwrap();

        let (_g, _rx) = identify(&m, "CP1");
        let s = m.registry().get("CP1").unwrap();
        assert!(s.current_transaction.is_none());
        assert_eq!(s.status, StationStatus::Available);
        assert_eq!(s.connection_source, ConnectionSource::Ocpp);
        assert_eq!(s.session_history.len(), 1);
        assert_eq!(s.session_history[0].id, simulated.id);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(m.registry().get("CP1").unwrap().meter_history.is_empty());

        let real = m
            .machine
            .start_transaction(
                "CP1",
                StartRequest {
                    id_tag: "TAG".into(),
                    meter_start: 0.0,
                    ..Default::default()
                },
                ConnectionSource::Ocpp,
            )
            .unwrap();
        assert_ne!(real.id, simulated.id);
        assert_eq!(m.registry().get("CP1").unwrap().status, StationStatus::Charging);
    }

    #[tokio::test]
    async fn identify_supersedes_simulation() {
        let m = manager();
        m.registry().ensure("CP1");
        m.simulation.simulate_connect("CP1").unwrap();
        let (_g, _rx) = identify(&m, "CP1");
        assert!(!m.simulation.is_simulated("CP1"));
        assert_eq!(
            m.registry().get("CP1").unwrap().connection_source,
            ConnectionSource::Ocpp
        );
    }
}
