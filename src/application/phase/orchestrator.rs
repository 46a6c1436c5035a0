//! Connection-phase orchestrator
//!
//! A start request puts the station into `awaiting_car` until the vehicle is
//! plugged in (a `TransactionStarted` arrives) or the window expires. At most
//! one start can be in flight per station.

use std::sync::{Arc, Weak};

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::commands::{remote_start, remote_stop, SharedCommandSender};
use crate::application::events::{ConnectionPhaseChangedEvent, Event};
use crate::application::registry::SharedStationRegistry;
use crate::application::simulation::{SharedSimulationEngine, SimulateStart};
use crate::config::PhaseConfig;
use crate::domain::{ConnectionPhase, ConnectionSource, DomainError, DomainResult};
use crate::support::shutdown::ShutdownSignal;
use crate::support::timer::ScheduledTask;

struct PhaseEntry {
    phase: ConnectionPhase,
    id_tag: String,
    timeout: Option<ScheduledTask>,
}

pub struct ConnectionPhaseOrchestrator {
    registry: SharedStationRegistry,
    commands: SharedCommandSender,
    simulation: SharedSimulationEngine,
    in_progress: DashSet<String>,
    phases: DashMap<String, PhaseEntry>,
    config: PhaseConfig,
}

pub type SharedPhaseOrchestrator = Arc<ConnectionPhaseOrchestrator>;

impl ConnectionPhaseOrchestrator {
    pub fn new(
        registry: SharedStationRegistry,
        commands: SharedCommandSender,
        simulation: SharedSimulationEngine,
        config: PhaseConfig,
    ) -> Self {
        Self {
            registry,
            commands,
            simulation,
            in_progress: DashSet::new(),
            phases: DashMap::new(),
            config,
        }
    }

    pub fn shared(self) -> SharedPhaseOrchestrator {
        Arc::new(self)
    }

    pub fn phase(&self, station_id: &str) -> ConnectionPhase {
        self.phases
            .get(station_id)
            .map(|entry| entry.phase)
            .unwrap_or_default()
    }

    pub fn is_start_in_progress(&self, station_id: &str) -> bool {
        self.in_progress.contains(station_id)
    }

    fn is_demo(&self, station_id: &str) -> bool {
        self.config.demo_station_id.as_deref() == Some(station_id)
    }

    fn publish(&self, station_id: &str, phase: ConnectionPhase) {
        info!(station_id, %phase, "Connection phase changed");
        self.registry
            .event_bus()
            .publish(Event::ConnectionPhaseChanged(ConnectionPhaseChangedEvent {
                station_id: station_id.to_string(),
                phase,
                timestamp: Utc::now(),
            }));
    }

    /// Begin a start: validate, mark in progress, ask the charger, arm the window.
    pub fn request_start(
        self: &Arc<Self>,
        station_id: &str,
        id_tag: &str,
    ) -> DomainResult<ConnectionPhase> {
        let station = self
            .registry
            .get(station_id)
            .map_err(|_| DomainError::ChargerOffline(station_id.to_string()))?;
        if !station.connected {
            return Err(DomainError::ChargerOffline(station_id.to_string()));
        }
        if station.is_charging() {
            return Err(DomainError::AlreadyCharging(station_id.to_string()));
        }

        if !self.in_progress.insert(station_id.to_string()) {
            return Err(DomainError::StartInProgress(station_id.to_string()));
        }

        // The entry exists before the command goes out, so a TransactionStarted
        // racing the send resolves it instead of being lost.
        self.begin(station_id, id_tag);

        if station.connection_source == ConnectionSource::Ocpp {
            let sent = match remote_start::request(id_tag, None) {
                Ok(payload) => self.commands.send(station_id, remote_start::ACTION, payload),
                Err(e) => {
                    warn!(station_id, error = %e, "RemoteStartTransaction not built");
                    false
                }
            };
            if !sent {
                self.phases.remove(station_id);
                self.in_progress.remove(station_id);
                return Err(DomainError::ChargerOffline(station_id.to_string()));
            }
        }

        Ok(self.arm(station_id, id_tag))
    }

    fn begin(&self, station_id: &str, id_tag: &str) {
        self.phases.insert(
            station_id.to_string(),
            PhaseEntry {
                phase: ConnectionPhase::AwaitingCar,
                id_tag: id_tag.to_string(),
                timeout: None,
            },
        );
    }

    /// Arm the await window. A phase already settled is returned as is.
    fn arm(self: &Arc<Self>, station_id: &str, id_tag: &str) -> ConnectionPhase {
        let window = if self.is_demo(station_id) {
            self.config.demo_await_window()
        } else {
            self.config.await_window()
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        let id = station_id.to_string();
        let timeout = ScheduledTask::once(window, async move {
            if let Some(orchestrator) = weak.upgrade() {
                orchestrator.on_timeout(&id);
            }
        });

        match self.phases.get_mut(station_id) {
            Some(mut entry) if entry.phase == ConnectionPhase::AwaitingCar => {
                entry.timeout = Some(timeout);
                info!(station_id, id_tag, window_secs = window.as_secs(), "Awaiting car");
                self.publish(station_id, ConnectionPhase::AwaitingCar);
                ConnectionPhase::AwaitingCar
            }
            Some(entry) => {
                debug!(
                    station_id,
                    phase = %entry.phase,
                    "Start settled while the command was in flight"
                );
                entry.phase
            }
            None => ConnectionPhase::None,
        }
    }

    fn on_timeout(&self, station_id: &str) {
        let id_tag = match self.phases.get(station_id) {
            Some(entry) if entry.phase == ConnectionPhase::AwaitingCar => entry.id_tag.clone(),
            _ => return,
        };

        let outcome = if self.is_demo(station_id) {
            match self.start_demo(station_id, id_tag) {
                Ok(()) => ConnectionPhase::Started,
                Err(e) => {
                    warn!(station_id, error = %e, "Demo auto-start failed");
                    ConnectionPhase::Timeout
                }
            }
        } else if self
            .registry
            .get(station_id)
            .is_ok_and(|station| station.is_charging())
        {
            ConnectionPhase::Started
        } else {
            ConnectionPhase::Timeout
        };

        self.resolve(station_id, outcome);
    }

    fn start_demo(&self, station_id: &str, id_tag: String) -> DomainResult<()> {
        if !self.simulation.is_simulated(station_id) {
            self.simulation.simulate_connect(station_id)?;
        }
        if !self.registry.get(station_id)?.is_charging() {
            self.simulation.simulate_start(
                station_id,
                SimulateStart {
                    id_tag: Some(id_tag),
                    start_soc: None,
                },
            )?;
        }
        Ok(())
    }

    /// Settle a pending phase. Returns false when nothing was awaiting.
    fn resolve(&self, station_id: &str, outcome: ConnectionPhase) -> bool {
        self.in_progress.remove(station_id);
        let timeout = match self.phases.get_mut(station_id) {
            Some(mut entry) if entry.phase == ConnectionPhase::AwaitingCar => {
                entry.phase = outcome;
                entry.timeout.take()
            }
            _ => return false,
        };
        drop(timeout);
        self.publish(station_id, outcome);
        true
    }

    /// Short-circuit to `started`, e.g. on a TransactionStarted event.
    pub fn mark_started(&self, station_id: &str) -> bool {
        self.resolve(station_id, ConnectionPhase::Started)
    }

    /// Cancel any pending start and stop the running transaction.
    pub fn request_stop(&self, station_id: &str) -> DomainResult<()> {
        self.in_progress.remove(station_id);
        let cleared = match self.phases.get_mut(station_id) {
            Some(mut entry) if entry.phase != ConnectionPhase::None => {
                entry.phase = ConnectionPhase::None;
                drop(entry.timeout.take());
                true
            }
            _ => false,
        };
        if cleared {
            self.publish(station_id, ConnectionPhase::None);
        }

        let station = self.registry.get(station_id)?;
        let Some(tx) = station.current_transaction else {
            return Err(DomainError::NoActiveTransaction(station_id.to_string()));
        };

        match station.connection_source {
            ConnectionSource::Simulation => {
                self.simulation.simulate_stop(station_id)?;
            }
            ConnectionSource::Ocpp => {
                let payload = remote_stop::request(tx.id)
                    .map_err(|e| DomainError::Validation(e.to_string()))?;
                if !self.commands.send(station_id, remote_stop::ACTION, payload) {
                    return Err(DomainError::ChargerOffline(station_id.to_string()));
                }
            }
            ConnectionSource::Citrineos | ConnectionSource::None => {
                return Err(DomainError::ChargerOffline(station_id.to_string()));
            }
        }
        info!(station_id, transaction_id = tx.id, "Stop requested");
        Ok(())
    }

    /// Resolve phases from TransactionStarted events until shutdown.
    pub fn spawn_event_watcher(self: &Arc<Self>, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let mut events = self.registry.event_bus().subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = events.recv() => match msg {
                        Some(msg) => {
                            if let Event::TransactionStarted(e) = &msg.event {
                                if orchestrator.mark_started(&e.station_id) {
                                    debug!(station_id = %e.station_id, "Start confirmed by transaction");
                                }
                            }
                        }
                        None => break,
                    },
                    _ = shutdown.wait() => break,
                }
            }
            debug!("Phase event watcher stopped");
        })
    }
}
