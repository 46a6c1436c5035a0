//! Simulation engine
//!
//! Drives stations with no hardware behind them through the same transaction
//! machine a real charger uses. Each simulated station owns a heartbeat timer
//! and, while charging, a meter timer; both live in its [`SimulationHandle`]
//! and die with it.

use std::future::ready;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::meter_model::{MeterModel, TickInput};
use crate::application::charging::{StartRequest, StopRequest, TransactionMachine};
use crate::application::events::{Event, StationConnectedEvent, StationDisconnectedEvent};
use crate::config::SimulationConfig;
use crate::domain::{
    CompletedSession, ConnectionSource, DomainError, DomainResult, StationStatus, Transaction,
};
use crate::support::timer::ScheduledTask;

/// Start parameters for a simulated transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulateStart {
    pub id_tag: Option<String>,
    pub start_soc: Option<f64>,
}

/// What a real charger took over from [`SimulationEngine::supersede`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superseded {
    pub was_charging: bool,
}

/// Timers of one simulated station. Dropping it cancels both.
struct SimulationHandle {
    _heartbeat: ScheduledTask,
    meter: Option<ScheduledTask>,
}

pub struct SimulationEngine {
    machine: Arc<TransactionMachine>,
    handles: DashMap<String, SimulationHandle>,
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

pub type SharedSimulationEngine = Arc<SimulationEngine>;

impl SimulationEngine {
    pub fn new(machine: Arc<TransactionMachine>, config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            machine,
            handles: DashMap::new(),
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn shared(self) -> SharedSimulationEngine {
        Arc::new(self)
    }

    pub fn is_simulated(&self, station_id: &str) -> bool {
        self.handles.contains_key(station_id)
    }

    pub fn simulated_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.handles.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }

    /// Bring a station online under simulation.
    pub fn simulate_connect(&self, station_id: &str) -> DomainResult<()> {
        let registry = self.machine.registry();
        let station = registry.get(station_id)?;
        if station.connected && station.connection_source == ConnectionSource::Ocpp {
            return Err(DomainError::HardwareConnected(station_id.to_string()));
        }

        if self.is_simulated(station_id) {
            self.simulate_disconnect(station_id)?;
        }

        registry.update(station_id, |station| {
            station.mark_connected(ConnectionSource::Simulation, Utc::now());
            if !station.is_charging() {
                station.status = StationStatus::Available;
            }
        })?;

        let machine = Arc::clone(&self.machine);
        let id = station_id.to_string();
        let heartbeat = ScheduledTask::every(self.config.heartbeat_interval(), move || {
            if let Err(e) = machine.registry().update(&id, |s| s.touch(Utc::now())) {
                debug!(station_id = %id, error = %e, "Simulated heartbeat skipped");
            }
            ready(())
        });
        self.handles.insert(
            station_id.to_string(),
            SimulationHandle {
                _heartbeat: heartbeat,
                meter: None,
            },
        );

        info!(station_id, "Simulation connected");
        registry
            .event_bus()
            .publish(Event::StationConnected(StationConnectedEvent {
                station_id: station_id.to_string(),
                source: ConnectionSource::Simulation,
                ocpp_version: None,
                timestamp: Utc::now(),
            }));
        Ok(())
    }

    /// Start a simulated transaction with a random id and meter start.
    pub fn simulate_start(
        &self,
        station_id: &str,
        params: SimulateStart,
    ) -> DomainResult<Transaction> {
        if !self.is_simulated(station_id) {
            return Err(DomainError::NotSimulated(station_id.to_string()));
        }

        let (transaction_id, meter_start, meter_seed) = self.with_rng(|rng| {
            (
                rng.gen_range(100_000..1_000_000),
                rng.gen_range(1_000..=50_000) as f64,
                rng.gen::<u64>(),
            )
        });
        let start_soc = params
            .start_soc
            .unwrap_or(self.config.default_start_soc)
            .clamp(0.0, 100.0);

        let tx = self.machine.start_transaction(
            station_id,
            StartRequest {
                id_tag: params.id_tag.unwrap_or_else(|| self.config.id_tag.clone()),
                meter_start,
                timestamp: Some(Utc::now()),
                transaction_id: Some(transaction_id),
                soc: Some(start_soc),
            },
            ConnectionSource::Simulation,
        )?;

        let meter = self.spawn_meter(station_id, start_soc, meter_seed);
        match self.handles.get_mut(station_id) {
            Some(mut handle) => handle.meter = Some(meter),
            None => {
                // Torn down between the check and the start.
                warn!(station_id, "Simulation vanished during start, closing transaction");
                drop(meter);
                let _ = self.machine.stop_transaction(station_id, StopRequest::default());
                return Err(DomainError::NotSimulated(station_id.to_string()));
            }
        }

        info!(station_id, transaction_id = tx.id, start_soc, "Simulated charging started");
        Ok(tx)
    }

    fn spawn_meter(&self, station_id: &str, start_soc: f64, seed: u64) -> ScheduledTask {
        let machine = Arc::clone(&self.machine);
        let id = station_id.to_string();
        let pack_kwh = self.config.pack_kwh;
        let interval = self.config.meter_interval();
        let tick_secs = interval.as_secs_f64();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut elapsed = 0.0;

        ScheduledTask::every(interval, move || {
            elapsed += tick_secs;
            let station = match machine.registry().get(&id) {
                Ok(station) => station,
                Err(_) => return ready(()),
            };
            let Some(tx) = station.current_transaction else {
                return ready(());
            };

            let model = MeterModel::new(station.power_kw, pack_kwh, tick_secs);
            let input = TickInput {
                elapsed_secs: elapsed,
                meter_value: tx.meter_value,
                soc: tx.soc.unwrap_or(start_soc),
                temperature: tx.temperature,
            };
            let reading = model.tick(input, &mut rng);
            if let Err(e) = machine.apply_meter_reading(&id, reading) {
                debug!(station_id = %id, error = %e, "Simulated meter tick skipped");
            }
            ready(())
        })
    }

    /// Stop simulated charging through the regular StopTransaction path.
    pub fn simulate_stop(&self, station_id: &str) -> DomainResult<CompletedSession> {
        let meter = match self.handles.get_mut(station_id) {
            Some(mut handle) => handle.meter.take(),
            None => return Err(DomainError::NotSimulated(station_id.to_string())),
        };
        drop(meter);

        self.machine.stop_transaction(
            station_id,
            StopRequest {
                reason: Some("Local".to_string()),
                ..Default::default()
            },
        )
    }

    /// Tear the simulation down. Idempotent; returns whether anything was running.
    pub fn simulate_disconnect(&self, station_id: &str) -> DomainResult<bool> {
        let handle = self.handles.remove(station_id).map(|(_, h)| h);
        let was_running = handle.is_some();
        drop(handle);

        let registry = self.machine.registry();
        let station = match registry.get(station_id) {
            Ok(station) => station,
            Err(_) if !was_running => return Ok(false),
            Err(e) => return Err(e),
        };
        if station.connection_source != ConnectionSource::Simulation || !station.connected {
            return Ok(was_running);
        }

        if station.is_charging() {
            self.machine.stop_transaction(
                station_id,
                StopRequest {
                    reason: Some("EVDisconnected".to_string()),
                    ..Default::default()
                },
            )?;
        }
        registry.update(station_id, |station| {
            if station.connection_source == ConnectionSource::Simulation {
                station.mark_offline();
            }
        })?;

        info!(station_id, "Simulation disconnected");
        registry
            .event_bus()
            .publish(Event::StationDisconnected(StationDisconnectedEvent {
                station_id: station_id.to_string(),
                source: ConnectionSource::Simulation,
                reason: Some("simulation stopped".to_string()),
                timestamp: Utc::now(),
            }));
        Ok(true)
    }

    /// Cancel the timers of a station a real charger has just claimed.
    /// The station record is left to the new owner, which must close out a
    /// simulated transaction when `was_charging` is set.
    pub fn supersede(&self, station_id: &str) -> Option<Superseded> {
        let (_, handle) = self.handles.remove(station_id)?;
        let was_charging = handle.meter.is_some();
        drop(handle);
        info!(station_id, was_charging, "Simulation superseded by real charger");
        Some(Superseded { was_charging })
    }

    /// Connect every idle station and start charging on the demo station.
    /// Returns the ids this call connected.
    pub fn run_demo_scenario(&self, demo_station: Option<&str>) -> DomainResult<Vec<String>> {
        let mut connected = Vec::new();
        for station in self.machine.registry().list() {
            if station.connected {
                continue;
            }
            match self.simulate_connect(&station.id) {
                Ok(()) => connected.push(station.id),
                Err(e) => warn!(station_id = %station.id, error = %e, "Demo connect skipped"),
            }
        }

        if let Some(demo) = demo_station {
            let charging = self.machine.registry().get(demo)?.is_charging();
            if self.is_simulated(demo) && !charging {
                self.simulate_start(demo, SimulateStart::default())?;
            }
        }

        info!(count = connected.len(), "Demo scenario running");
        Ok(connected)
    }

    /// Stop every simulation. Used on shutdown.
    pub fn shutdown(&self) {
        for id in self.simulated_ids() {
            if let Err(e) = self.simulate_disconnect(&id) {
                warn!(station_id = %id, error = %e, "Simulation teardown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::application::registry::StationRegistry;
    use crate::domain::{NewStation, MAX_SESSION_HISTORY};
    use std::time::Duration;

    fn engine() -> SimulationEngine {
        let registry = Arc::new(StationRegistry::new(create_event_bus(), 0.35));
        for id in ["CP1", "CP2", "CP3"] {
            registry
                .create(NewStation {
                    id: id.into(),
                    power_kw: Some(22.0),
                    ..Default::default()
                })
                .unwrap();
        }
        let machine = Arc::new(TransactionMachine::new(registry));
        SimulationEngine::new(
            machine,
            SimulationConfig {
                seed: Some(11),
                ..Default::default()
            },
        )
    }

    fn station(engine: &SimulationEngine, id: &str) -> crate::domain::Station {
        engine.machine.registry().get(id).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn connect_marks_available_and_heartbeats() {
        let e = engine();
        e.simulate_connect("CP1").unwrap();
        let s = station(&e, "CP1");
        assert!(s.connected);
        assert_eq!(s.connection_source, ConnectionSource::Simulation);
        assert_eq!(s.status, StationStatus::Available);
        let count = s.message_count;

        tokio::time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(station(&e, "CP1").message_count, count + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_ramps_power_and_soc() {
        let e = engine();
        e.simulate_connect("CP1").unwrap();
        let tx = e
            .simulate_start(
                "CP1",
                SimulateStart {
                    id_tag: Some("DEMO".into()),
                    start_soc: Some(20.0),
                },
            )
            .unwrap();
        assert!((100_000..1_000_000).contains(&tx.id));
        assert!((1_000.0..=50_000.0).contains(&tx.meter_start));
        assert_eq!(station(&e, "CP1").status, StationStatus::Charging);

        tokio::time::sleep(Duration::from_millis(10_100)).await;
        let s = station(&e, "CP1");
        let live = s.current_transaction.unwrap();
        assert!(live.power > 0.0 && live.power < 22_000.0 * 0.5);
        assert!(live.meter_value > tx.meter_start);
        assert!(live.soc.unwrap() > 20.0);
        assert!(s.meter_history.len() >= 5);

        // Ramp completes at 30 s; rated power holds within the jitter band.
        tokio::time::sleep(Duration::from_secs(20)).await;
        let ramped = station(&e, "CP1").current_transaction.unwrap();
        assert!(
            (22_000.0 * 0.97..=22_000.0 * 1.03).contains(&ramped.power),
            "power at 30 s: {}",
            ramped.power
        );
        assert!(ramped.energy > 0.0);
        assert!(ramped.meter_value > live.meter_value);

        let err = e.simulate_start("CP1", SimulateStart::default()).unwrap_err();
        assert_eq!(err.to_string(), "Already charging");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_finalizes_and_cancels_meter() {
        let e = engine();
        e.simulate_connect("CP1").unwrap();
        e.simulate_start("CP1", SimulateStart::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(6_100)).await;

        let done = e.simulate_stop("CP1").unwrap();
        assert_ne!(done.energy_delivered, "");
        let s = station(&e, "CP1");
        assert!(s.current_transaction.is_none());
        assert_eq!(s.status, StationStatus::Available);
        assert!(s.meter_history.is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(station(&e, "CP1").meter_history.is_empty());
        assert_eq!(
            e.simulate_stop("CP1").unwrap_err().to_string(),
            "No active transaction"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent() {
        let e = engine();
        e.simulate_connect("CP1").unwrap();
        e.simulate_start("CP1", SimulateStart::default()).unwrap();

        assert!(e.simulate_disconnect("CP1").unwrap());
        let s = station(&e, "CP1");
        assert!(!s.connected);
        assert_eq!(s.status, StationStatus::Offline);
        assert!(s.current_transaction.is_none());
        assert_eq!(s.session_history.len(), 1);

        assert!(!e.simulate_disconnect("CP1").unwrap());
        assert_eq!(station(&e, "CP1").session_history.len(), 1);
        assert!(!e.simulate_disconnect("nope").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn start_requires_simulation() {
        let e = engine();
        let err = e.simulate_start("CP1", SimulateStart::default()).unwrap_err();
        assert_eq!(err.to_string(), "Station not connected to simulator");
    }

    #[tokio::test(start_paused = true)]
    async fn real_charger_blocks_simulation() {
        let e = engine();
        e.machine
            .registry()
            .update("CP1", |s| s.mark_connected(ConnectionSource::Ocpp, Utc::now()))
            .unwrap();
        let err = e.simulate_connect("CP1").unwrap_err();
        assert_eq!(err.to_string(), "Station is connected to real hardware");
    }

    #[tokio::test(start_paused = true)]
    async fn supersede_leaves_record_alone() {
        let e = engine();
        e.simulate_connect("CP1").unwrap();
        assert_eq!(e.supersede("CP1"), Some(Superseded { was_charging: false }));
        assert!(!e.is_simulated("CP1"));
        assert!(station(&e, "CP1").connected);
        assert_eq!(e.supersede("CP1"), None);

        e.simulate_connect("CP2").unwrap();
        e.simulate_start("CP2", SimulateStart::default()).unwrap();
        assert_eq!(e.supersede("CP2"), Some(Superseded { was_charging: true }));
        assert!(station(&e, "CP2").is_charging());
    }

    #[tokio::test(start_paused = true)]
    async fn demo_scenario_skips_connected_stations() {
        let e = engine();
        e.machine
            .registry()
            .update("CP2", |s| s.mark_connected(ConnectionSource::Ocpp, Utc::now()))
            .unwrap();

        let connected = e.run_demo_scenario(Some("CP3")).unwrap();
        assert_eq!(connected, vec!["CP1".to_string(), "CP3".to_string()]);
        assert!(station(&e, "CP3").is_charging());
        assert!(!station(&e, "CP1").is_charging());
        assert_eq!(station(&e, "CP2").connection_source, ConnectionSource::Ocpp);
    }

    #[tokio::test(start_paused = true)]
    async fn history_stays_bounded() {
        let e = engine();
        e.simulate_connect("CP1").unwrap();
        for _ in 0..(MAX_SESSION_HISTORY + 1) {
            e.simulate_start("CP1", SimulateStart::default()).unwrap();
            e.simulate_stop("CP1").unwrap();
        }
        assert_eq!(station(&e, "CP1").session_history.len(), MAX_SESSION_HISTORY);
    }
}
