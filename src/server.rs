//! Central system runtime
//!
//! [`Csms`] wires every core component from an [`AppConfig`] without
//! touching the network. [`ServerHandle`] starts the background tasks and
//! the OCPP WebSocket server on top of it and tears everything down again.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::charging::TransactionMachine;
use crate::application::commands::{CommandSender, SharedCommandSender};
use crate::application::events::{create_event_bus, SharedEventBus};
use crate::application::handlers::OcppServices;
use crate::application::ingest::{ExternalEventIngest, SharedExternalEventIngest};
use crate::application::phase::{ConnectionPhaseOrchestrator, SharedPhaseOrchestrator};
use crate::application::registry::{SharedStationRegistry, StationRegistry};
use crate::application::services::LivenessMonitor;
use crate::application::session::{SessionManager, SessionRegistry, SharedSessionManager};
use crate::application::simulation::{SharedSimulationEngine, SimulationEngine};
use crate::config::AppConfig;
use crate::infrastructure::{InMemoryStationStore, StationStore};
use crate::interfaces::ws::OcppServer;
use crate::support::shutdown::{ShutdownCoordinator, ShutdownSignal};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// All core components, wired.
#[derive(Clone)]
pub struct Csms {
    pub config: AppConfig,
    pub event_bus: SharedEventBus,
    pub registry: SharedStationRegistry,
    pub machine: Arc<TransactionMachine>,
    pub sessions: SharedSessionManager,
    pub commands: SharedCommandSender,
    pub simulation: SharedSimulationEngine,
    pub phases: SharedPhaseOrchestrator,
    pub ingest: SharedExternalEventIngest,
}

impl Csms {
    /// Build every component. `store` receives durable station fields;
    /// `None` keeps everything in memory only.
    pub fn build(config: AppConfig, store: Option<Arc<dyn StationStore>>) -> Self {
        let event_bus = create_event_bus();
        let price = config.pricing.default_price_per_kwh;
        let registry = match store {
            Some(store) => StationRegistry::with_persistence(event_bus.clone(), price, store),
            None => StationRegistry::new(event_bus.clone(), price),
        }
        .shared();

        let machine = Arc::new(TransactionMachine::new(registry.clone()));
        let session_registry = SessionRegistry::shared();
        let commands = Arc::new(CommandSender::with_timeout(
            session_registry.clone(),
            machine.clone(),
            config.commands.response_timeout(),
        ));
        let simulation = SimulationEngine::new(machine.clone(), config.simulation.clone()).shared();
        let sessions = Arc::new(SessionManager::new(
            registry.clone(),
            session_registry,
            machine.clone(),
            commands.clone(),
            simulation.clone(),
        ));
        let phases = ConnectionPhaseOrchestrator::new(
            registry.clone(),
            commands.clone(),
            simulation.clone(),
            config.phase.clone(),
        )
        .shared();
        let ingest = Arc::new(ExternalEventIngest::new(machine.clone(), simulation.clone()));

        Self {
            config,
            event_bus,
            registry,
            machine,
            sessions,
            commands,
            simulation,
            phases,
            ingest,
        }
    }

    /// Load durable station fields from `store` into the registry.
    pub async fn hydrate(&self, store: &dyn StationStore) -> usize {
        match store.load_all().await {
            Ok(records) => {
                let count = self.registry.hydrate(records);
                info!(count, "Stations restored");
                count
            }
            Err(e) => {
                error!(error = %e, "Failed to load stations, starting empty");
                0
            }
        }
    }

    pub fn ocpp_services(&self) -> OcppServices {
        OcppServices {
            sessions: self.sessions.clone(),
            machine: self.machine.clone(),
            commands: self.commands.clone(),
            heartbeat_interval: self.config.server.heartbeat_interval,
        }
    }

    pub fn liveness_monitor(&self) -> LivenessMonitor {
        LivenessMonitor::new(self.sessions.clone(), self.config.liveness.clone())
    }
}

/// Handle to a running central system.
pub struct ServerHandle {
    csms: Csms,
    liveness: Arc<LivenessMonitor>,
    shutdown: ShutdownSignal,
    tasks: Vec<JoinHandle<()>>,
    server: JoinHandle<Result<(), BoxError>>,
}

impl ServerHandle {
    /// Start with the bundled in-memory store.
    pub async fn start(config: AppConfig) -> Result<Self, BoxError> {
        let store: Arc<dyn StationStore> = Arc::new(InMemoryStationStore::new());
        Self::start_with_store(config, store, ShutdownSignal::new()).await
    }

    pub async fn start_with_store(
        config: AppConfig,
        store: Arc<dyn StationStore>,
        shutdown: ShutdownSignal,
    ) -> Result<Self, BoxError> {
        let csms = Csms::build(config, Some(store.clone()));
        csms.hydrate(store.as_ref()).await;

        let listener = TcpListener::bind(csms.config.server.address()).await?;
        info!(address = %csms.config.server.address(), "🔌 OCPP Central System listening");

        let liveness = Arc::new(csms.liveness_monitor());
        let tasks = vec![
            liveness.start(shutdown.clone()),
            csms.commands
                .spawn_sweeper(csms.config.commands.sweep_interval(), shutdown.clone()),
            csms.phases.spawn_event_watcher(shutdown.clone()),
        ];

        let server = OcppServer::new(csms.config.server.clone(), csms.ocpp_services())
            .with_shutdown(shutdown.clone());
        let server = tokio::spawn(async move { server.serve(listener).await });

        Ok(Self {
            csms,
            liveness,
            shutdown,
            tasks,
            server,
        })
    }

    pub fn csms(&self) -> &Csms {
        &self.csms
    }

    pub fn liveness(&self) -> &Arc<LivenessMonitor> {
        &self.liveness
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Wait until the WebSocket server exits, then stop the rest.
    pub async fn wait(self) {
        let Self {
            csms,
            shutdown,
            tasks,
            server,
            ..
        } = self;

        match server.await {
            Ok(Ok(())) => info!("WebSocket server stopped"),
            Ok(Err(e)) => error!(error = %e, "WebSocket server error"),
            Err(e) => error!(error = %e, "WebSocket server task panicked"),
        }

        shutdown.trigger();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        csms.simulation.shutdown();
    }

    /// Trigger shutdown and wait for everything to stop.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.wait().await;
    }
}

/// Run until SIGINT/SIGTERM, bounded by the configured shutdown timeout.
pub async fn run(config: AppConfig) -> Result<(), BoxError> {
    let coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);
    coordinator.start_signal_listener();

    let store: Arc<dyn StationStore> = Arc::new(InMemoryStationStore::new());
    let handle = ServerHandle::start_with_store(config, store, coordinator.signal()).await?;
    info!("🚀 Central system started. Press Ctrl+C to shutdown gracefully.");

    let completed = coordinator.shutdown_with_cleanup(|| handle.wait()).await;
    if !completed {
        warn!("Some tasks were still running at exit");
    }
    info!("👋 Central system shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::application::handlers::OcppHandlerV16;
    use crate::application::simulation::SimulateStart;
    use crate::domain::{
        ConnectionPhase, DomainError, NewStation, OcppVersion, StationRecord, StationStatus,
    };

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".into();
        config.server.port = 0;
        config.simulation.seed = Some(7);
        config
    }

    #[tokio::test]
    async fn hydrate_restores_durable_fields() {
        let store = Arc::new(InMemoryStationStore::with_records(vec![StationRecord {
            id: "CP1".into(),
            name: Some("Depot".into()),
            power_kw: 50.0,
            price_per_kwh: 0.4,
            vendor: Some("ACME".into()),
            model: None,
            serial_number: None,
            firmware_version: None,
            session_history: Vec::new(),
        }]));
        let csms = Csms::build(config(), Some(store.clone()));
        assert_eq!(csms.hydrate(store.as_ref()).await, 1);

        let s = csms.registry.get("CP1").unwrap();
        assert_eq!(s.power_kw, 50.0);
        assert!(!s.connected);
        assert_eq!(s.status, StationStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn start_request_flows_through_simulation() {
        let csms = Csms::build(config(), None);
        let shutdown = ShutdownSignal::new();
        let watcher = csms.phases.spawn_event_watcher(shutdown.clone());

        csms.registry
            .create(NewStation {
                id: "X".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            csms.phases.request_start("X", "TAG"),
            Err(DomainError::ChargerOffline("X".into()))
        );

        csms.simulation.simulate_connect("X").unwrap();
        assert_eq!(
            csms.phases.request_start("X", "TAG").unwrap(),
            ConnectionPhase::AwaitingCar
        );

        csms.simulation
            .simulate_start(
                "X",
                SimulateStart {
                    id_tag: Some("TAG".into()),
                    start_soc: Some(20.0),
                },
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(csms.phases.phase("X"), ConnectionPhase::Started);

        csms.phases.request_stop("X").unwrap();
        let s = csms.registry.get("X").unwrap();
        assert!(s.current_transaction.is_none());
        assert_eq!(s.status, StationStatus::Available);

        shutdown.trigger();
        watcher.await.unwrap();
        csms.simulation.shutdown();
    }

    #[tokio::test]
    async fn configured_heartbeat_interval_reaches_boot_reply() {
        let config = AppConfig::from_toml("[server]\nheartbeat_interval = 120\n").unwrap();
        assert_eq!(config.server.heartbeat_interval, 120u32);
        let csms = Csms::build(config, None);

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut handler = OcppHandlerV16::new(csms.ocpp_services(), tx, OcppVersion::V16, None);
        handler.identify("CP1").unwrap();

        let boot = serde_json::json!([
            2,
            "b1",
            "BootNotification",
            {"chargePointVendor": "ACME", "chargePointModel": "X1"}
        ]);
        let reply = handler.handle(&boot.to_string()).unwrap();
        let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply[2]["interval"], 120);
        assert_eq!(reply[2]["status"], "Accepted");
    }

    #[tokio::test]
    async fn handle_starts_and_stops() {
        let handle = ServerHandle::start(config()).await.unwrap();
        assert!(handle.csms().registry.is_empty());
        handle.stop().await;
    }
}
