//! Pending-call tracker for Central System to charger communication
//!
//! Sends OCPP Call frames to stations and correlates CallResult / CallError
//! frames back to them by unique id. Two flavours:
//!
//! - [`CommandSender::send`]: fire-and-forget, the result is only logged and
//!   post-processed (GetConfiguration fills the station configuration).
//! - [`CommandSender::send_command`]: awaits the charger's answer for at most
//!   the response timeout.
//!
//! Entries never outlive the timeout; [`CommandSender::spawn_sweeper`] drops
//! anything older.

pub mod change_configuration;
pub mod get_configuration;
pub mod remote_start;
pub mod remote_stop;
pub mod reset;
pub mod trigger_message;
pub mod unlock_connector;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_ocpp::v1_6::messages::get_configuration::GetConfigurationResponse;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::application::charging::TransactionMachine;
use crate::application::session::SharedSessionRegistry;
use crate::domain::ConfigEntry;
use crate::support::ocpp_frame::OcppFrame;
use crate::support::shutdown::ShutdownSignal;

pub use change_configuration::change_configuration;
pub use get_configuration::{get_configuration, ConfigurationResult};
pub use remote_start::remote_start_transaction;
pub use remote_stop::remote_stop_transaction;
pub use reset::{reset, ResetKind};
pub use trigger_message::{trigger_message, TriggerType};
pub use unlock_connector::unlock_connector;

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

pub const GET_CONFIGURATION: &str = "GetConfiguration";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Station not connected: {0}")]
    NotConnected(String),
    #[error("Failed to send: {0}")]
    SendFailed(String),
    #[error("Response timeout")]
    Timeout,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("CallError {code}: {description}")]
    CallError { code: String, description: String },
}

/// Outstanding Call waiting for its answer
struct PendingCall {
    station_id: String,
    action: String,
    payload: Value,
    issued_at: Instant,
    wall_clock: DateTime<Utc>,
    responder: Option<oneshot::Sender<Result<Value, CommandError>>>,
}

/// Read-only view of a pending call for admin views
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCallInfo {
    pub unique_id: String,
    pub station_id: String,
    pub action: String,
    pub payload: Value,
    pub issued_at: DateTime<Utc>,
}

pub struct CommandSender {
    sessions: SharedSessionRegistry,
    machine: Arc<TransactionMachine>,
    pending: DashMap<String, PendingCall>,
    response_timeout: Duration,
}

/// Thread-safe command sender
pub type SharedCommandSender = Arc<CommandSender>;

impl CommandSender {
    pub fn new(sessions: SharedSessionRegistry, machine: Arc<TransactionMachine>) -> Self {
        Self::with_timeout(sessions, machine, DEFAULT_RESPONSE_TIMEOUT)
    }

    pub fn with_timeout(
        sessions: SharedSessionRegistry,
        machine: Arc<TransactionMachine>,
        response_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            machine,
            pending: DashMap::new(),
            response_timeout,
        }
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    fn register_and_transmit(
        &self,
        station_id: &str,
        action: &str,
        payload: Value,
        responder: Option<oneshot::Sender<Result<Value, CommandError>>>,
    ) -> Result<String, CommandError> {
        if !self.sessions.is_connected(station_id) {
            return Err(CommandError::NotConnected(station_id.to_string()));
        }

        let frame = OcppFrame::new_call(action, payload.clone());
        let unique_id = frame.unique_id().to_string();
        self.pending.insert(
            unique_id.clone(),
            PendingCall {
                station_id: station_id.to_string(),
                action: action.to_string(),
                payload,
                issued_at: Instant::now(),
                wall_clock: Utc::now(),
                responder,
            },
        );

        if let Err(e) = self.sessions.send_to(station_id, frame.serialize()) {
            self.pending.remove(&unique_id);
            return Err(CommandError::NotConnected(e));
        }

        metrics::counter!("ocpp_commands_total", "action" => action.to_string()).increment(1);
        info!(station_id, action, unique_id = %unique_id, "Call sent");
        Ok(unique_id)
    }

    /// Fire-and-forget. False when the station has no live handle.
    pub fn send(&self, station_id: &str, action: &str, payload: Value) -> bool {
        match self.register_and_transmit(station_id, action, payload, None) {
            Ok(_) => true,
            Err(e) => {
                warn!(station_id, action, error = %e, "Call not sent");
                false
            }
        }
    }

    /// Send and wait for the charger's answer.
    pub async fn send_command(
        &self,
        station_id: &str,
        action: &str,
        payload: Value,
    ) -> Result<Value, CommandError> {
        let (tx, rx) = oneshot::channel();
        let started = Instant::now();
        let unique_id = self.register_and_transmit(station_id, action, payload, Some(tx))?;

        let outcome = match timeout(self.response_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.remove(&unique_id);
                Err(CommandError::NotConnected(station_id.to_string()))
            }
            Err(_) => {
                self.pending.remove(&unique_id);
                warn!(station_id, action, unique_id = %unique_id, "Command timed out");
                Err(CommandError::Timeout)
            }
        };

        metrics::histogram!("ocpp_command_latency_seconds", "action" => action.to_string())
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    /// Consume the entry for a CallResult and run per-action post-processing.
    pub fn handle_response(&self, station_id: &str, unique_id: &str, payload: Value) {
        let Some((_, pending)) = self
            .pending
            .remove_if(unique_id, |_, p| p.station_id == station_id)
        else {
            warn!(station_id, unique_id, "CallResult for unknown request");
            return;
        };

        let status = payload.get("status").and_then(Value::as_str);
        info!(
            station_id,
            action = %pending.action,
            unique_id,
            status = status.unwrap_or("-"),
            "CallResult received"
        );

        if pending.action == GET_CONFIGURATION {
            self.store_configuration(station_id, &payload);
        }

        if let Some(responder) = pending.responder {
            let _ = responder.send(Ok(payload));
        }
    }

    /// Consume the entry for a CallError. Never retried.
    pub fn handle_error(
        &self,
        station_id: &str,
        unique_id: &str,
        error_code: &str,
        error_description: &str,
    ) {
        let Some((_, pending)) = self
            .pending
            .remove_if(unique_id, |_, p| p.station_id == station_id)
        else {
            warn!(station_id, unique_id, error_code, "CallError for unknown request");
            return;
        };

        warn!(
            station_id,
            action = %pending.action,
            unique_id,
            error_code,
            error_description,
            "CallError received"
        );
        if let Some(responder) = pending.responder {
            let _ = responder.send(Err(CommandError::CallError {
                code: error_code.to_string(),
                description: error_description.to_string(),
            }));
        }
    }

    fn store_configuration(&self, station_id: &str, payload: &Value) {
        let response: GetConfigurationResponse = match serde_json::from_value(payload.clone()) {
            Ok(r) => r,
            Err(e) => {
                warn!(station_id, error = %e, "Unparseable GetConfiguration result");
                return;
            }
        };
        let entries: BTreeMap<String, ConfigEntry> = response
            .configuration_key
            .unwrap_or_default()
            .into_iter()
            .map(|kv| {
                (
                    kv.key,
                    ConfigEntry {
                        value: kv.value,
                        readonly: kv.readonly,
                    },
                )
            })
            .collect();
        let unknown = response.unknown_key.unwrap_or_default();
        if let Err(e) = self.machine.apply_configuration(station_id, entries, &unknown) {
            warn!(station_id, error = %e, "Configuration not stored");
        }
    }

    /// Abandon entries older than `max_age`. Returns how many were dropped.
    pub fn expire_stale(&self, max_age: Duration) -> usize {
        let before = self.pending.len();
        self.pending.retain(|unique_id, p| {
            let keep = p.issued_at.elapsed() <= max_age;
            if !keep {
                debug!(
                    station_id = %p.station_id,
                    action = %p.action,
                    unique_id = %unique_id,
                    "Pending call expired"
                );
            }
            keep
        });
        before.saturating_sub(self.pending.len())
    }

    /// Drop everything pending for a station whose transport went away.
    pub fn cleanup_station(&self, station_id: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.station_id != station_id);
        let dropped = before.saturating_sub(self.pending.len());
        if dropped > 0 {
            info!(station_id, dropped, "Dropped pending calls for disconnected station");
        }
        dropped
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_for(&self, station_id: &str) -> Vec<PendingCallInfo> {
        let mut calls: Vec<_> = self
            .pending
            .iter()
            .filter(|e| e.station_id == station_id)
            .map(|e| PendingCallInfo {
                unique_id: e.key().clone(),
                station_id: e.station_id.clone(),
                action: e.action.clone(),
                payload: e.payload.clone(),
                issued_at: e.wall_clock,
            })
            .collect();
        calls.sort_by_key(|c| c.issued_at);
        calls
    }

    /// Periodic [`expire_stale`](Self::expire_stale) until shutdown.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        let sender = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let expired = sender.expire_stale(sender.response_timeout);
                        if expired > 0 {
                            info!(expired, "Expired stale pending calls");
                        }
                    }
                    _ = shutdown.wait() => {
                        debug!("Pending-call sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}

/// Shared helper for the typed command wrappers.
pub(crate) fn to_payload<T: serde::Serialize>(request: &T) -> Result<Value, CommandError> {
    serde_json::to_value(request)
        .map_err(|e| CommandError::SendFailed(format!("Serialization failed: {}", e)))
}

pub(crate) fn from_payload<T: serde::de::DeserializeOwned>(
    value: Value,
) -> Result<T, CommandError> {
    serde_json::from_value(value)
        .map_err(|e| CommandError::InvalidResponse(format!("Failed to parse response: {}", e)))
}
