//! OCPP 1.6 message handler
//!
//! One handler per WebSocket connection. It owns the connection's identity
//! state, parses raw OCPP-J frames, dispatches Calls to action handlers and
//! routes CallResult/CallError frames to the pending-call tracker.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::application::charging::TransactionMachine;
use crate::application::commands::SharedCommandSender;
use crate::application::handlers::ocpp_v16::{action_matcher, boot_rejected};
use crate::application::session::SharedSessionManager;
use crate::domain::{DomainResult, OcppVersion};
use crate::support::ocpp_frame::OcppFrame;

/// Collaborators shared by every connection's handler.
#[derive(Clone)]
pub struct OcppServices {
    pub sessions: SharedSessionManager,
    pub machine: Arc<TransactionMachine>,
    pub commands: SharedCommandSender,
    /// Seconds, advertised in the BootNotification response.
    pub heartbeat_interval: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unidentified,
    Identified { station_id: String, generation: u64 },
    Disconnected,
}

/// Handler for OCPP 1.6 messages
pub struct OcppHandlerV16 {
    pub services: OcppServices,
    sender: mpsc::UnboundedSender<String>,
    ocpp_version: OcppVersion,
    close_guard: Option<oneshot::Sender<()>>,
    state: SessionState,
}

impl OcppHandlerV16 {
    /// `close_guard` is moved into the session registry on identification;
    /// dropping it there closes this connection.
    pub fn new(
        services: OcppServices,
        sender: mpsc::UnboundedSender<String>,
        ocpp_version: OcppVersion,
        close_guard: Option<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            services,
            sender,
            ocpp_version,
            close_guard,
            state: SessionState::Unidentified,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn station_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Identified { station_id, .. } => Some(station_id),
            _ => None,
        }
    }

    /// Bind this connection to `station_id`.
    pub fn identify(&mut self, station_id: &str) -> DomainResult<u64> {
        let generation = self.services.sessions.identify(
            station_id,
            self.sender.clone(),
            self.ocpp_version,
            self.close_guard.take(),
        )?;
        self.state = SessionState::Identified {
            station_id: station_id.to_string(),
            generation,
        };
        Ok(generation)
    }

    /// Handle one inbound text frame. Returns the frame to send back, if any.
    pub fn handle(&mut self, text: &str) -> Option<String> {
        let frame = match OcppFrame::parse(text) {
            Ok(f) => f,
            Err(e) => {
                warn!(
                    station_id = ?self.station_id(),
                    error = %e,
                    raw = text,
                    "Dropping malformed frame"
                );
                return None;
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => self.handle_call(&unique_id, &action, payload),

            OcppFrame::CallResult { unique_id, payload } => {
                if let Some(station_id) = self.current_station() {
                    self.services.sessions.record_activity(&station_id);
                    self.services
                        .commands
                        .handle_response(&station_id, &unique_id, payload);
                }
                None
            }

            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                if let Some(station_id) = self.current_station() {
                    self.services.commands.handle_error(
                        &station_id,
                        &unique_id,
                        &error_code,
                        &error_description,
                    );
                }
                None
            }
        }
    }

    /// Transport closed. Only the current generation takes the station offline.
    pub fn close(&mut self, reason: &str) {
        if let SessionState::Identified {
            station_id,
            generation,
        } = &self.state
        {
            if !self.services.sessions.disconnect(station_id, *generation, reason) {
                debug!(station_id = %station_id, generation, "Superseded session closed");
            }
        }
        self.state = SessionState::Disconnected;
    }

    /// Station id, when this connection is still the current one for it.
    fn current_station(&self) -> Option<String> {
        match &self.state {
            SessionState::Identified {
                station_id,
                generation,
            } => {
                if self.services.sessions.is_current(station_id, *generation) {
                    Some(station_id.clone())
                } else {
                    debug!(station_id = %station_id, generation, "Frame from superseded session ignored");
                    None
                }
            }
            SessionState::Unidentified | SessionState::Disconnected => None,
        }
    }

    fn handle_call(&mut self, unique_id: &str, action: &str, payload: Value) -> Option<String> {
        metrics::counter!("ocpp_messages_total", "action" => action.to_string()).increment(1);

        let station_id = match self.state {
            SessionState::Unidentified => {
                if action != "BootNotification" {
                    warn!(action, unique_id, "Call before identification ignored");
                    return None;
                }
                let serial = payload
                    .get("chargePointSerialNumber")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                let Some(serial) = serial else {
                    warn!(unique_id, "BootNotification without serial, session stays unidentified");
                    return Some(result(unique_id, boot_rejected(self)));
                };
                if let Err(e) = self.identify(&serial) {
                    error!(station_id = %serial, error = %e, "Identification failed");
                    return None;
                }
                info!(station_id = %serial, "Identified by BootNotification serial");
                serial
            }
            SessionState::Identified { .. } => self.current_station()?,
            SessionState::Disconnected => return None,
        };

        info!(station_id = %station_id, action, "Received Call");
        self.services.sessions.record_activity(&station_id);
        let response = action_matcher(self, &station_id, action, &payload);
        Some(result(unique_id, response))
    }
}

fn result(unique_id: &str, payload: Value) -> String {
    OcppFrame::CallResult {
        unique_id: unique_id.to_string(),
        payload,
    }
    .serialize()
}
