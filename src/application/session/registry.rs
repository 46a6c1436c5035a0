//! Session registry: live transport handles keyed by station id

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain::OcppVersion;

use super::connection::{Connection, EvictedSession};

/// Thread-safe registry of identified OCPP sessions.
///
/// Reconnects are last-writer-wins: every bind gets a fresh generation, and
/// unbinding with an older generation is a no-op.
pub struct SessionRegistry {
    sessions: DashMap<String, Connection>,
    next_generation: AtomicU64,
}

/// Shared, reference-counted session registry
pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    /// Bind a transport handle, replacing any older one. Returns the new generation.
    pub fn bind(
        &self,
        station_id: &str,
        sender: mpsc::UnboundedSender<String>,
        ocpp_version: OcppVersion,
        close_guard: Option<oneshot::Sender<()>>,
    ) -> (u64, Option<EvictedSession>) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let connection = Connection::new(generation, station_id, sender, ocpp_version, close_guard);
        let evicted = self
            .sessions
            .insert(station_id.to_string(), connection)
            .map(|old| old.evicted());

        match &evicted {
            Some(old) => info!(
                station_id,
                generation,
                replaced = old.generation,
                "Session replaced by newer connection"
            ),
            None => info!(station_id, generation, %ocpp_version, "Session bound"),
        }
        (generation, evicted)
    }

    /// Remove the handle only if `generation` is still current.
    pub fn unbind(&self, station_id: &str, generation: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(station_id, |_, conn| conn.generation == generation)
            .is_some();
        if removed {
            info!(station_id, generation, "Session unbound");
        } else {
            debug!(station_id, generation, "Ignoring unbind of stale session");
        }
        removed
    }

    /// Remove whatever handle is current. Returns its generation.
    pub fn evict(&self, station_id: &str) -> Option<u64> {
        self.sessions
            .remove(station_id)
            .map(|(_, conn)| conn.generation)
    }

    pub fn is_current(&self, station_id: &str, generation: u64) -> bool {
        self.sessions
            .get(station_id)
            .is_some_and(|conn| conn.generation == generation)
    }

    pub fn generation(&self, station_id: &str) -> Option<u64> {
        self.sessions.get(station_id).map(|conn| conn.generation)
    }

    /// Send a message to a specific station
    pub fn send_to(&self, station_id: &str, message: String) -> Result<(), String> {
        match self.sessions.get(station_id) {
            Some(conn) => conn.send(message),
            None => Err(format!("Station {} not connected", station_id)),
        }
    }

    pub fn touch(&self, station_id: &str) {
        if let Some(mut conn) = self.sessions.get_mut(station_id) {
            conn.touch();
        }
    }

    pub fn is_connected(&self, station_id: &str) -> bool {
        self.sessions.contains_key(station_id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sessions.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn get_version(&self, station_id: &str) -> Option<OcppVersion> {
        self.sessions.get(station_id).map(|conn| conn.ocpp_version)
    }

    /// Drop every handle, closing all sockets. Used on shutdown.
    pub fn drain(&self) -> Vec<(String, u64)> {
        let ids = self.connected_ids();
        let mut drained = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((id, conn)) = self.sessions.remove(&id) {
                drained.push((id, conn.generation));
            }
        }
        if !drained.is_empty() {
            warn!(count = drained.len(), "Closed all sessions");
        }
        drained
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
