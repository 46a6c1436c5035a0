//! WebSocket connection handle

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::domain::OcppVersion;

/// Live transport handle of an identified station.
///
/// Dropping the handle fires its close guard, which ends the owning socket task.
#[derive(Debug)]
pub struct Connection {
    /// Monotonic; a newer generation for the same station replaces this one
    pub generation: u64,
    pub station_id: String,
    pub sender: mpsc::UnboundedSender<String>,
    pub ocpp_version: OcppVersion,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    _close_guard: Option<oneshot::Sender<()>>,
}

/// Info returned when an existing session is replaced by a newer one
#[derive(Debug)]
pub struct EvictedSession {
    pub station_id: String,
    pub generation: u64,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        generation: u64,
        station_id: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
        ocpp_version: OcppVersion,
        close_guard: Option<oneshot::Sender<()>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            generation,
            station_id: station_id.into(),
            sender,
            ocpp_version,
            connected_at: now,
            last_activity: now,
            _close_guard: close_guard,
        }
    }

    /// Send a message to the station
    pub fn send(&self, message: String) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|e| format!("Failed to send message: {}", e))
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn evicted(&self) -> EvictedSession {
        EvictedSession {
            station_id: self.station_id.clone(),
            generation: self.generation,
            connected_at: self.connected_at,
            last_activity: self.last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (Connection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(1, "CP001", tx, OcppVersion::V16, None);
        (conn, rx)
    }

    #[test]
    fn send_delivers_message() {
        let (conn, mut rx) = make_connection();
        conn.send("hello".into()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn send_to_closed_channel_returns_error() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert!(conn.send("msg".into()).is_err());
    }

    #[tokio::test]
    async fn dropping_handle_fires_close_guard() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        let conn = Connection::new(3, "CP001", tx, OcppVersion::V16, Some(close_tx));
        drop(conn);
        assert!(close_rx.await.is_err());
    }
}
