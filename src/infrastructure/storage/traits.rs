//! Storage trait definitions

use async_trait::async_trait;

use crate::domain::{DomainResult, StationRecord};

/// Persistence port for the durable part of a station.
///
/// Live fields (connection, transaction, telemetry) never reach the store;
/// they are rebuilt from charger traffic after a restart.
#[async_trait]
pub trait StationStore: Send + Sync {
    /// Insert or replace.
    async fn save(&self, record: StationRecord) -> DomainResult<()>;
    async fn delete(&self, id: &str) -> DomainResult<()>;
    async fn load_all(&self) -> DomainResult<Vec<StationRecord>>;
}
