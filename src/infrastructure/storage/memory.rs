//! In-memory storage implementation

use async_trait::async_trait;
use dashmap::DashMap;

use super::StationStore;
use crate::domain::{DomainResult, StationRecord};

/// In-memory station store for development and testing
#[derive(Default)]
pub struct InMemoryStationStore {
    records: DashMap<String, StationRecord>,
}

impl InMemoryStationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = StationRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.records.insert(record.id.clone(), record);
        }
        store
    }

    pub fn get(&self, id: &str) -> Option<StationRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StationStore for InMemoryStationStore {
    async fn save(&self, record: StationRecord) -> DomainResult<()> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        self.records.remove(id);
        Ok(())
    }

    async fn load_all(&self) -> DomainResult<Vec<StationRecord>> {
        let mut records: Vec<_> = self.records.iter().map(|e| e.value().clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Station;

    #[tokio::test]
    async fn save_replaces_and_delete_removes() {
        let store = InMemoryStationStore::new();
        let mut record = Station::new("CP1", 0.35).record();
        store.save(record.clone()).await.unwrap();

        record.vendor = Some("ACME".into());
        store.save(record).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("CP1").unwrap().vendor.as_deref(), Some("ACME"));

        store.delete("CP1").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn load_all_is_sorted_by_id() {
        let store = InMemoryStationStore::with_records(vec![
            Station::new("CP2", 0.35).record(),
            Station::new("CP1", 0.35).record(),
        ]);
        let ids: Vec<_> = store.load_all().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["CP1", "CP2"]);
    }
}
