//! Station registry
//!
//! Every mutation of a station goes through [`StationRegistry::update`], which
//! runs the closure under the map shard lock, then publishes a
//! `StationChanged` snapshot and queues a write of the durable fields.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::application::events::{
    Event, SharedEventBus, StationChangedEvent, StationRemovedEvent,
};
use crate::domain::{
    DomainError, DomainResult, NewStation, Station, StationPatch, StationRecord,
};
use crate::infrastructure::StationStore;

/// Write-behind operations for the persistence task
#[derive(Debug)]
enum PersistOp {
    Save(StationRecord),
    Delete(String),
}

pub struct StationRegistry {
    stations: DashMap<String, Station>,
    event_bus: SharedEventBus,
    persist: Option<mpsc::UnboundedSender<PersistOp>>,
    transaction_counter: AtomicI32,
    default_price: f64,
}

pub type SharedStationRegistry = Arc<StationRegistry>;

impl StationRegistry {
    /// Registry without a persistence port.
    pub fn new(event_bus: SharedEventBus, default_price: f64) -> Self {
        Self {
            stations: DashMap::new(),
            event_bus,
            persist: None,
            transaction_counter: AtomicI32::new(1),
            default_price,
        }
    }

    /// Registry writing durable fields through `store` on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_persistence(
        event_bus: SharedEventBus,
        default_price: f64,
        store: Arc<dyn StationStore>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistOp>();
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                let result = match op {
                    PersistOp::Save(record) => {
                        let id = record.id.clone();
                        store.save(record).await.map(|_| id)
                    }
                    PersistOp::Delete(id) => store.delete(&id).await.map(|_| id),
                };
                match result {
                    Ok(id) => debug!(station_id = %id, "Station persisted"),
                    Err(e) => error!(error = %e, "Failed to persist station"),
                }
            }
            debug!("Station persistence task stopped");
        });

        Self {
            persist: Some(tx),
            ..Self::new(event_bus, default_price)
        }
    }

    pub fn shared(self) -> SharedStationRegistry {
        Arc::new(self)
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.event_bus
    }

    pub fn default_price(&self) -> f64 {
        self.default_price
    }

    /// Load durable records saved by a previous run. Existing entries win.
    pub fn hydrate(&self, records: Vec<StationRecord>) -> usize {
        let mut loaded = 0;
        for record in records {
            if let Some(max_id) = record.session_history.iter().map(|s| s.id).max() {
                self.transaction_counter
                    .fetch_max(max_id.saturating_add(1), Ordering::SeqCst);
            }
            if let Entry::Vacant(slot) = self.stations.entry(record.id.clone()) {
                slot.insert(Station::from_record(record));
                loaded += 1;
            }
        }
        info!(loaded, "Station registry hydrated");
        loaded
    }

    /// Snapshot of one station.
    pub fn get(&self, id: &str) -> DomainResult<Station> {
        self.stations
            .get(id)
            .map(|s| s.clone())
            .ok_or_else(|| DomainError::StationNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stations.contains_key(id)
    }

    /// All stations ordered by id.
    pub fn list(&self) -> Vec<Station> {
        let mut stations: Vec<_> = self.stations.iter().map(|e| e.value().clone()).collect();
        stations.sort_by(|a, b| a.id.cmp(&b.id));
        stations
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.stations.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Explicit admin creation.
    pub fn create(&self, new: NewStation) -> DomainResult<Station> {
        if new.id.trim().is_empty() {
            return Err(DomainError::Validation("station id must not be empty".into()));
        }
        let station = match self.stations.entry(new.id.clone()) {
            Entry::Occupied(_) => return Err(DomainError::StationAlreadyExists(new.id)),
            Entry::Vacant(slot) => {
                let station = Station::from_new(new, self.default_price);
                slot.insert(station.clone());
                station
            }
        };
        info!(station_id = %station.id, "Station created");
        self.after_change(&station, true);
        Ok(station)
    }

    /// Auto-vivify a station on first contact. Returns true if it was created.
    pub fn ensure(&self, id: &str) -> bool {
        let created = match self.stations.entry(id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let station = Station::new(id, self.default_price);
                slot.insert(station.clone());
                Some(station)
            }
        };
        match created {
            Some(station) => {
                info!(station_id = id, "Station auto-registered on first contact");
                self.after_change(&station, true);
                true
            }
            None => false,
        }
    }

    /// Mutate one station atomically.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Station) -> R) -> DomainResult<R> {
        self.try_update(id, |station| Ok(f(station)))
    }

    /// Like [`update`](Self::update), but the closure may refuse. A refusal
    /// must leave the station untouched; nothing is published for it.
    pub fn try_update<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Station) -> DomainResult<R>,
    ) -> DomainResult<R> {
        let (result, snapshot, durable_changed) = {
            let mut entry = self
                .stations
                .get_mut(id)
                .ok_or_else(|| DomainError::StationNotFound(id.to_string()))?;
            let before = self.persist.as_ref().map(|_| entry.record());
            let result = f(entry.value_mut())?;
            let durable_changed = before.is_some_and(|b| b != entry.record());
            (result, entry.value().clone(), durable_changed)
        };
        self.after_change(&snapshot, durable_changed);
        Ok(result)
    }

    pub fn patch(&self, id: &str, patch: StationPatch) -> DomainResult<Station> {
        if let Some(power) = patch.power_kw {
            if power.is_nan() || power <= 0.0 {
                return Err(DomainError::Validation("power_kw must be positive".into()));
            }
        }
        if let Some(price) = patch.price_per_kwh {
            if price < 0.0 {
                return Err(DomainError::Validation("price_per_kwh must not be negative".into()));
            }
        }
        self.update(id, |station| {
            station.apply_patch(patch);
            station.clone()
        })
    }

    /// Hard delete, refused while the station is connected.
    pub fn delete(&self, id: &str) -> DomainResult<()> {
        let removed = self.stations.remove_if(id, |_, station| !station.connected);
        if removed.is_none() {
            return match self.stations.contains_key(id) {
                true => Err(DomainError::StationConnected(id.to_string())),
                false => Err(DomainError::StationNotFound(id.to_string())),
            };
        }

        info!(station_id = id, "Station deleted");
        if let Some(tx) = &self.persist {
            let _ = tx.send(PersistOp::Delete(id.to_string()));
        }
        self.event_bus.publish(Event::StationRemoved(StationRemovedEvent {
            station_id: id.to_string(),
            timestamp: Utc::now(),
        }));
        Ok(())
    }

    /// CSMS-assigned transaction id for real StartTransaction.
    pub fn next_transaction_id(&self) -> i32 {
        self.transaction_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn after_change(&self, station: &Station, durable_changed: bool) {
        if durable_changed {
            if let Some(tx) = &self.persist {
                let _ = tx.send(PersistOp::Save(station.record()));
            }
        }
        self.event_bus.publish(Event::StationChanged(StationChangedEvent {
            station: Box::new(station.clone()),
            timestamp: Utc::now(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::domain::{ConnectionSource, StationStatus};
    use crate::infrastructure::InMemoryStationStore;

    fn registry() -> StationRegistry {
        StationRegistry::new(create_event_bus(), 0.35)
    }

    #[test]
    fn create_rejects_duplicates() {
        let reg = registry();
        let station = reg
            .create(NewStation {
                id: "CP1".into(),
                ..Default::default()
            })
            .unwrap();
        assert!(!station.connected);
        assert_eq!(station.status, StationStatus::Offline);
        assert_eq!(station.price_per_kwh, 0.35);

        let err = reg
            .create(NewStation {
                id: "CP1".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, DomainError::StationAlreadyExists("CP1".into()));
    }

    #[test]
    fn ensure_creates_once() {
        let reg = registry();
        assert!(reg.ensure("CP1"));
        assert!(!reg.ensure("CP1"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn update_publishes_snapshot() {
        let reg = registry();
        reg.ensure("CP1");
        let mut sub = reg.event_bus().subscribe();

        reg.update("CP1", |s| s.mark_connected(ConnectionSource::Ocpp, Utc::now()))
            .unwrap();

        let msg = sub.try_recv().unwrap();
        match msg.event {
            Event::StationChanged(e) => {
                assert!(e.station.connected);
                assert_eq!(e.station.status, StationStatus::Available);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn refused_update_publishes_nothing() {
        let reg = registry();
        reg.ensure("CP1");
        let mut sub = reg.event_bus().subscribe();

        let err = reg
            .try_update("CP1", |_| -> DomainResult<()> {
                Err(DomainError::NoActiveTransaction("CP1".into()))
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "No active transaction");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn update_unknown_station_is_not_found() {
        let reg = registry();
        let err = reg.update("nope", |_| ()).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn delete_refuses_connected_station() {
        let reg = registry();
        reg.ensure("CP1");
        reg.update("CP1", |s| s.mark_connected(ConnectionSource::Simulation, Utc::now()))
            .unwrap();

        assert_eq!(
            reg.delete("CP1").unwrap_err(),
            DomainError::StationConnected("CP1".into())
        );

        reg.update("CP1", |s| s.mark_offline()).unwrap();
        reg.delete("CP1").unwrap();
        assert!(!reg.contains("CP1"));
        assert_eq!(
            reg.delete("CP1").unwrap_err(),
            DomainError::StationNotFound("CP1".into())
        );
    }

    #[test]
    fn patch_validates_input() {
        let reg = registry();
        reg.ensure("CP1");
        let err = reg
            .patch(
                "CP1",
                StationPatch {
                    power_kw: Some(0.0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let station = reg
            .patch(
                "CP1",
                StationPatch {
                    price_per_kwh: Some(0.5),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(station.price_per_kwh, 0.5);
    }

    #[test]
    fn hydrate_restores_durable_fields_and_counter() {
        let reg = registry();
        let mut station = Station::new("CP1", 0.4);
        let now = Utc::now();
        station.push_session(
            crate::domain::Transaction::new(41, "TAG", 0.0, now).finalize(0.0, now, 0.4),
        );

        assert_eq!(reg.hydrate(vec![station.record()]), 1);
        let restored = reg.get("CP1").unwrap();
        assert_eq!(restored.session_history.len(), 1);
        assert!(!restored.connected);
        assert_eq!(reg.next_transaction_id(), 42);
    }

    #[tokio::test]
    async fn durable_changes_reach_the_store() {
        let store = Arc::new(InMemoryStationStore::new());
        let reg = StationRegistry::with_persistence(create_event_bus(), 0.35, store.clone());
        reg.ensure("CP1");
        reg.update("CP1", |s| s.vendor = Some("ACME".into())).unwrap();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.get("CP1").unwrap().vendor.as_deref(), Some("ACME"));
    }
}
