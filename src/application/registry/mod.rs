//! Station registry: the authoritative per-station state

mod station_registry;

pub use station_registry::{SharedStationRegistry, StationRegistry};
