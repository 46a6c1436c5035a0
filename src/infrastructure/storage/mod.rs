//! Storage traits and implementations

mod memory;
mod traits;

pub use memory::InMemoryStationStore;
pub use traits::StationStore;
