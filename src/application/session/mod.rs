pub mod connection;
pub mod manager;
pub mod registry;

pub use connection::{Connection, EvictedSession};
pub use manager::{SessionManager, SharedSessionManager};
pub use registry::{SessionRegistry, SharedSessionRegistry};
