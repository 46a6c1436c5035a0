//! Application services

mod liveness_monitor;

pub use liveness_monitor::{ConnectionStats, LivenessMonitor, LivenessStatus};
