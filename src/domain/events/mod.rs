//! Domain events
//!
//! Notifications produced by the core for the broadcast collaborator.

pub mod types;

pub use types::*;
