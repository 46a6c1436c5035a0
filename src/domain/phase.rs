//! Connection phase: the "please plug in your vehicle" window

use std::fmt;

use serde::{Deserialize, Serialize};

/// `none → awaiting_car → {started | timeout}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    #[default]
    None,
    AwaitingCar,
    Started,
    Timeout,
}

impl ConnectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::AwaitingCar => "awaiting_car",
            Self::Started => "started",
            Self::Timeout => "timeout",
        }
    }

    /// Terminal phases re-enable the start control on the client side.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Started | Self::Timeout)
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
