//! OCPP protocol versions offered during the WebSocket handshake

use std::fmt;

use serde::{Deserialize, Serialize};

/// OCPP versions the central system recognizes.
///
/// Only 1.6 message semantics are implemented; 2.0.x subprotocols are accepted
/// at the handshake so that dual-stack chargers can still attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppVersion {
    V16,
    V201,
    V20,
}

impl OcppVersion {
    /// Server preference order.
    pub const ALL: &'static [OcppVersion] = &[Self::V16, Self::V201, Self::V20];

    /// `Sec-WebSocket-Protocol` token.
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::V16 => "ocpp1.6",
            Self::V201 => "ocpp2.0.1",
            Self::V20 => "ocpp2.0",
        }
    }

    pub fn from_subprotocol(s: &str) -> Option<Self> {
        match s.trim() {
            "ocpp1.6" => Some(Self::V16),
            "ocpp2.0.1" => Some(Self::V201),
            "ocpp2.0" => Some(Self::V20),
            _ => None,
        }
    }

    pub fn version_string(&self) -> &'static str {
        match self {
            Self::V16 => "1.6",
            Self::V201 => "2.0.1",
            Self::V20 => "2.0",
        }
    }
}

impl fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OCPP {}", self.version_string())
    }
}
