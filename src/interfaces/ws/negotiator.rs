//! OCPP protocol version negotiation
//!
//! During the WebSocket handshake the charge point advertises which OCPP
//! sub-protocols it supports via the `Sec-WebSocket-Protocol` header.
//! The negotiator picks the first of our versions the charger offered; when
//! none is recognized it echoes the charger's first offer instead of
//! rejecting the connection.

use crate::domain::OcppVersion;

/// Outcome of a negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Value to put in the response header.
    pub subprotocol: String,
    /// Message semantics to use. 1.6 when the offer was not recognized.
    pub version: OcppVersion,
    pub recognized: bool,
}

pub struct ProtocolNegotiator {
    /// Versions the CS supports, in preference order.
    supported_versions: Vec<OcppVersion>,
}

impl ProtocolNegotiator {
    pub fn new(supported_versions: Vec<OcppVersion>) -> Self {
        Self { supported_versions }
    }

    /// Negotiate from the raw `Sec-WebSocket-Protocol` header value.
    /// `None` when the charger offered nothing.
    pub fn negotiate(&self, requested_protocols: &str) -> Option<Negotiated> {
        let requested: Vec<&str> = requested_protocols
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let first = requested.first()?;

        for version in &self.supported_versions {
            if requested.iter().any(|p| *p == version.subprotocol()) {
                return Some(Negotiated {
                    subprotocol: version.subprotocol().to_string(),
                    version: *version,
                    recognized: true,
                });
            }
        }

        Some(Negotiated {
            subprotocol: first.to_string(),
            version: OcppVersion::V16,
            recognized: false,
        })
    }

    pub fn supported_subprotocols(&self) -> Vec<&'static str> {
        self.supported_versions
            .iter()
            .map(|v| v.subprotocol())
            .collect()
    }
}

impl Default for ProtocolNegotiator {
    fn default() -> Self {
        Self::new(OcppVersion::ALL.to_vec())
    }
}
