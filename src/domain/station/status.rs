//! Station status and connection-source vocabularies

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Internal station status.
///
/// Charger vocabularies are mapped onto this enum by [`StationStatus::from_ocpp`],
/// which is total: anything it does not recognize is carried through verbatim
/// as [`StationStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StationStatus {
    Available,
    Preparing,
    Charging,
    Suspended,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
    Offline,
    Other(String),
}

impl StationStatus {
    /// Map an OCPP connector status (1.6 or 2.0.x vocabulary) to the internal enum.
    pub fn from_ocpp(status: &str) -> Self {
        match status {
            "Available" => Self::Available,
            "Preparing" | "Occupied" => Self::Preparing,
            "Charging" => Self::Charging,
            "SuspendedEV" | "SuspendedEVSE" | "Suspended" => Self::Suspended,
            "Finishing" => Self::Finishing,
            "Reserved" => Self::Reserved,
            "Unavailable" => Self::Unavailable,
            "Faulted" => Self::Faulted,
            "Offline" => Self::Offline,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::Suspended => "Suspended",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
            Self::Offline => "Offline",
            Self::Other(s) => s,
        }
    }

    /// Statuses under which a live transaction may exist.
    pub fn allows_transaction(&self) -> bool {
        matches!(self, Self::Charging | Self::Suspended)
    }
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StationStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_ocpp(&s))
    }
}

/// Which channel currently drives a station's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionSource {
    Ocpp,
    Simulation,
    Citrineos,
    #[default]
    None,
}

impl ConnectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ocpp => "ocpp",
            Self::Simulation => "simulation",
            Self::Citrineos => "citrineos",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_ocpp_vocabulary() {
        assert_eq!(StationStatus::from_ocpp("Available"), StationStatus::Available);
        assert_eq!(StationStatus::from_ocpp("SuspendedEV"), StationStatus::Suspended);
        assert_eq!(StationStatus::from_ocpp("SuspendedEVSE"), StationStatus::Suspended);
        assert_eq!(StationStatus::from_ocpp("Occupied"), StationStatus::Preparing);
    }

    #[test]
    fn unknown_status_passes_through() {
        let status = StationStatus::from_ocpp("VendorMaintenance");
        assert_eq!(status, StationStatus::Other("VendorMaintenance".into()));
        assert_eq!(status.to_string(), "VendorMaintenance");
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!("VendorMaintenance")
        );
    }

    #[test]
    fn connection_source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ConnectionSource::Citrineos).unwrap(),
            serde_json::json!("citrineos")
        );
    }
}
