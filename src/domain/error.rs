//! Domain errors
//!
//! Every core operation returns `DomainResult<T>`; collaborators (a REST layer,
//! a webhook endpoint) map the error 1:1 onto a status code via
//! [`DomainError::status_code`] instead of catching panics.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Station not found")]
    StationNotFound(String),

    #[error("Station already exists")]
    StationAlreadyExists(String),

    #[error("Station is connected")]
    StationConnected(String),

    #[error("Charger is offline")]
    ChargerOffline(String),

    #[error("Start already in progress")]
    StartInProgress(String),

    #[error("Already charging")]
    AlreadyCharging(String),

    #[error("No active transaction")]
    NoActiveTransaction(String),

    #[error("Station not connected to simulator")]
    NotSimulated(String),

    #[error("Station is connected to real hardware")]
    HardwareConnected(String),

    #[error("Validation: {0}")]
    Validation(String),
}

impl DomainError {
    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::StationNotFound(_) => 404,
            Self::StationAlreadyExists(_)
            | Self::StationConnected(_)
            | Self::StartInProgress(_)
            | Self::AlreadyCharging(_)
            | Self::HardwareConnected(_) => 409,
            Self::NoActiveTransaction(_) | Self::NotSimulated(_) | Self::Validation(_) => 400,
            Self::ChargerOffline(_) => 503,
        }
    }

    /// The station the error refers to, if any.
    pub fn station_id(&self) -> Option<&str> {
        match self {
            Self::StationNotFound(id)
            | Self::StationAlreadyExists(id)
            | Self::StationConnected(id)
            | Self::ChargerOffline(id)
            | Self::StartInProgress(id)
            | Self::AlreadyCharging(id)
            | Self::NoActiveTransaction(id)
            | Self::NotSimulated(id)
            | Self::HardwareConnected(id) => Some(id),
            Self::Validation(_) => None,
        }
    }
}

/// `{error, status}` pair handed to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}

impl From<&DomainError> for ErrorBody {
    fn from(err: &DomainError) -> Self {
        Self {
            error: err.to_string(),
            status: err.status_code(),
        }
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_carries_message_and_status() {
        let body = ErrorBody::from(&DomainError::ChargerOffline("CP1".into()));
        assert_eq!(body.error, "Charger is offline");
        assert_eq!(body.status, 503);

        let body = ErrorBody::from(&DomainError::StartInProgress("CP1".into()));
        assert_eq!(body.error, "Start already in progress");
        assert_eq!(body.status, 409);
    }

    #[test]
    fn validation_has_no_station() {
        assert_eq!(DomainError::Validation("x".into()).station_id(), None);
        assert_eq!(
            DomainError::AlreadyCharging("CP9".into()).station_id(),
            Some("CP9")
        );
    }
}
