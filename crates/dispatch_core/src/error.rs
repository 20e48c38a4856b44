//! Error types for the dispatch core.
//!
//! Normal outcomes (no drivers, awaiting completion) are values elsewhere and
//! never show up here.

use thiserror::Error;

use crate::model::{DriverId, DriverStatus, RideId, RiderId, StationId, TripId, TripStatus};

/// Failure of an external collaborator (station or profile directory).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("driver {0} not found")]
    NotFound(DriverId),

    /// Compare-and-set precondition did not hold.
    #[error("driver {driver_id} is {actual}, expected {expected}")]
    Conflict {
        driver_id: DriverId,
        expected: DriverStatus,
        actual: DriverStatus,
    },
}

/// Client-facing errors of `request_ride`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("station {0} not found")]
    UnknownStation(StationId),

    #[error("rider {0} not found")]
    UnknownRider(RiderId),

    #[error("user {0} is not a rider")]
    NotARider(RiderId),

    #[error("destination {0:?} does not match any known place")]
    UnknownDestination(String),

    #[error("destination coordinate is not finite")]
    InvalidDestination,

    #[error("rider {rider_id} already has {ride_id} in progress")]
    RideInProgress { rider_id: RiderId, ride_id: RideId },

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Trip action names used in transition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripAction {
    Start,
    Complete,
    Cancel,
}

impl std::fmt::Display for TripAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TripAction::Start => "start",
            TripAction::Complete => "complete",
            TripAction::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TripError {
    #[error("trip {0} not found")]
    TripNotFound(TripId),

    #[error("ride {0} not found")]
    RideNotFound(RideId),

    #[error("driver {0} has no active assignment")]
    NoActiveAssignment(DriverId),

    #[error("cannot {action} trip {trip_id} while it is {from}")]
    InvalidTransition {
        trip_id: TripId,
        from: TripStatus,
        action: TripAction,
    },

    #[error("ride {0} is no longer active")]
    RideClosed(RideId),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the service façade.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("driver {0} not found")]
    UnknownDriver(DriverId),

    #[error("user {0} is not a driver")]
    NotADriver(DriverId),

    #[error("location is not finite")]
    InvalidLocation,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Trip(#[from] TripError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
