//! Core records: drivers, ride requests, assignments and trips.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::Point;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

string_id!(
    /// Stable driver identifier. Ordering is used to break distance ties.
    DriverId
);
string_id!(RiderId);
string_id!(StationId);
numeric_id!(RideId, "ride");
numeric_id!(TripId, "trip");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Offline,
    Available,
    Busy,
}

impl std::fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DriverStatus::Offline => "offline",
            DriverStatus::Available => "available",
            DriverStatus::Busy => "busy",
        };
        f.write_str(name)
    }
}

/// Registry entry for one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRecord {
    pub id: DriverId,
    pub location: Point,
    pub status: DriverStatus,
    pub last_update: DateTime<Utc>,
    /// Highest sequence applied from the driver's own report stream.
    pub sequence: u64,
    /// Count of simulated position writes. Kept apart from `sequence` so a
    /// client's reports are only ever ordered against its own stream.
    #[serde(default)]
    pub motion_sequence: u64,
}

/// Where the rider wants to go: a free-text place name or a coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Text(String),
    Point(Point),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Matched,
    NoDrivers,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: RideId,
    pub rider_id: RiderId,
    pub pickup_station_id: StationId,
    pub pickup: Point,
    pub destination: Destination,
    /// Resolved coordinate of `destination`.
    pub dropoff: Point,
    pub desired_arrival_time: Option<DateTime<Utc>>,
    pub status: RideStatus,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AssignmentStatus::Active)
    }
}

/// Binding of one matched ride request to one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub ride_id: RideId,
    pub driver_id: DriverId,
    pub rider_id: RiderId,
    pub pickup_station_id: StationId,
    pub pickup: Point,
    pub dropoff: Point,
    pub matched_at: DateTime<Utc>,
    pub distance_at_match: f64,
    pub status: AssignmentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TripStatus::Scheduled => "scheduled",
            TripStatus::Active => "active",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub ride_id: RideId,
    pub driver_id: DriverId,
    pub rider_id: RiderId,
    pub status: TripStatus,
    pub pickup_point: Point,
    pub dropoff_point: Point,
    /// Set when the driver reached the dropoff point; completion still needs
    /// the driver's confirmation.
    pub awaiting_completion: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Trip {
    pub fn is_awaiting_completion(&self) -> bool {
        self.status == TripStatus::Active && self.awaiting_completion
    }
}

/// What a polling driver currently holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignedRide {
    /// Matched, still heading to (or waiting at) the pickup point.
    Assignment(Assignment),
    Trip(Trip),
}

impl AssignedRide {
    pub fn ride_id(&self) -> RideId {
        match self {
            AssignedRide::Assignment(assignment) => assignment.ride_id,
            AssignedRide::Trip(trip) => trip.ride_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_ids_order_lexicographically() {
        let mut ids = vec![DriverId::new("d-b"), DriverId::new("d-a"), DriverId::new("d-c")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "d-a");
    }

    #[test]
    fn statuses_serialize_in_snake_case() {
        assert_eq!(
            serde_json::to_string(&RideStatus::NoDrivers).expect("json"),
            "\"no_drivers\""
        );
        assert_eq!(
            serde_json::to_string(&DriverStatus::Available).expect("json"),
            "\"available\""
        );
    }

    #[test]
    fn terminal_states() {
        assert!(TripStatus::Completed.is_terminal());
        assert!(TripStatus::Cancelled.is_terminal());
        assert!(!TripStatus::Active.is_terminal());
        assert!(!AssignmentStatus::Active.is_terminal());
    }
}
