//! Matching dispatcher: turns a ride request into a reserved driver.
//!
//! Candidate selection reads a registry snapshot, which may already be stale
//! by the time a reservation is attempted. The reservation itself is a
//! compare-and-set (`available → busy`) on the registry; when it loses a race
//! against a concurrent request the dispatcher moves on to the next-nearest
//! candidate instead of failing. Attempts are bounded; running out degrades to
//! [`MatchOutcome::NoDrivers`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{DispatchError, RegistryError};
use crate::directory::{ProfileDirectory, Role, StationDirectory};
use crate::geometry::Point;
use crate::ledger::{MatchRecord, NewRide, RideLedger};
use crate::matching::{MatchingAlgorithm, NearestDriver};
use crate::model::{Destination, DriverId, RideId, RiderId, StationId};
use crate::registry::DriverRegistry;

/// Outcome of a well-formed ride request. Neither variant is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched {
        ride_id: RideId,
        driver_id: DriverId,
        distance: f64,
    },
    NoDrivers {
        ride_id: RideId,
    },
}

impl MatchOutcome {
    pub fn ride_id(&self) -> RideId {
        match self {
            MatchOutcome::Matched { ride_id, .. } | MatchOutcome::NoDrivers { ride_id } => *ride_id,
        }
    }

    pub fn driver_id(&self) -> Option<&DriverId> {
        match self {
            MatchOutcome::Matched { driver_id, .. } => Some(driver_id),
            MatchOutcome::NoDrivers { .. } => None,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<DriverRegistry>,
    ledger: Arc<RideLedger>,
    stations: Arc<dyn StationDirectory>,
    profiles: Arc<dyn ProfileDirectory>,
    algorithm: Box<dyn MatchingAlgorithm>,
    max_attempts: usize,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<DriverRegistry>,
        ledger: Arc<RideLedger>,
        stations: Arc<dyn StationDirectory>,
        profiles: Arc<dyn ProfileDirectory>,
        max_attempts: usize,
    ) -> Self {
        Self {
            registry,
            ledger,
            stations,
            profiles,
            algorithm: Box::new(NearestDriver),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_algorithm(mut self, algorithm: Box<dyn MatchingAlgorithm>) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Match a rider at a pickup station to the nearest available driver.
    ///
    /// Client errors and collaborator failures are reported before any ride
    /// request is recorded.
    pub fn request_ride(
        &self,
        rider_id: &RiderId,
        pickup_station_id: &StationId,
        destination: Destination,
        desired_arrival_time: Option<DateTime<Utc>>,
    ) -> Result<MatchOutcome, DispatchError> {
        let profile = self
            .profiles
            .get_profile(rider_id.as_str())?
            .ok_or_else(|| DispatchError::UnknownRider(rider_id.clone()))?;
        if profile.role != Role::Rider {
            return Err(DispatchError::NotARider(rider_id.clone()));
        }
        let station = self
            .stations
            .station(pickup_station_id)?
            .ok_or_else(|| DispatchError::UnknownStation(pickup_station_id.clone()))?;
        let dropoff = self.resolve_destination(&destination)?;

        let ride = self.ledger.open_request(NewRide {
            rider_id: rider_id.clone(),
            pickup_station_id: station.id.clone(),
            pickup: station.location,
            destination,
            dropoff,
            desired_arrival_time,
        })?;

        let available = self.registry.list_available();
        let candidates = self.algorithm.rank(station.location, &available);
        for (attempt, candidate) in candidates.iter().take(self.max_attempts).enumerate() {
            match self.registry.mark_busy(&candidate.driver_id) {
                Ok(()) => {}
                Err(RegistryError::Conflict { actual, .. }) => {
                    debug!(
                        ride_id = %ride.id,
                        driver_id = %candidate.driver_id,
                        attempt,
                        %actual,
                        "reservation lost, trying next candidate"
                    );
                    continue;
                }
                Err(RegistryError::NotFound(_)) => continue,
            }
            match self.ledger.record_match(ride.id, candidate) {
                MatchRecord::Recorded(assignment) => {
                    info!(
                        ride_id = %ride.id,
                        rider_id = %rider_id,
                        driver_id = %assignment.driver_id,
                        distance = format!("{:.2}", assignment.distance_at_match),
                        "ride matched"
                    );
                    return Ok(MatchOutcome::Matched {
                        ride_id: ride.id,
                        driver_id: assignment.driver_id,
                        distance: assignment.distance_at_match,
                    });
                }
                MatchRecord::ReservationLost => {
                    debug!(ride_id = %ride.id, driver_id = %candidate.driver_id, attempt, "driver released before assignment");
                }
            }
        }

        self.ledger.resolve_unmatched(ride.id);
        info!(
            ride_id = %ride.id,
            rider_id = %rider_id,
            candidates = candidates.len(),
            "no drivers available"
        );
        Ok(MatchOutcome::NoDrivers { ride_id: ride.id })
    }

    fn resolve_destination(&self, destination: &Destination) -> Result<Point, DispatchError> {
        match destination {
            Destination::Point(point) if point.is_finite() => Ok(*point),
            Destination::Point(_) => Err(DispatchError::InvalidDestination),
            Destination::Text(name) => self
                .stations
                .station_by_name(name)?
                .map(|station| station.location)
                .ok_or_else(|| DispatchError::UnknownDestination(name.clone())),
        }
    }
}
