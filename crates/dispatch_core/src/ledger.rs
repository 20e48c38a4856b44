//! Ride ledger: ride requests, assignments and trips.
//!
//! The ledger keeps the cross-record invariants between its own books and the
//! driver registry: a driver is `busy` exactly while it is referenced by an
//! active assignment. Every operation that records or releases an assignment
//! runs under the ledger lock and touches the registry while holding it. The
//! lock order is always ledger, then registry; the registry never calls back
//! into the ledger.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{DispatchError, RegistryError, TripAction, TripError};
use crate::geometry::Point;
use crate::matching::MatchCandidate;
use crate::model::{
    AssignedRide, Assignment, AssignmentStatus, Destination, DriverId, DriverStatus, RideId,
    RideRequest, RideStatus, RiderId, StationId, Trip, TripId, TripStatus,
};
use crate::motion::Leg;
use crate::registry::{DriverRegistry, UpsertOutcome};

/// Validated input for a new ride request.
#[derive(Debug, Clone)]
pub struct NewRide {
    pub rider_id: RiderId,
    pub pickup_station_id: StationId,
    pub pickup: Point,
    pub destination: Destination,
    pub dropoff: Point,
    pub desired_arrival_time: Option<DateTime<Utc>>,
}

/// Result of trying to bind a reserved driver to a pending ride.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchRecord {
    Recorded(Assignment),
    /// The reservation no longer holds (the driver went offline in between).
    ReservationLost,
}

#[derive(Debug, Default)]
struct LedgerState {
    next_ride: u64,
    next_trip: u64,
    rides: HashMap<RideId, RideRequest>,
    assignments: HashMap<RideId, Assignment>,
    trips: HashMap<TripId, Trip>,
    trip_by_ride: HashMap<RideId, TripId>,
    /// Ride holding each driver (active assignments only).
    active_by_driver: HashMap<DriverId, RideId>,
    /// Ride each rider is waiting on (pending or actively assigned).
    active_by_rider: HashMap<RiderId, RideId>,
}

impl LedgerState {
    fn close_assignment(&mut self, ride_id: RideId, status: AssignmentStatus) {
        if let Some(assignment) = self.assignments.get_mut(&ride_id) {
            assignment.status = status;
            let driver_id = assignment.driver_id.clone();
            let rider_id = assignment.rider_id.clone();
            if self.active_by_driver.get(&driver_id) == Some(&ride_id) {
                self.active_by_driver.remove(&driver_id);
            }
            if self.active_by_rider.get(&rider_id) == Some(&ride_id) {
                self.active_by_rider.remove(&rider_id);
            }
        }
    }

    /// Cancel the trip and assignment the driver holds, if any.
    fn cancel_held_by(&mut self, driver_id: &DriverId) -> Option<RideId> {
        let ride_id = self.active_by_driver.get(driver_id).copied()?;
        if let Some(trip_id) = self.trip_by_ride.get(&ride_id).copied() {
            if let Some(trip) = self.trips.get_mut(&trip_id) {
                if !trip.status.is_terminal() {
                    trip.status = TripStatus::Cancelled;
                    trip.finished_at = Some(Utc::now());
                }
            }
        }
        self.close_assignment(ride_id, AssignmentStatus::Cancelled);
        debug!(driver_id = %driver_id, ride_id = %ride_id, "assignment cancelled by going offline");
        Some(ride_id)
    }

    fn live_trip_for_ride(&self, ride_id: RideId) -> Option<&Trip> {
        self.trip_by_ride
            .get(&ride_id)
            .and_then(|trip_id| self.trips.get(trip_id))
            .filter(|trip| !trip.status.is_terminal())
    }
}

#[derive(Debug)]
pub struct RideLedger {
    state: Mutex<LedgerState>,
    registry: Arc<DriverRegistry>,
}

impl RideLedger {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            registry,
        }
    }

    /// Record a new pending request. A rider who already has a ride in flight
    /// gets the attempt recorded with status `error` and a `RideInProgress`
    /// rejection.
    pub fn open_request(&self, ride: NewRide) -> Result<RideRequest, DispatchError> {
        let mut state = self.state.lock();
        state.next_ride += 1;
        let id = RideId(state.next_ride);
        let existing = state.active_by_rider.get(&ride.rider_id).copied();
        let request = RideRequest {
            id,
            rider_id: ride.rider_id.clone(),
            pickup_station_id: ride.pickup_station_id,
            pickup: ride.pickup,
            destination: ride.destination,
            dropoff: ride.dropoff,
            desired_arrival_time: ride.desired_arrival_time,
            status: if existing.is_some() {
                RideStatus::Error
            } else {
                RideStatus::Pending
            },
            requested_at: Utc::now(),
        };
        state.rides.insert(id, request.clone());
        if let Some(ride_id) = existing {
            return Err(DispatchError::RideInProgress {
                rider_id: ride.rider_id,
                ride_id,
            });
        }
        state.active_by_rider.insert(ride.rider_id, id);
        Ok(request)
    }

    /// Bind a driver the caller has already reserved (`busy`) to a pending ride.
    pub fn record_match(&self, ride_id: RideId, candidate: &MatchCandidate) -> MatchRecord {
        let mut state = self.state.lock();
        let still_reserved = self
            .registry
            .get(&candidate.driver_id)
            .is_some_and(|record| record.status == DriverStatus::Busy);
        if !still_reserved || state.active_by_driver.contains_key(&candidate.driver_id) {
            return MatchRecord::ReservationLost;
        }
        let Some(ride) = state.rides.get_mut(&ride_id) else {
            release_reservation(&self.registry, &candidate.driver_id);
            return MatchRecord::ReservationLost;
        };
        if ride.status != RideStatus::Pending {
            release_reservation(&self.registry, &candidate.driver_id);
            return MatchRecord::ReservationLost;
        }
        ride.status = RideStatus::Matched;
        let assignment = Assignment {
            ride_id,
            driver_id: candidate.driver_id.clone(),
            rider_id: ride.rider_id.clone(),
            pickup_station_id: ride.pickup_station_id.clone(),
            pickup: ride.pickup,
            dropoff: ride.dropoff,
            matched_at: Utc::now(),
            distance_at_match: candidate.distance,
            status: AssignmentStatus::Active,
        };
        state
            .active_by_driver
            .insert(candidate.driver_id.clone(), ride_id);
        state.assignments.insert(ride_id, assignment.clone());
        MatchRecord::Recorded(assignment)
    }

    /// Close a pending ride that found no driver.
    pub fn resolve_unmatched(&self, ride_id: RideId) -> Option<RideRequest> {
        let mut state = self.state.lock();
        let ride = state.rides.get_mut(&ride_id)?;
        if ride.status != RideStatus::Pending {
            return None;
        }
        ride.status = RideStatus::NoDrivers;
        let ride = ride.clone();
        if state.active_by_rider.get(&ride.rider_id) == Some(&ride_id) {
            state.active_by_rider.remove(&ride.rider_id);
        }
        Some(ride)
    }

    pub fn ride(&self, ride_id: RideId) -> Option<RideRequest> {
        self.state.lock().rides.get(&ride_id).cloned()
    }

    pub fn assignment(&self, ride_id: RideId) -> Option<Assignment> {
        self.state.lock().assignments.get(&ride_id).cloned()
    }

    pub fn trip(&self, trip_id: TripId) -> Option<Trip> {
        self.state.lock().trips.get(&trip_id).cloned()
    }

    pub fn trip_for_ride(&self, ride_id: RideId) -> Option<Trip> {
        let state = self.state.lock();
        state
            .trip_by_ride
            .get(&ride_id)
            .and_then(|trip_id| state.trips.get(trip_id))
            .cloned()
    }

    pub fn active_assignment(&self, driver_id: &DriverId) -> Option<Assignment> {
        let state = self.state.lock();
        state
            .active_by_driver
            .get(driver_id)
            .and_then(|ride_id| state.assignments.get(ride_id))
            .cloned()
    }

    /// The driver's in-progress trip, or its assignment if no trip exists yet.
    /// Read-only: calling it repeatedly returns the same record.
    pub fn assigned_ride(&self, driver_id: &DriverId) -> Option<AssignedRide> {
        let state = self.state.lock();
        let ride_id = *state.active_by_driver.get(driver_id)?;
        if let Some(trip) = state.live_trip_for_ride(ride_id) {
            return Some(AssignedRide::Trip(trip.clone()));
        }
        state
            .assignments
            .get(&ride_id)
            .cloned()
            .map(AssignedRide::Assignment)
    }

    /// Open the trip for an active assignment once its driver reached pickup.
    /// Returns `None` if the assignment is closed, belongs to another driver,
    /// or already has a trip.
    pub fn open_trip(&self, ride_id: RideId, driver_id: &DriverId) -> Option<Trip> {
        let mut state = self.state.lock();
        if state.trip_by_ride.contains_key(&ride_id) {
            return None;
        }
        let assignment = state
            .assignments
            .get(&ride_id)
            .filter(|a| a.status == AssignmentStatus::Active && &a.driver_id == driver_id)?
            .clone();
        state.next_trip += 1;
        let trip = Trip {
            id: TripId(state.next_trip),
            ride_id,
            driver_id: assignment.driver_id,
            rider_id: assignment.rider_id,
            status: TripStatus::Scheduled,
            pickup_point: assignment.pickup,
            dropoff_point: assignment.dropoff,
            awaiting_completion: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        state.trip_by_ride.insert(ride_id, trip.id);
        state.trips.insert(trip.id, trip.clone());
        Some(trip)
    }

    /// Flag an active trip whose driver reached the dropoff point.
    pub fn mark_awaiting_completion(&self, ride_id: RideId) -> Option<Trip> {
        let mut state = self.state.lock();
        let trip_id = *state.trip_by_ride.get(&ride_id)?;
        let trip = state.trips.get_mut(&trip_id)?;
        if trip.status != TripStatus::Active {
            return None;
        }
        trip.awaiting_completion = true;
        Some(trip.clone())
    }

    /// Apply a driver action to a trip. Invalid source states are rejected
    /// before anything is mutated. Terminal actions release the driver.
    pub fn transition(&self, trip_id: TripId, action: TripAction) -> Result<Trip, TripError> {
        let mut state = self.state.lock();
        let trip = state
            .trips
            .get(&trip_id)
            .ok_or(TripError::TripNotFound(trip_id))?;
        let next = next_status(trip.status, action).ok_or(TripError::InvalidTransition {
            trip_id,
            from: trip.status,
            action,
        })?;
        let (ride_id, driver_id) = (trip.ride_id, trip.driver_id.clone());

        if next.is_terminal() {
            self.registry.mark_available(&driver_id)?;
            let closed = match next {
                TripStatus::Completed => AssignmentStatus::Completed,
                _ => AssignmentStatus::Cancelled,
            };
            state.close_assignment(ride_id, closed);
        }

        let trip = state
            .trips
            .get_mut(&trip_id)
            .ok_or(TripError::TripNotFound(trip_id))?;
        let now = Utc::now();
        trip.status = next;
        match next {
            TripStatus::Active => trip.started_at = Some(now),
            TripStatus::Completed | TripStatus::Cancelled => trip.finished_at = Some(now),
            TripStatus::Scheduled => {}
        }
        Ok(trip.clone())
    }

    /// Cancel a matched ride: its live trip if there is one, otherwise the
    /// assignment still heading to pickup.
    pub fn cancel_ride(&self, ride_id: RideId) -> Result<Assignment, TripError> {
        let trip_id = {
            let state = self.state.lock();
            let assignment = state
                .assignments
                .get(&ride_id)
                .ok_or(TripError::RideNotFound(ride_id))?;
            if assignment.status.is_terminal() {
                return Err(TripError::RideClosed(ride_id));
            }
            state.live_trip_for_ride(ride_id).map(|trip| trip.id)
        };

        if let Some(trip_id) = trip_id {
            self.transition(trip_id, TripAction::Cancel)?;
        } else {
            let mut state = self.state.lock();
            let assignment = state
                .assignments
                .get(&ride_id)
                .ok_or(TripError::RideNotFound(ride_id))?;
            if assignment.status.is_terminal() {
                return Err(TripError::RideClosed(ride_id));
            }
            let driver_id = assignment.driver_id.clone();
            self.registry.mark_available(&driver_id)?;
            state.close_assignment(ride_id, AssignmentStatus::Cancelled);
        }

        self.assignment(ride_id).ok_or(TripError::RideNotFound(ride_id))
    }

    /// Take a driver offline, cancelling whatever it holds. Returns the ride
    /// that was cancelled, if any.
    pub fn go_offline(&self, driver_id: &DriverId) -> Result<Option<RideId>, RegistryError> {
        let mut state = self.state.lock();
        let cancelled = state.cancel_held_by(driver_id);
        self.registry.mark_offline(driver_id)?;
        Ok(cancelled)
    }

    /// The report-stream form of [`Self::go_offline`]. A stale report changes
    /// nothing; a fresh one is written and cancels the driver's ride in the
    /// same critical section.
    pub fn apply_offline_report(
        &self,
        driver_id: &DriverId,
        location: Point,
        sequence: u64,
    ) -> Result<(UpsertOutcome, Option<RideId>), RegistryError> {
        let mut state = self.state.lock();
        let outcome = self
            .registry
            .apply_offline_report(driver_id, location, sequence)?;
        if outcome == UpsertOutcome::Stale {
            return Ok((outcome, None));
        }
        Ok((outcome, state.cancel_held_by(driver_id)))
    }

    /// Whether the motion leg for `ride_id` still belongs to a live ride:
    /// pickup needs the driver's active assignment without a trip, dropoff
    /// needs an `active` trip.
    pub fn leg_is_live(&self, ride_id: RideId, driver_id: &DriverId, leg: Leg) -> bool {
        let state = self.state.lock();
        if state.active_by_driver.get(driver_id) != Some(&ride_id) {
            return false;
        }
        let trip = state.live_trip_for_ride(ride_id);
        match leg {
            Leg::Pickup => trip.is_none(),
            Leg::Dropoff => trip.is_some_and(|trip| trip.status == TripStatus::Active),
        }
    }
}

fn next_status(from: TripStatus, action: TripAction) -> Option<TripStatus> {
    match (from, action) {
        (TripStatus::Scheduled, TripAction::Start) => Some(TripStatus::Active),
        (TripStatus::Active, TripAction::Complete) => Some(TripStatus::Completed),
        (TripStatus::Scheduled | TripStatus::Active, TripAction::Cancel) => {
            Some(TripStatus::Cancelled)
        }
        _ => None,
    }
}

fn release_reservation(registry: &DriverRegistry, driver_id: &DriverId) {
    if let Err(err) = registry.mark_available(driver_id) {
        warn!(driver_id = %driver_id, error = %err, "failed to release reservation");
    }
}
