//! Trip lifecycle coordinator.
//!
//! Joins the two streams that move a ride forward: driver actions (`start`,
//! `complete`, `cancel`) and arrival events from the motion simulator. State
//! changes go through the [`RideLedger`]; the coordinator only decides which
//! motion leg to run next and stops legs that no longer belong to a live ride.
//!
//! Arrivals never complete a trip on their own: reaching dropoff only marks
//! the trip as awaiting the driver's `complete`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, TripAction, TripError};
use crate::geometry::Point;
use crate::ledger::RideLedger;
use crate::model::{AssignedRide, Assignment, DriverId, RideId, Trip, TripId};
use crate::motion::{Leg, MotionEvent, MotionHandle, MotionSimulator};
use crate::registry::UpsertOutcome;

#[derive(Debug)]
pub struct TripCoordinator {
    ledger: Arc<RideLedger>,
    motion: MotionSimulator,
}

impl TripCoordinator {
    pub fn new(ledger: Arc<RideLedger>, motion: MotionSimulator) -> Self {
        Self { ledger, motion }
    }

    pub fn motion(&self) -> &MotionSimulator {
        &self.motion
    }

    /// Start the pickup leg for the driver's active assignment.
    ///
    /// Calling it again while the leg runs, or after the trip exists, returns
    /// the same assignment without restarting anything.
    pub fn begin_pickup(&self, driver_id: &DriverId) -> Result<Assignment, TripError> {
        let assignment = self
            .ledger
            .active_assignment(driver_id)
            .ok_or_else(|| TripError::NoActiveAssignment(driver_id.clone()))?;
        if self.ledger.trip_for_ride(assignment.ride_id).is_some() {
            return Ok(assignment);
        }
        if self.motion.active_leg(driver_id) == Some((assignment.ride_id, Leg::Pickup)) {
            return Ok(assignment);
        }
        let speed = self.motion.config().speed_per_tick;
        let handle = self.motion.start_moving_toward(
            driver_id,
            assignment.pickup,
            speed,
            assignment.ride_id,
            Leg::Pickup,
        )?;
        if self.keep_if_live(handle).is_none() {
            return Err(TripError::NoActiveAssignment(driver_id.clone()));
        }
        info!(driver_id = %driver_id, ride_id = %assignment.ride_id, pickup = %assignment.pickup, "heading to pickup");
        Ok(assignment)
    }

    /// Apply one arrival. Returns the trip it changed, if any.
    pub fn handle_event(&self, event: MotionEvent) -> Option<Trip> {
        match event {
            MotionEvent::Arrived {
                driver_id,
                ride_id,
                leg: Leg::Pickup,
                ticks,
                ..
            } => {
                let trip = self.ledger.open_trip(ride_id, &driver_id);
                match &trip {
                    Some(trip) => {
                        info!(trip_id = %trip.id, ride_id = %ride_id, driver_id = %driver_id, ticks, "arrived at pickup, trip scheduled");
                    }
                    None => {
                        debug!(ride_id = %ride_id, driver_id = %driver_id, "pickup arrival ignored");
                    }
                }
                trip
            }
            MotionEvent::Arrived {
                driver_id,
                ride_id,
                leg: Leg::Dropoff,
                ticks,
                ..
            } => {
                let trip = self.ledger.mark_awaiting_completion(ride_id);
                match &trip {
                    Some(trip) => {
                        info!(trip_id = %trip.id, ride_id = %ride_id, driver_id = %driver_id, ticks, "arrived at dropoff, awaiting completion");
                    }
                    None => {
                        debug!(ride_id = %ride_id, driver_id = %driver_id, "dropoff arrival ignored");
                    }
                }
                trip
            }
        }
    }

    /// Pump arrival events until the channel closes or `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<MotionEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event);
                    }
                    None => break,
                },
            }
        }
        debug!("coordinator event loop stopped");
    }

    /// `scheduled → active`, then head for the dropoff point.
    pub fn start(&self, trip_id: TripId) -> Result<Trip, TripError> {
        let trip = self.ledger.transition(trip_id, TripAction::Start)?;
        let speed = self.motion.config().speed_per_tick;
        match self.motion.start_moving_toward(
            &trip.driver_id,
            trip.dropoff_point,
            speed,
            trip.ride_id,
            Leg::Dropoff,
        ) {
            Ok(handle) => {
                self.keep_if_live(handle);
            }
            Err(err) => warn!(trip_id = %trip.id, error = %err, "could not start dropoff leg"),
        }
        info!(trip_id = %trip.id, driver_id = %trip.driver_id, dropoff = %trip.dropoff_point, "trip started");
        Ok(trip)
    }

    /// `active → completed`; the driver becomes available again.
    pub fn complete(&self, trip_id: TripId) -> Result<Trip, TripError> {
        let trip = self.ledger.transition(trip_id, TripAction::Complete)?;
        self.motion.stop_ride(&trip.driver_id, trip.ride_id);
        info!(trip_id = %trip.id, driver_id = %trip.driver_id, "trip completed");
        Ok(trip)
    }

    /// `scheduled | active → cancelled`; stops motion and releases the driver.
    pub fn cancel(&self, trip_id: TripId) -> Result<Trip, TripError> {
        let trip = self.ledger.transition(trip_id, TripAction::Cancel)?;
        self.motion.stop_ride(&trip.driver_id, trip.ride_id);
        info!(trip_id = %trip.id, driver_id = %trip.driver_id, "trip cancelled");
        Ok(trip)
    }

    /// Cancel a matched ride whether or not its trip exists yet.
    pub fn cancel_ride(&self, ride_id: RideId) -> Result<Assignment, TripError> {
        let assignment = self.ledger.cancel_ride(ride_id)?;
        self.motion.stop_ride(&assignment.driver_id, ride_id);
        info!(ride_id = %ride_id, driver_id = %assignment.driver_id, "ride cancelled");
        Ok(assignment)
    }

    /// A driver's own `offline` report. Stale reports change nothing; a fresh
    /// one cancels the driver's ride and stops its motion.
    pub fn report_offline(
        &self,
        driver_id: &DriverId,
        location: Point,
        sequence: u64,
    ) -> Result<UpsertOutcome, RegistryError> {
        let (outcome, cancelled) = self
            .ledger
            .apply_offline_report(driver_id, location, sequence)?;
        if outcome != UpsertOutcome::Stale {
            self.motion.stop_driver(driver_id);
            info!(driver_id = %driver_id, cancelled_ride = ?cancelled.map(|id| id.to_string()), "driver reported offline");
        }
        Ok(outcome)
    }

    /// Stop a freshly spawned leg whose ride was closed while it started.
    ///
    /// The leg is registered before this check, so a close that lands after it
    /// finds the leg in its own stop.
    fn keep_if_live(&self, handle: MotionHandle) -> Option<MotionHandle> {
        if self
            .ledger
            .leg_is_live(handle.ride_id(), handle.driver_id(), handle.leg())
        {
            return Some(handle);
        }
        self.motion.stop(&handle);
        debug!(driver_id = %handle.driver_id(), ride_id = %handle.ride_id(), leg = %handle.leg(), "ride closed while leg started");
        None
    }

    /// Cancel the driver's ride, mark it offline and stop its motion.
    pub fn go_offline(&self, driver_id: &DriverId) -> Result<Option<RideId>, RegistryError> {
        let cancelled = self.ledger.go_offline(driver_id)?;
        self.motion.stop_driver(driver_id);
        info!(driver_id = %driver_id, cancelled_ride = ?cancelled.map(|id| id.to_string()), "driver offline");
        Ok(cancelled)
    }

    pub fn poll_assigned_ride(&self, driver_id: &DriverId) -> Option<AssignedRide> {
        self.ledger.assigned_ride(driver_id)
    }

    pub fn trip(&self, trip_id: TripId) -> Option<Trip> {
        self.ledger.trip(trip_id)
    }

    /// The driver's live trip, if it has reached pickup.
    pub fn current_trip(&self, driver_id: &DriverId) -> Option<Trip> {
        match self.ledger.assigned_ride(driver_id)? {
            AssignedRide::Trip(trip) => Some(trip),
            AssignedRide::Assignment(_) => None,
        }
    }
}
