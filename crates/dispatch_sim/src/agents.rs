//! Simulated clients: drivers that poll for work and riders that request
//! rides between stations.

use std::sync::Arc;
use std::time::Duration;

use dispatch_core::directory::Station;
use dispatch_core::dispatcher::MatchOutcome;
use dispatch_core::model::{
    AssignedRide, AssignmentStatus, Destination, DriverId, RideId, RiderId, TripStatus,
};
use dispatch_core::service::DispatchService;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often a rider checks on a matched ride.
const RIDER_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize)]
pub struct DriverReport {
    pub driver_id: String,
    pub pickups_started: usize,
    pub completed_trips: usize,
}

/// Poll for an assigned ride and act on it: head to pickup, start the trip
/// once picked up, confirm completion at dropoff.
pub async fn run_driver(
    service: Arc<DispatchService>,
    driver_id: DriverId,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> DriverReport {
    let mut report = DriverReport {
        driver_id: driver_id.to_string(),
        pickups_started: 0,
        completed_trips: 0,
    };
    let mut last_pickup: Option<RideId> = None;
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match service.poll_assigned_ride(&driver_id) {
            None => {}
            Some(AssignedRide::Assignment(assignment)) => {
                if let Err(err) = service.begin_pickup(&driver_id) {
                    warn!(driver_id = %driver_id, error = %err, "could not begin pickup");
                    continue;
                }
                if last_pickup != Some(assignment.ride_id) {
                    last_pickup = Some(assignment.ride_id);
                    report.pickups_started += 1;
                }
            }
            Some(AssignedRide::Trip(trip)) if trip.status == TripStatus::Scheduled => {
                if let Err(err) = service.start_trip(trip.id) {
                    warn!(trip_id = %trip.id, error = %err, "could not start trip");
                }
            }
            Some(AssignedRide::Trip(trip)) if trip.is_awaiting_completion() => {
                match service.complete_trip(trip.id) {
                    Ok(_) => report.completed_trips += 1,
                    Err(err) => warn!(trip_id = %trip.id, error = %err, "could not complete trip"),
                }
            }
            Some(AssignedRide::Trip(_)) => {}
        }
    }
    debug!(driver_id = %driver_id, completed = report.completed_trips, "driver agent stopped");
    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RideOutcome {
    Completed,
    NoDrivers,
    Cancelled,
    Failed,
    Unfinished,
}

#[derive(Debug, Clone, Serialize)]
pub struct RideRecord {
    pub ride_id: String,
    pub rider_id: String,
    pub outcome: RideOutcome,
    pub distance_at_match: Option<f64>,
    pub time_to_pickup_ms: Option<u64>,
    pub trip_duration_ms: Option<u64>,
}

/// Behavior knobs for one rider.
#[derive(Debug, Clone)]
pub struct RiderPlan {
    pub rider_id: RiderId,
    pub stations: Vec<Station>,
    /// Chance of cancelling a matched ride before pickup.
    pub cancel_probability: f64,
    /// Pause between finished rides and after `no_drivers`.
    pub retry_delay: Duration,
    pub seed: u64,
}

/// Request rides back to back until shutdown.
pub async fn run_rider(
    service: Arc<DispatchService>,
    plan: RiderPlan,
    shutdown: CancellationToken,
) -> Vec<RideRecord> {
    let mut rng = StdRng::seed_from_u64(plan.seed);
    let mut records = Vec::new();
    if plan.stations.len() < 2 {
        warn!(rider_id = %plan.rider_id, "need at least two stations");
        return records;
    }

    while !shutdown.is_cancelled() {
        let pickup_index = rng.gen_range(0..plan.stations.len());
        let mut dropoff_index = rng.gen_range(0..plan.stations.len() - 1);
        if dropoff_index >= pickup_index {
            dropoff_index += 1;
        }
        let pickup = &plan.stations[pickup_index];
        let dropoff = &plan.stations[dropoff_index];

        let requested_at = Instant::now();
        let outcome = service.request_ride(
            &plan.rider_id,
            &pickup.id,
            Destination::Text(dropoff.name.clone()),
            None,
        );
        let record = match outcome {
            Ok(MatchOutcome::Matched {
                ride_id, distance, ..
            }) => {
                let cancel = rng.gen_bool(plan.cancel_probability.clamp(0.0, 1.0));
                follow_ride(&service, &plan.rider_id, ride_id, distance, cancel, requested_at, &shutdown).await
            }
            Ok(MatchOutcome::NoDrivers { ride_id }) => RideRecord {
                ride_id: ride_id.to_string(),
                rider_id: plan.rider_id.to_string(),
                outcome: RideOutcome::NoDrivers,
                distance_at_match: None,
                time_to_pickup_ms: None,
                trip_duration_ms: None,
            },
            Err(err) => {
                warn!(rider_id = %plan.rider_id, error = %err, "ride request failed");
                RideRecord {
                    ride_id: String::new(),
                    rider_id: plan.rider_id.to_string(),
                    outcome: RideOutcome::Failed,
                    distance_at_match: None,
                    time_to_pickup_ms: None,
                    trip_duration_ms: None,
                }
            }
        };
        records.push(record);

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(plan.retry_delay) => {}
        }
    }
    records
}

/// Watch a matched ride until it resolves or the run ends.
async fn follow_ride(
    service: &DispatchService,
    rider_id: &RiderId,
    ride_id: RideId,
    distance: f64,
    cancel: bool,
    requested_at: Instant,
    shutdown: &CancellationToken,
) -> RideRecord {
    let mut record = RideRecord {
        ride_id: ride_id.to_string(),
        rider_id: rider_id.to_string(),
        outcome: RideOutcome::Unfinished,
        distance_at_match: Some(distance),
        time_to_pickup_ms: None,
        trip_duration_ms: None,
    };
    let mut picked_up_at: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return record,
            _ = tokio::time::sleep(RIDER_CHECK_INTERVAL) => {}
        }

        if cancel && picked_up_at.is_none() {
            match service.cancel_ride(ride_id) {
                Ok(_) => {
                    info!(rider_id = %rider_id, ride_id = %ride_id, "rider cancelled before pickup");
                    record.outcome = RideOutcome::Cancelled;
                }
                Err(err) => {
                    debug!(ride_id = %ride_id, error = %err, "cancel after ride closed");
                    record.outcome = RideOutcome::Cancelled;
                }
            }
            return record;
        }

        if let Some(trip) = service.trip_for_ride(ride_id) {
            if picked_up_at.is_none() {
                let now = Instant::now();
                picked_up_at = Some(now);
                record.time_to_pickup_ms = Some(elapsed_ms(requested_at, now));
            }
            match trip.status {
                TripStatus::Completed => {
                    if let Some(started) = picked_up_at {
                        record.trip_duration_ms = Some(elapsed_ms(started, Instant::now()));
                    }
                    record.outcome = RideOutcome::Completed;
                    return record;
                }
                TripStatus::Cancelled => {
                    record.outcome = RideOutcome::Cancelled;
                    return record;
                }
                TripStatus::Scheduled | TripStatus::Active => {}
            }
        } else if service
            .assignment(ride_id)
            .is_some_and(|assignment| assignment.status == AssignmentStatus::Cancelled)
        {
            record.outcome = RideOutcome::Cancelled;
            return record;
        }
    }
}

fn elapsed_ms(from: Instant, to: Instant) -> u64 {
    u64::try_from(to.duration_since(from).as_millis()).unwrap_or(u64::MAX)
}
