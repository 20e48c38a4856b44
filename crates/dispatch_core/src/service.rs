//! Dispatch service façade.
//!
//! Owns the registry, the ride ledger, the dispatcher, the motion simulator
//! and the coordinator's event loop, and exposes the operations transport
//! layers call: driver location reports and polling, rider ride requests,
//! trip actions and the snapshot feed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastChannel, Snapshot, Subscription};
use crate::config::DispatchConfig;
use crate::coordinator::TripCoordinator;
use crate::directory::{ProfileDirectory, Role, Station, StationDirectory};
use crate::dispatcher::{Dispatcher, MatchOutcome};
use crate::error::{ConfigError, ServiceError};
use crate::geometry::Point;
use crate::ledger::RideLedger;
use crate::model::{
    AssignedRide, Assignment, Destination, DriverId, DriverStatus, RideId, RideRequest, RiderId,
    StationId, Trip, TripId,
};
use crate::motion::MotionSimulator;
use crate::registry::{DriverRegistry, UpsertOutcome};

pub struct DispatchService {
    config: DispatchConfig,
    registry: Arc<DriverRegistry>,
    ledger: Arc<RideLedger>,
    dispatcher: Dispatcher,
    coordinator: Arc<TripCoordinator>,
    stations: Arc<dyn StationDirectory>,
    profiles: Arc<dyn ProfileDirectory>,
    shutdown: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchService {
    /// Validate `config` and start the service. Spawns the coordinator's
    /// event loop, so this must run inside a tokio runtime.
    pub fn start(
        config: DispatchConfig,
        stations: Arc<dyn StationDirectory>,
        profiles: Arc<dyn ProfileDirectory>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(DriverRegistry::new(Arc::new(BroadcastChannel::new())));
        let ledger = Arc::new(RideLedger::new(Arc::clone(&registry)));
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            Arc::clone(&stations),
            Arc::clone(&profiles),
            config.max_reservation_attempts,
        );
        let (motion, events) = MotionSimulator::channel(Arc::clone(&registry), config.motion);
        let coordinator = Arc::new(TripCoordinator::new(Arc::clone(&ledger), motion));

        let shutdown = CancellationToken::new();
        let event_loop = tokio::spawn(Arc::clone(&coordinator).run(events, shutdown.clone()));
        info!(
            tick_ms = config.motion.tick_interval_ms,
            speed = config.motion.speed_per_tick,
            epsilon = config.motion.arrival_epsilon,
            "dispatch service started"
        );

        Ok(Self {
            config,
            registry,
            ledger,
            dispatcher,
            coordinator,
            stations,
            profiles,
            shutdown,
            event_loop: Mutex::new(Some(event_loop)),
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    /// A driver's location report.
    ///
    /// Unknown drivers must have a driver profile. A fresh `offline` report
    /// takes the driver out of matching and cancels whatever it holds; a stale
    /// one is dropped like any other.
    pub fn report_location(
        &self,
        driver_id: &DriverId,
        location: Point,
        status: DriverStatus,
        sequence: u64,
    ) -> Result<UpsertOutcome, ServiceError> {
        if !location.is_finite() {
            return Err(ServiceError::InvalidLocation);
        }
        let known = self.registry.get(driver_id).is_some();
        if !known {
            self.ensure_driver_profile(driver_id)?;
        }
        let outcome = if known && status == DriverStatus::Offline {
            self.coordinator
                .report_offline(driver_id, location, sequence)?
        } else {
            self.registry
                .upsert_location(driver_id, location, status, sequence)
        };
        debug!(driver_id = %driver_id, %location, %status, sequence, ?outcome, "location report");
        Ok(outcome)
    }

    pub fn request_ride(
        &self,
        rider_id: &RiderId,
        pickup_station_id: &StationId,
        destination: Destination,
        desired_arrival_time: Option<DateTime<Utc>>,
    ) -> Result<MatchOutcome, ServiceError> {
        let outcome = self.dispatcher.request_ride(
            rider_id,
            pickup_station_id,
            destination,
            desired_arrival_time,
        )?;
        Ok(outcome)
    }

    /// Read-only; repeated polls return the same assignment or trip.
    pub fn poll_assigned_ride(&self, driver_id: &DriverId) -> Option<AssignedRide> {
        self.coordinator.poll_assigned_ride(driver_id)
    }

    pub fn begin_pickup(&self, driver_id: &DriverId) -> Result<Assignment, ServiceError> {
        Ok(self.coordinator.begin_pickup(driver_id)?)
    }

    pub fn start_trip(&self, trip_id: TripId) -> Result<Trip, ServiceError> {
        Ok(self.coordinator.start(trip_id)?)
    }

    pub fn complete_trip(&self, trip_id: TripId) -> Result<Trip, ServiceError> {
        Ok(self.coordinator.complete(trip_id)?)
    }

    pub fn cancel_trip(&self, trip_id: TripId) -> Result<Trip, ServiceError> {
        Ok(self.coordinator.cancel(trip_id)?)
    }

    pub fn cancel_ride(&self, ride_id: RideId) -> Result<Assignment, ServiceError> {
        Ok(self.coordinator.cancel_ride(ride_id)?)
    }

    /// Disconnect path: cancel the driver's ride and take it out of matching.
    pub fn go_offline(&self, driver_id: &DriverId) -> Result<Option<RideId>, ServiceError> {
        Ok(self.coordinator.go_offline(driver_id)?)
    }

    /// Snapshot feed. The first item is the current state.
    pub fn subscribe(&self) -> Subscription {
        self.registry.broadcast().subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot()
    }

    pub fn list_stations(&self) -> Result<Vec<Station>, ServiceError> {
        Ok(self.stations.list_stations()?)
    }

    /// Last known location, or the configured start location for a driver
    /// that has not reported yet.
    pub fn driver_location(&self, driver_id: &DriverId) -> Point {
        self.registry
            .get(driver_id)
            .map(|record| record.location)
            .unwrap_or(self.config.default_start_location)
    }

    pub fn ride(&self, ride_id: RideId) -> Option<RideRequest> {
        self.ledger.ride(ride_id)
    }

    pub fn assignment(&self, ride_id: RideId) -> Option<Assignment> {
        self.ledger.assignment(ride_id)
    }

    pub fn trip(&self, trip_id: TripId) -> Option<Trip> {
        self.coordinator.trip(trip_id)
    }

    pub fn trip_for_ride(&self, ride_id: RideId) -> Option<Trip> {
        self.ledger.trip_for_ride(ride_id)
    }

    pub fn current_trip(&self, driver_id: &DriverId) -> Option<Trip> {
        self.coordinator.current_trip(driver_id)
    }

    /// Stop all motion and the event loop. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.coordinator.motion().stop_all();
        self.shutdown.cancel();
        let handle = self.event_loop.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "coordinator event loop ended abnormally");
            }
            info!("dispatch service stopped");
        }
    }

    fn ensure_driver_profile(&self, driver_id: &DriverId) -> Result<(), ServiceError> {
        let profile = self
            .profiles
            .get_profile(driver_id.as_str())?
            .ok_or_else(|| ServiceError::UnknownDriver(driver_id.clone()))?;
        if profile.role != Role::Driver {
            return Err(ServiceError::NotADriver(driver_id.clone()));
        }
        Ok(())
    }
}

impl Drop for DispatchService {
    fn drop(&mut self) {
        self.coordinator.motion().stop_all();
        self.shutdown.cancel();
    }
}
