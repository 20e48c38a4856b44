use std::time::Duration;

use dispatch_core::dispatcher::MatchOutcome;
use dispatch_core::model::{Destination, DriverId, RideId, Trip, TripId};
use dispatch_core::service::DispatchService;
use dispatch_core::test_helpers::{rider, station_id, wait_until};

/// Generous bound for any single leg in the fixture city.
pub const LEG_TIMEOUT: Duration = Duration::from_secs(30);

/// Request a ride for rider `n` at `station` and expect a match.
pub fn request_matched(
    service: &DispatchService,
    n: usize,
    station: &str,
    destination: Destination,
) -> (RideId, DriverId) {
    match service
        .request_ride(&rider(n), &station_id(station), destination, None)
        .expect("request")
    {
        MatchOutcome::Matched {
            ride_id, driver_id, ..
        } => (ride_id, driver_id),
        MatchOutcome::NoDrivers { ride_id } => panic!("{ride_id} found no drivers"),
    }
}

/// Wait until the driver's pickup arrival has opened a trip.
pub async fn wait_for_trip(service: &DispatchService, driver_id: &DriverId) -> Trip {
    let opened = wait_until(LEG_TIMEOUT, || service.current_trip(driver_id).is_some()).await;
    assert!(opened, "{driver_id} never reached pickup");
    service.current_trip(driver_id).expect("trip")
}

/// Wait until an active trip's driver has reached dropoff.
pub async fn wait_for_dropoff(service: &DispatchService, trip_id: TripId) -> Trip {
    let arrived = wait_until(LEG_TIMEOUT, || {
        service
            .trip(trip_id)
            .is_some_and(|trip| trip.is_awaiting_completion())
    })
    .await;
    assert!(arrived, "{trip_id} never reached dropoff");
    service.trip(trip_id).expect("trip")
}
