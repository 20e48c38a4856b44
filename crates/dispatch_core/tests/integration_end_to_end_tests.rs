mod support;

use std::time::Duration;

use dispatch_core::config::DispatchConfig;
use dispatch_core::dispatcher::MatchOutcome;
use dispatch_core::error::{DispatchError, ServiceError};
use dispatch_core::geometry::Point;
use dispatch_core::model::{Destination, DriverStatus, RideStatus, StationId, TripStatus};
use support::flow::{wait_for_dropoff, wait_for_trip};
use support::{driver, place_driver, rider, start_service, station_id, CENTRAL, HARBOR};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn default_city_ride_from_ten_ten_to_central() {
    let service = start_service(DispatchConfig::default(), 1, 1);
    // A driver without a record reports from the default start location.
    let start = service.driver_location(&driver(1));
    assert_eq!(start, Point::new(10.0, 10.0));
    place_driver(&service, 1, start);

    let outcome = service
        .request_ride(
            &rider(1),
            &station_id(CENTRAL),
            Destination::Text("Harbor".into()),
            None,
        )
        .expect("request");
    let MatchOutcome::Matched {
        ride_id,
        driver_id,
        distance,
    } = outcome
    else {
        panic!("expected a match, got {outcome:?}");
    };
    assert_eq!(driver_id, driver(1));
    assert_eq!(distance, 2.0);

    let started = Instant::now();
    service.begin_pickup(&driver_id).expect("pickup");
    let trip = wait_for_trip(&service, &driver_id).await;
    // 2.0 units at 0.5 per 50 ms tick: arrival on the 4th tick.
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(service.driver_location(&driver_id), Point::new(12.0, 10.0));
    assert_eq!(trip.status, TripStatus::Scheduled);

    service.start_trip(trip.id).expect("start");
    wait_for_dropoff(&service, trip.id).await;
    let done = service.complete_trip(trip.id).expect("complete");
    assert_eq!(done.status, TripStatus::Completed);
    assert_eq!(service.driver_location(&driver_id), Point::new(40.0, 10.0));
    assert_eq!(service.ride(ride_id).expect("ride").status, RideStatus::Matched);
    assert_eq!(
        service.registry().get(&driver_id).expect("driver").status,
        DriverStatus::Available
    );

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn second_request_while_riding_is_rejected() {
    let service = start_service(DispatchConfig::default(), 1, 2);
    place_driver(&service, 1, Point::new(10.0, 10.0));
    place_driver(&service, 2, Point::new(50.0, 50.0));

    let first = service
        .request_ride(
            &rider(1),
            &station_id(CENTRAL),
            Destination::Point(Point::new(0.0, 0.0)),
            None,
        )
        .expect("first");
    let err = service
        .request_ride(
            &rider(1),
            &station_id(HARBOR),
            Destination::Point(Point::new(0.0, 0.0)),
            None,
        )
        .expect_err("second");
    match err {
        ServiceError::Dispatch(DispatchError::RideInProgress { ride_id, .. }) => {
            assert_eq!(ride_id, first.ride_id());
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(
        service.registry().get(&driver(2)).expect("d-2").status,
        DriverStatus::Available,
        "rejected request reserves nobody"
    );

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_station_and_empty_fleet() {
    let service = start_service(DispatchConfig::default(), 1, 0);
    let err = service
        .request_ride(
            &rider(1),
            &StationId::new("s-moon"),
            Destination::Point(Point::new(0.0, 0.0)),
            None,
        )
        .expect_err("unknown station");
    assert!(matches!(
        err,
        ServiceError::Dispatch(DispatchError::UnknownStation(_))
    ));

    let outcome = service
        .request_ride(
            &rider(1),
            &station_id(CENTRAL),
            Destination::Point(Point::new(0.0, 0.0)),
            None,
        )
        .expect("request");
    let MatchOutcome::NoDrivers { ride_id } = outcome else {
        panic!("expected no drivers");
    };
    assert_eq!(service.ride(ride_id).expect("ride").status, RideStatus::NoDrivers);

    // A rider may retry once the first request resolved without a driver.
    service
        .request_ride(
            &rider(1),
            &station_id(CENTRAL),
            Destination::Point(Point::new(0.0, 0.0)),
            None,
        )
        .expect("retry");

    let stations = service.list_stations().expect("stations");
    assert_eq!(stations.len(), 3);
    assert_eq!(service.config().poll_interval(), Duration::from_secs(3));

    service.shutdown().await;
}
