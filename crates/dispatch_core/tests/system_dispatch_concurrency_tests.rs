mod support;

use std::collections::HashSet;
use std::sync::Arc;

use dispatch_core::broadcast::BroadcastChannel;
use dispatch_core::dispatcher::{Dispatcher, MatchOutcome};
use dispatch_core::geometry::Point;
use dispatch_core::ledger::RideLedger;
use dispatch_core::model::{Destination, DriverStatus, RideStatus};
use dispatch_core::registry::DriverRegistry;
use support::{driver, rider, station_id, test_profiles, test_stations, CENTRAL};

struct Harness {
    registry: Arc<DriverRegistry>,
    ledger: Arc<RideLedger>,
    dispatcher: Dispatcher,
}

fn harness(riders: usize, drivers: usize) -> Harness {
    let registry = Arc::new(DriverRegistry::new(Arc::new(BroadcastChannel::new())));
    for n in 1..=drivers {
        // d-1 is nearest to Central, then d-2, and so on.
        let location = Point::new(12.0 + n as f64, 10.0);
        registry.upsert_location(&driver(n), location, DriverStatus::Available, 1);
    }
    let ledger = Arc::new(RideLedger::new(Arc::clone(&registry)));
    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&ledger),
        Arc::new(test_stations()),
        Arc::new(test_profiles(riders, drivers)),
        5,
    );
    Harness {
        registry,
        ledger,
        dispatcher,
    }
}

fn request_all(harness: &Harness, riders: usize) -> Vec<MatchOutcome> {
    let dispatcher = &harness.dispatcher;
    std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=riders)
            .map(|n| {
                scope.spawn(move || {
                    dispatcher
                        .request_ride(
                            &rider(n),
                            &station_id(CENTRAL),
                            Destination::Point(Point::new(0.0, 0.0)),
                            None,
                        )
                        .expect("request")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("request thread"))
            .collect()
    })
}

#[test]
fn concurrent_requests_never_share_a_driver() {
    let harness = harness(32, 4);
    let outcomes = request_all(&harness, 32);

    let matched: Vec<_> = outcomes
        .iter()
        .filter_map(|outcome| outcome.driver_id().cloned())
        .collect();
    let unique: HashSet<_> = matched.iter().cloned().collect();
    assert_eq!(unique.len(), matched.len(), "a driver was assigned twice");
    assert!(matched.len() <= 4);

    for driver_id in &matched {
        assert_eq!(
            harness.registry.get(driver_id).expect("driver").status,
            DriverStatus::Busy
        );
        assert!(harness.ledger.active_assignment(driver_id).is_some());
    }
}

#[test]
fn every_request_resolves_exactly_once() {
    let harness = harness(24, 6);
    let outcomes = request_all(&harness, 24);
    assert_eq!(outcomes.len(), 24);

    let mut ride_ids = HashSet::new();
    for outcome in &outcomes {
        assert!(ride_ids.insert(outcome.ride_id()), "ride id reused");
        let ride = harness.ledger.ride(outcome.ride_id()).expect("ride");
        let expected = match outcome {
            MatchOutcome::Matched { .. } => RideStatus::Matched,
            MatchOutcome::NoDrivers { .. } => RideStatus::NoDrivers,
        };
        assert_eq!(ride.status, expected);
    }

    // No driver is left reserved without an assignment.
    let busy: Vec<_> = (1..=6)
        .map(driver)
        .filter(|id| harness.registry.get(id).expect("driver").status == DriverStatus::Busy)
        .collect();
    let matched = outcomes.iter().filter(|o| o.driver_id().is_some()).count();
    assert_eq!(busy.len(), matched);
}

#[test]
fn single_driver_goes_to_exactly_one_rider() {
    let harness = harness(16, 1);
    let outcomes = request_all(&harness, 16);
    let winners = outcomes
        .iter()
        .filter(|outcome| outcome.driver_id().is_some())
        .count();
    assert_eq!(winners, 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| matches!(outcome, MatchOutcome::NoDrivers { .. }))
            .count(),
        15
    );
}

#[test]
fn enough_drivers_serve_everyone() {
    let harness = harness(8, 8);
    // Sequential requests never contend, so each rider gets a distinct driver.
    for n in 1..=8 {
        let outcome = harness
            .dispatcher
            .request_ride(
                &rider(n),
                &station_id(CENTRAL),
                Destination::Point(Point::new(0.0, 0.0)),
                None,
            )
            .expect("request");
        assert_eq!(outcome.driver_id(), Some(&driver(n)), "nearest free driver first");
    }
    assert!(harness.registry.list_available().is_empty());
}
