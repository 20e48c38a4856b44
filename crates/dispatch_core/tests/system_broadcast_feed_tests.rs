mod support;

use std::time::Duration;

use dispatch_core::geometry::Point;
use dispatch_core::model::{Destination, DriverStatus};
use support::flow::request_matched;
use support::{driver, fast_config, place_driver, start_service, CENTRAL};
use tokio::time::timeout;

#[tokio::test(start_paused = true)]
async fn new_subscriber_sees_current_fleet_first() {
    let service = start_service(fast_config(), 0, 3);
    place_driver(&service, 1, Point::new(1.0, 1.0));
    place_driver(&service, 2, Point::new(2.0, 2.0));
    service
        .report_location(&driver(3), Point::new(3.0, 3.0), DriverStatus::Offline, 1)
        .expect("offline report");

    let mut feed = service.subscribe();
    let first = timeout(Duration::from_millis(1), feed.next())
        .await
        .expect("immediate")
        .expect("snapshot");
    assert_eq!(first.len(), 2, "offline drivers are not broadcast");
    assert_eq!(
        first.get(&driver(2)).expect("d-2").location,
        Point::new(2.0, 2.0)
    );
    assert!(first.get(&driver(3)).is_none());

    let json: serde_json::Value = serde_json::from_str(&first.to_json().expect("json")).expect("parse");
    assert_eq!(json["d-1"]["status"], "available");

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn feed_follows_a_driver_to_pickup() {
    let service = start_service(fast_config(), 1, 1);
    place_driver(&service, 1, Point::new(10.0, 10.0));
    let mut feed = service.subscribe();
    let (_ride_id, driver_id) =
        request_matched(&service, 1, CENTRAL, Destination::Point(Point::new(0.0, 0.0)));
    service.begin_pickup(&driver_id).expect("pickup");

    let reached = timeout(Duration::from_secs(10), async {
        let mut versions = Vec::new();
        while let Some(snapshot) = feed.next().await {
            versions.push(snapshot.version);
            let view = snapshot.get(&driver_id).copied();
            if view.is_some_and(|v| v.location == Point::new(12.0, 10.0)) {
                return (view, versions);
            }
        }
        (None, versions)
    })
    .await
    .expect("feed delivered pickup position");

    let (view, versions) = reached;
    assert_eq!(view.map(|v| v.status), Some(DriverStatus::Busy));
    assert!(
        versions.windows(2).all(|pair| pair[0] < pair[1]),
        "versions only move forward: {versions:?}"
    );

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn idle_subscribers_do_not_hold_back_writers() {
    let service = start_service(fast_config(), 0, 1);
    let _idle = service.subscribe();
    let mut reader = service.subscribe();

    for sequence in 1..=500u64 {
        service
            .report_location(
                &driver(1),
                Point::new(sequence as f64, 0.0),
                DriverStatus::Available,
                sequence,
            )
            .expect("report");
    }

    let latest = reader.next().await.expect("snapshot");
    assert_eq!(
        latest.get(&driver(1)).expect("d-1").location,
        Point::new(500.0, 0.0),
        "reader sees the newest state, frames in between are coalesced"
    );
    assert_eq!(latest.version, service.snapshot().version);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn going_offline_drops_driver_from_feed() {
    let service = start_service(fast_config(), 0, 1);
    place_driver(&service, 1, Point::new(4.0, 4.0));
    let mut feed = service.subscribe();
    let initial = feed.next().await.expect("initial");
    assert!(initial.get(&driver(1)).is_some());

    service.go_offline(&driver(1)).expect("offline");
    let next = timeout(Duration::from_secs(1), feed.next())
        .await
        .expect("update")
        .expect("snapshot");
    assert!(next.is_empty());

    service.shutdown().await;
}
