//! Test helpers for common setup shared by unit tests, integration tests and
//! benches.
//!
//! The fixture city has three stations on a small grid and a fixed roster of
//! riders (`r-1`..) and drivers (`d-1`..).

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DispatchConfig, MotionConfig};
use crate::directory::{InMemoryProfiles, Profile, Role, StaticStations, Station};
use crate::geometry::Point;
use crate::model::{DriverId, DriverStatus, RiderId, StationId};
use crate::service::DispatchService;

/// Station two units east of the default driver start location.
pub const CENTRAL: &str = "s-central";
pub const HARBOR: &str = "s-harbor";
pub const AIRPORT: &str = "s-airport";

pub fn test_stations() -> StaticStations {
    StaticStations::new(vec![
        Station::new(CENTRAL, "Central", Point::new(12.0, 10.0)),
        Station::new(HARBOR, "Harbor", Point::new(40.0, 10.0)),
        Station::new(AIRPORT, "Airport", Point::new(0.0, 30.0)),
    ])
}

pub fn station_id(raw: &str) -> StationId {
    StationId::new(raw)
}

pub fn rider(n: usize) -> RiderId {
    RiderId::new(format!("r-{n}"))
}

pub fn driver(n: usize) -> DriverId {
    DriverId::new(format!("d-{n}"))
}

/// Profiles for riders `r-1..=riders` and drivers `d-1..=drivers`.
pub fn test_profiles(riders: usize, drivers: usize) -> InMemoryProfiles {
    let profiles = InMemoryProfiles::new();
    for n in 1..=riders {
        profiles.insert(Profile::new(rider(n).0, Role::Rider));
    }
    for n in 1..=drivers {
        profiles.insert(Profile::new(driver(n).0, Role::Driver));
    }
    profiles
}

/// Default config with a faster vehicle so legs finish in a few ticks.
pub fn fast_config() -> DispatchConfig {
    DispatchConfig::default().with_motion(MotionConfig::default().with_speed_per_tick(1.0))
}

/// Start a service over the fixture stations with `riders` riders and
/// `drivers` drivers on the roster. Needs a tokio runtime.
pub fn start_service(config: DispatchConfig, riders: usize, drivers: usize) -> DispatchService {
    DispatchService::start(
        config,
        Arc::new(test_stations()),
        Arc::new(test_profiles(riders, drivers)),
    )
    .expect("test config is valid")
}

/// Report driver `n` as available at `location`.
pub fn place_driver(service: &DispatchService, n: usize, location: Point) {
    service
        .report_location(&driver(n), location, DriverStatus::Available, 1)
        .expect("driver report");
}

/// Poll `check` every tick-sized step until it holds or `timeout` elapses.
/// Returns whether it held.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while waited <= timeout {
        if check() {
            return true;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    check()
}
