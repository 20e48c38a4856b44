//! Scenario setup and execution.

use std::sync::Arc;
use std::time::Duration;

use dispatch_core::config::DispatchConfig;
use dispatch_core::directory::{InMemoryProfiles, Profile, Role, StaticStations, Station};
use dispatch_core::geometry::Point;
use dispatch_core::model::{DriverId, DriverStatus, RiderId};
use dispatch_core::service::DispatchService;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agents::{run_driver, run_rider, RiderPlan};
use crate::summary::SimulationSummary;

/// Parameters for one simulated run.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    pub num_drivers: usize,
    pub num_riders: usize,
    pub seed: u64,
    pub duration: Duration,
    /// Drivers start uniformly inside `[0, city_size]²`.
    pub city_size: f64,
    pub cancel_probability: f64,
    pub rider_retry_delay: Duration,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            num_drivers: 5,
            num_riders: 10,
            seed: 42,
            duration: Duration::from_secs(60),
            city_size: 50.0,
            cancel_probability: 0.1,
            rider_retry_delay: Duration::from_secs(1),
        }
    }
}

impl ScenarioParams {
    pub fn with_drivers(mut self, drivers: usize) -> Self {
        self.num_drivers = drivers;
        self
    }

    pub fn with_riders(mut self, riders: usize) -> Self {
        self.num_riders = riders;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_cancel_probability(mut self, probability: f64) -> Self {
        self.cancel_probability = probability;
        self
    }

    pub fn with_rider_retry_delay(mut self, delay: Duration) -> Self {
        self.rider_retry_delay = delay;
        self
    }
}

/// Pickup stations of the simulated city.
pub fn city_stations() -> Vec<Station> {
    vec![
        Station::new("s-central", "Central", Point::new(12.0, 10.0)),
        Station::new("s-harbor", "Harbor", Point::new(40.0, 10.0)),
        Station::new("s-airport", "Airport", Point::new(5.0, 45.0)),
        Station::new("s-university", "University", Point::new(30.0, 35.0)),
        Station::new("s-market", "Market", Point::new(22.0, 22.0)),
    ]
}

fn driver_id(n: usize) -> DriverId {
    DriverId::new(format!("d-{n}"))
}

fn rider_id(n: usize) -> RiderId {
    RiderId::new(format!("r-{n}"))
}

/// Run a scenario to its deadline and summarize what happened.
pub async fn run_scenario(
    config: DispatchConfig,
    params: ScenarioParams,
) -> anyhow::Result<SimulationSummary> {
    let stations = city_stations();
    let profiles = InMemoryProfiles::new();
    for n in 1..=params.num_drivers {
        profiles.insert(Profile::new(driver_id(n).0, Role::Driver));
    }
    for n in 1..=params.num_riders {
        profiles.insert(Profile::new(rider_id(n).0, Role::Rider));
    }

    let poll_interval = config.poll_interval();
    let service = Arc::new(DispatchService::start(
        config,
        Arc::new(StaticStations::new(stations.clone())),
        Arc::new(profiles),
    )?);

    let mut rng = StdRng::seed_from_u64(params.seed);
    for n in 1..=params.num_drivers {
        let location = Point::new(
            rng.gen_range(0.0..=params.city_size),
            rng.gen_range(0.0..=params.city_size),
        );
        service.report_location(&driver_id(n), location, DriverStatus::Available, 1)?;
    }
    info!(
        drivers = params.num_drivers,
        riders = params.num_riders,
        seed = params.seed,
        duration_s = params.duration.as_secs_f64(),
        "scenario started"
    );

    let shutdown = CancellationToken::new();
    let drivers: Vec<_> = (1..=params.num_drivers)
        .map(|n| {
            tokio::spawn(run_driver(
                Arc::clone(&service),
                driver_id(n),
                poll_interval,
                shutdown.clone(),
            ))
        })
        .collect();
    let riders: Vec<_> = (1..=params.num_riders)
        .map(|n| {
            let plan = RiderPlan {
                rider_id: rider_id(n),
                stations: stations.clone(),
                cancel_probability: params.cancel_probability,
                retry_delay: params.rider_retry_delay,
                seed: params.seed.wrapping_add(n as u64),
            };
            tokio::spawn(run_rider(Arc::clone(&service), plan, shutdown.clone()))
        })
        .collect();
    let observer = tokio::spawn(observe(Arc::clone(&service), shutdown.clone()));

    tokio::time::sleep(params.duration).await;
    shutdown.cancel();

    let mut driver_reports = Vec::with_capacity(drivers.len());
    for handle in drivers {
        driver_reports.push(handle.await?);
    }
    let mut records = Vec::new();
    for handle in riders {
        records.extend(handle.await?);
    }
    let snapshots_observed = observer.await?;
    service.shutdown().await;

    let summary =
        SimulationSummary::from_records(params.num_riders, &records, &driver_reports, snapshots_observed);
    info!(
        requested = summary.rides_requested,
        completed = summary.rides_completed,
        no_drivers = summary.rides_no_drivers,
        "scenario finished"
    );
    Ok(summary)
}

/// A rider-side map view: count the snapshots it gets to see.
async fn observe(service: Arc<DispatchService>, shutdown: CancellationToken) -> u64 {
    let mut feed = service.subscribe();
    let mut seen = 0;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            snapshot = feed.next() => match snapshot {
                Some(_) => seen += 1,
                None => break,
            },
        }
    }
    seen
}
