use std::time::Duration;

use dispatch_core::config::{DispatchConfig, MotionConfig};
use dispatch_sim::scenario::{run_scenario, ScenarioParams};

fn quick_config() -> DispatchConfig {
    DispatchConfig::default()
        .with_poll_interval_ms(100)
        .with_motion(MotionConfig::default().with_speed_per_tick(2.0))
}

#[tokio::test(start_paused = true)]
async fn small_city_completes_trips() {
    let params = ScenarioParams::default()
        .with_drivers(3)
        .with_riders(2)
        .with_seed(7)
        .with_duration(Duration::from_secs(60))
        .with_cancel_probability(0.0);

    let summary = run_scenario(quick_config(), params).await.expect("scenario");
    assert_eq!(summary.total_drivers, 3);
    assert!(summary.rides_requested > 0);
    assert!(summary.rides_completed >= 1, "{summary:?}");
    assert_eq!(summary.rides_cancelled, 0);
    assert_eq!(summary.rides_failed, 0);
    assert_eq!(
        summary.rides_requested,
        summary.rides_completed + summary.rides_no_drivers + summary.rides_unfinished
    );
    assert!(summary.snapshots_observed > 0);
}

#[tokio::test(start_paused = true)]
async fn no_drivers_means_no_matches() {
    let params = ScenarioParams::default()
        .with_drivers(0)
        .with_riders(2)
        .with_duration(Duration::from_secs(5))
        .with_rider_retry_delay(Duration::from_secs(1));

    let summary = run_scenario(quick_config(), params).await.expect("scenario");
    assert!(summary.rides_requested >= 2);
    assert_eq!(summary.rides_no_drivers, summary.rides_requested);
    assert_eq!(summary.rides_matched, 0);
}
