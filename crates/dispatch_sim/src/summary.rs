//! Aggregated results of one simulation run.

use serde::Serialize;

use crate::agents::{DriverReport, RideOutcome, RideRecord};

#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub total_drivers: usize,
    pub total_riders: usize,
    pub rides_requested: usize,
    pub rides_matched: usize,
    pub rides_no_drivers: usize,
    pub rides_completed: usize,
    pub rides_cancelled: usize,
    pub rides_failed: usize,
    /// Matched rides still in flight when the run ended.
    pub rides_unfinished: usize,
    /// Trips confirmed by drivers; equals `rides_completed` unless the run
    /// ended between a driver's confirmation and the rider noticing it.
    pub driver_completed_trips: usize,
    pub snapshots_observed: u64,
    pub avg_distance_at_match: f64,
    pub avg_time_to_pickup_ms: f64,
    pub median_time_to_pickup_ms: f64,
    pub p90_time_to_pickup_ms: f64,
    pub avg_trip_duration_ms: f64,
}

impl SimulationSummary {
    pub fn from_records(
        total_riders: usize,
        records: &[RideRecord],
        drivers: &[DriverReport],
        snapshots_observed: u64,
    ) -> Self {
        let count = |outcome: RideOutcome| records.iter().filter(|r| r.outcome == outcome).count();
        let distances: Vec<f64> = records.iter().filter_map(|r| r.distance_at_match).collect();
        let pickups: Vec<u64> = records.iter().filter_map(|r| r.time_to_pickup_ms).collect();
        let trips: Vec<u64> = records.iter().filter_map(|r| r.trip_duration_ms).collect();
        let (avg_pickup, median_pickup, p90_pickup) = calculate_stats(&pickups);
        let (avg_trip, _, _) = calculate_stats(&trips);

        Self {
            total_drivers: drivers.len(),
            total_riders,
            rides_requested: records.len(),
            rides_matched: distances.len(),
            rides_no_drivers: count(RideOutcome::NoDrivers),
            rides_completed: count(RideOutcome::Completed),
            rides_cancelled: count(RideOutcome::Cancelled),
            rides_failed: count(RideOutcome::Failed),
            rides_unfinished: count(RideOutcome::Unfinished),
            driver_completed_trips: drivers.iter().map(|d| d.completed_trips).sum(),
            snapshots_observed,
            avg_distance_at_match: mean(&distances),
            avg_time_to_pickup_ms: avg_pickup,
            median_time_to_pickup_ms: median_pickup,
            p90_time_to_pickup_ms: p90_pickup,
            avg_trip_duration_ms: avg_trip,
        }
    }
}

/// Average, median and p90 of a sample.
fn calculate_stats(values: &[u64]) -> (f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    };
    let p90_index = ((sorted.len() as f64) * 0.9).ceil() as usize;
    let p90 = sorted[p90_index.saturating_sub(1).min(sorted.len() - 1)] as f64;
    (avg, median, p90)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
