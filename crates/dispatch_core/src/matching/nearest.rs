use crate::geometry::{distance, Point};
use crate::model::DriverRecord;

use super::algorithm::MatchingAlgorithm;
use super::types::MatchCandidate;

/// Nearest-first ranking by Euclidean distance from the driver's last known
/// location to the pickup point.
///
/// Ties are broken by the lowest driver id so that identical inputs always
/// produce the same order.
///
/// Time complexity: O(n log n) in the number of available drivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestDriver;

impl MatchingAlgorithm for NearestDriver {
    fn rank(&self, pickup: Point, available: &[DriverRecord]) -> Vec<MatchCandidate> {
        let mut candidates: Vec<MatchCandidate> = available
            .iter()
            .filter(|record| record.location.is_finite())
            .map(|record| MatchCandidate {
                driver_id: record.id.clone(),
                distance: distance(record.location, pickup),
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });
        candidates
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{DriverId, DriverStatus};

    fn driver(id: &str, x: f64, y: f64) -> DriverRecord {
        DriverRecord {
            id: DriverId::new(id),
            location: Point::new(x, y),
            status: DriverStatus::Available,
            last_update: Utc::now(),
            sequence: 1,
            motion_sequence: 0,
        }
    }

    #[test]
    fn ranks_by_distance() {
        let drivers = [
            driver("d-far", 50.0, 50.0),
            driver("d-near", 11.0, 10.0),
            driver("d-mid", 20.0, 10.0),
        ];
        let ranked = NearestDriver.rank(Point::new(12.0, 10.0), &drivers);
        let ids: Vec<_> = ranked.iter().map(|c| c.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["d-near", "d-mid", "d-far"]);
        assert_eq!(ranked[0].distance, 1.0);
    }

    #[test]
    fn ties_go_to_lowest_id() {
        let drivers = [
            driver("d-2", 14.0, 10.0),
            driver("d-3", 10.0, 10.0),
            driver("d-1", 12.0, 12.0),
        ];
        let ranked = NearestDriver.rank(Point::new(12.0, 10.0), &drivers);
        let ids: Vec<_> = ranked.iter().map(|c| c.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["d-1", "d-2", "d-3"]);
    }

    #[test]
    fn skips_non_finite_locations() {
        let drivers = [driver("d-nan", f64::NAN, 0.0), driver("d-ok", 1.0, 0.0)];
        let ranked = NearestDriver.rank(Point::new(0.0, 0.0), &drivers);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].driver_id.as_str(), "d-ok");
    }
}
