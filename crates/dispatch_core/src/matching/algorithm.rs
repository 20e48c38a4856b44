use crate::geometry::Point;
use crate::model::DriverRecord;

use super::types::MatchCandidate;

/// Orders available drivers for a pickup point.
///
/// The dispatcher walks the returned list front to back, attempting a
/// compare-and-set reservation on each candidate until one succeeds, so the
/// ranking only decides preference. Exclusivity is enforced by the registry.
///
/// # Examples
///
/// ```rust
/// use dispatch_core::geometry::Point;
/// use dispatch_core::matching::{MatchingAlgorithm, NearestDriver};
///
/// let ranked = NearestDriver.rank(Point::new(0.0, 0.0), &[]);
/// assert!(ranked.is_empty());
/// ```
pub trait MatchingAlgorithm: Send + Sync {
    /// Rank `available` drivers for `pickup`, best first.
    fn rank(&self, pickup: Point, available: &[DriverRecord]) -> Vec<MatchCandidate>;
}
