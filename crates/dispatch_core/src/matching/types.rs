use crate::model::DriverId;

/// A driver considered for a pickup, with the distance it would travel.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub driver_id: DriverId,
    pub distance: f64,
}
