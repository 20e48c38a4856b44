//! Planar geometry shared by matching and motion.
//!
//! Coordinates live on a flat 2D plane in abstract distance units. Distance is
//! plain Euclidean; movement is a straight-line step toward a target.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        distance(self, other)
    }

    /// True when both coordinates are finite numbers.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Euclidean distance `sqrt(dx² + dy²)`.
pub fn distance(a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

/// Unit vector pointing from `from` to `to`.
///
/// Returns `None` when the points coincide (no direction is defined).
pub fn unit_vector(from: Point, to: Point) -> Option<(f64, f64)> {
    let dist = distance(from, to);
    if dist == 0.0 {
        return None;
    }
    Some(((to.x - from.x) / dist, (to.y - from.y) / dist))
}

/// Move `step` units from `from` toward `to`, landing exactly on `to` when the
/// remaining distance is not larger than the step.
pub fn step_toward(from: Point, to: Point, step: f64) -> Point {
    let remaining = distance(from, to);
    if remaining <= step {
        return to;
    }
    match unit_vector(from, to) {
        Some((ux, uy)) => Point::new(from.x + ux * step, from.y + uy * step),
        None => to,
    }
}
