//! Driver registry: the single source of truth for driver location and status.
//!
//! All mutations go through one lock, so every write and every compare-and-set
//! status transition is linearizable per driver. Each applied change publishes
//! a fresh snapshot to the [`BroadcastChannel`]; publishing never blocks.
//!
//! Location writes carry a per-driver sequence number. A write whose sequence
//! is not greater than the last applied one is dropped as stale.
//!
//! The `busy` status is owned by the reservation protocol: only
//! [`DriverRegistry::mark_busy`] enters it and only
//! [`DriverRegistry::mark_available`] / [`DriverRegistry::mark_offline`] leave
//! it. Location reports cannot flip it either way.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::broadcast::{BroadcastChannel, Snapshot};
use crate::error::RegistryError;
use crate::geometry::Point;
use crate::model::{DriverId, DriverRecord, DriverStatus};

/// Result of a location write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First report for this driver.
    Created,
    Applied,
    /// Sequence was not newer than the last applied write; nothing changed.
    Stale,
}

#[derive(Debug, Default)]
struct RegistryState {
    drivers: HashMap<DriverId, DriverRecord>,
    version: u64,
}

#[derive(Debug)]
pub struct DriverRegistry {
    state: RwLock<RegistryState>,
    broadcast: Arc<BroadcastChannel>,
}

impl DriverRegistry {
    pub fn new(broadcast: Arc<BroadcastChannel>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            broadcast,
        }
    }

    pub fn broadcast(&self) -> &Arc<BroadcastChannel> {
        &self.broadcast
    }

    /// Write a driver's location and status from its own report stream.
    pub fn upsert_location(
        &self,
        driver_id: &DriverId,
        location: Point,
        status: DriverStatus,
        sequence: u64,
    ) -> UpsertOutcome {
        let mut state = self.state.write();
        let outcome = match state.drivers.get_mut(driver_id) {
            Some(record) => {
                if sequence <= record.sequence {
                    trace!(driver_id = %driver_id, sequence, last = record.sequence, "stale location dropped");
                    return UpsertOutcome::Stale;
                }
                record.status = guarded_status(record.status, status);
                record.location = location;
                record.sequence = sequence;
                record.last_update = Utc::now();
                UpsertOutcome::Applied
            }
            None => {
                let status = match status {
                    DriverStatus::Busy => DriverStatus::Offline,
                    other => other,
                };
                state.drivers.insert(
                    driver_id.clone(),
                    DriverRecord {
                        id: driver_id.clone(),
                        location,
                        status,
                        last_update: Utc::now(),
                        sequence,
                        motion_sequence: 0,
                    },
                );
                debug!(driver_id = %driver_id, %status, "driver registered");
                UpsertOutcome::Created
            }
        };
        self.publish_locked(&mut state);
        outcome
    }

    /// Location-only write used by the motion simulator; status and the client
    /// `sequence` are untouched. Returns the driver's new motion sequence.
    pub fn record_position(
        &self,
        driver_id: &DriverId,
        location: Point,
    ) -> Result<u64, RegistryError> {
        let mut state = self.state.write();
        let record = state
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| RegistryError::NotFound(driver_id.clone()))?;
        record.location = location;
        record.motion_sequence += 1;
        record.last_update = Utc::now();
        let sequence = record.motion_sequence;
        self.publish_locked(&mut state);
        Ok(sequence)
    }

    /// Apply a driver's own `offline` report, leaving `busy` included. The
    /// write is dropped as stale exactly like [`Self::upsert_location`].
    pub fn apply_offline_report(
        &self,
        driver_id: &DriverId,
        location: Point,
        sequence: u64,
    ) -> Result<UpsertOutcome, RegistryError> {
        let mut state = self.state.write();
        let record = state
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| RegistryError::NotFound(driver_id.clone()))?;
        if sequence <= record.sequence {
            trace!(driver_id = %driver_id, sequence, last = record.sequence, "stale offline report dropped");
            return Ok(UpsertOutcome::Stale);
        }
        record.status = DriverStatus::Offline;
        record.location = location;
        record.sequence = sequence;
        record.last_update = Utc::now();
        self.publish_locked(&mut state);
        Ok(UpsertOutcome::Applied)
    }

    pub fn get(&self, driver_id: &DriverId) -> Option<DriverRecord> {
        self.state.read().drivers.get(driver_id).cloned()
    }

    /// All `available` drivers, ordered by id.
    pub fn list_available(&self) -> Vec<DriverRecord> {
        let state = self.state.read();
        let mut available: Vec<DriverRecord> = state
            .drivers
            .values()
            .filter(|record| record.status == DriverStatus::Available)
            .cloned()
            .collect();
        available.sort_by(|a, b| a.id.cmp(&b.id));
        available
    }

    /// Reserve a driver: `available → busy`, or fail with a conflict.
    pub fn mark_busy(&self, driver_id: &DriverId) -> Result<(), RegistryError> {
        self.compare_and_set(driver_id, DriverStatus::Available, DriverStatus::Busy)
    }

    /// Release a reservation: `busy → available`, or fail with a conflict.
    pub fn mark_available(&self, driver_id: &DriverId) -> Result<(), RegistryError> {
        self.compare_and_set(driver_id, DriverStatus::Busy, DriverStatus::Available)
    }

    /// Take a driver out of matching from any status. Returns the previous status.
    pub fn mark_offline(&self, driver_id: &DriverId) -> Result<DriverStatus, RegistryError> {
        let mut state = self.state.write();
        let record = state
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| RegistryError::NotFound(driver_id.clone()))?;
        let previous = record.status;
        if previous != DriverStatus::Offline {
            record.status = DriverStatus::Offline;
            record.last_update = Utc::now();
            self.publish_locked(&mut state);
        }
        Ok(previous)
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot::from_records(state.version, state.drivers.values())
    }

    pub fn len(&self) -> usize {
        self.state.read().drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn compare_and_set(
        &self,
        driver_id: &DriverId,
        expected: DriverStatus,
        next: DriverStatus,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        let record = state
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| RegistryError::NotFound(driver_id.clone()))?;
        if record.status != expected {
            return Err(RegistryError::Conflict {
                driver_id: driver_id.clone(),
                expected,
                actual: record.status,
            });
        }
        record.status = next;
        record.last_update = Utc::now();
        self.publish_locked(&mut state);
        Ok(())
    }

    fn publish_locked(&self, state: &mut RegistryState) {
        state.version += 1;
        self.broadcast
            .publish(Snapshot::from_records(state.version, state.drivers.values()));
    }
}

/// Status a location report may set given the current one.
fn guarded_status(current: DriverStatus, reported: DriverStatus) -> DriverStatus {
    match (current, reported) {
        (DriverStatus::Busy, _) => DriverStatus::Busy,
        (current, DriverStatus::Busy) => current,
        (_, reported) => reported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DriverRegistry {
        DriverRegistry::new(Arc::new(BroadcastChannel::new()))
    }

    fn id(raw: &str) -> DriverId {
        DriverId::new(raw)
    }

    #[test]
    fn first_report_creates_driver() {
        let registry = registry();
        let outcome =
            registry.upsert_location(&id("d-1"), Point::new(1.0, 2.0), DriverStatus::Available, 1);
        assert_eq!(outcome, UpsertOutcome::Created);
        let record = registry.get(&id("d-1")).expect("record");
        assert_eq!(record.location, Point::new(1.0, 2.0));
        assert_eq!(record.status, DriverStatus::Available);
        assert!(registry.get(&id("d-2")).is_none());
    }

    #[test]
    fn stale_writes_are_dropped() {
        let registry = registry();
        registry.upsert_location(&id("d-1"), Point::new(1.0, 0.0), DriverStatus::Available, 5);
        let outcome =
            registry.upsert_location(&id("d-1"), Point::new(9.0, 0.0), DriverStatus::Available, 4);
        assert_eq!(outcome, UpsertOutcome::Stale);
        let outcome =
            registry.upsert_location(&id("d-1"), Point::new(9.0, 0.0), DriverStatus::Available, 5);
        assert_eq!(outcome, UpsertOutcome::Stale);
        assert_eq!(registry.get(&id("d-1")).expect("record").location, Point::new(1.0, 0.0));

        let outcome =
            registry.upsert_location(&id("d-1"), Point::new(2.0, 0.0), DriverStatus::Available, 6);
        assert_eq!(outcome, UpsertOutcome::Applied);
        assert_eq!(registry.get(&id("d-1")).expect("record").location, Point::new(2.0, 0.0));
    }

    #[test]
    fn reservation_is_exclusive_until_released() {
        let registry = registry();
        registry.upsert_location(&id("d-1"), Point::default(), DriverStatus::Available, 1);

        registry.mark_busy(&id("d-1")).expect("first reservation");
        let err = registry.mark_busy(&id("d-1")).expect_err("second reservation");
        assert_eq!(
            err,
            RegistryError::Conflict {
                driver_id: id("d-1"),
                expected: DriverStatus::Available,
                actual: DriverStatus::Busy,
            }
        );

        registry.mark_available(&id("d-1")).expect("release");
        registry.mark_busy(&id("d-1")).expect("reserve again");
    }

    #[test]
    fn mark_available_requires_busy() {
        let registry = registry();
        registry.upsert_location(&id("d-1"), Point::default(), DriverStatus::Available, 1);
        assert!(matches!(
            registry.mark_available(&id("d-1")),
            Err(RegistryError::Conflict { .. })
        ));
        assert_eq!(
            registry.mark_busy(&id("ghost")),
            Err(RegistryError::NotFound(id("ghost")))
        );
    }

    #[test]
    fn reports_cannot_flip_busy() {
        let registry = registry();
        registry.upsert_location(&id("d-1"), Point::default(), DriverStatus::Available, 1);
        registry.mark_busy(&id("d-1")).expect("reserve");

        registry.upsert_location(&id("d-1"), Point::new(1.0, 0.0), DriverStatus::Available, 2);
        assert_eq!(registry.get(&id("d-1")).expect("record").status, DriverStatus::Busy);

        registry.upsert_location(&id("d-2"), Point::default(), DriverStatus::Available, 1);
        registry.upsert_location(&id("d-2"), Point::default(), DriverStatus::Busy, 2);
        assert_eq!(registry.get(&id("d-2")).expect("record").status, DriverStatus::Available);

        registry.upsert_location(&id("d-3"), Point::default(), DriverStatus::Busy, 1);
        assert_eq!(registry.get(&id("d-3")).expect("record").status, DriverStatus::Offline);
    }

    #[test]
    fn list_available_filters_and_orders() {
        let registry = registry();
        registry.upsert_location(&id("d-c"), Point::default(), DriverStatus::Available, 1);
        registry.upsert_location(&id("d-a"), Point::default(), DriverStatus::Available, 1);
        registry.upsert_location(&id("d-b"), Point::default(), DriverStatus::Offline, 1);
        let ids: Vec<_> = registry
            .list_available()
            .into_iter()
            .map(|r| r.id.0)
            .collect();
        assert_eq!(ids, vec!["d-a", "d-c"]);
    }

    #[test]
    fn concurrent_reservations_have_one_winner() {
        let registry = registry();
        registry.upsert_location(&id("d-1"), Point::default(), DriverStatus::Available, 1);

        let registry = &registry;
        let winners = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(move || registry.mark_busy(&id("d-1")).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread"))
                .filter(|won| *won)
                .count()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn simulated_positions_keep_their_own_sequence() {
        let registry = registry();
        registry.upsert_location(&id("d-1"), Point::default(), DriverStatus::Available, 7);
        registry.mark_busy(&id("d-1")).expect("reserve");

        for step in 1..=3 {
            let sequence = registry
                .record_position(&id("d-1"), Point::new(0.5 * step as f64, 0.0))
                .expect("position");
            assert_eq!(sequence, step);
        }
        let record = registry.get(&id("d-1")).expect("record");
        assert_eq!(record.location, Point::new(1.5, 0.0));
        assert_eq!(record.status, DriverStatus::Busy);
        assert_eq!(record.sequence, 7);
        assert_eq!(record.motion_sequence, 3);

        let outcome =
            registry.upsert_location(&id("d-1"), Point::new(3.0, 0.0), DriverStatus::Busy, 7);
        assert_eq!(outcome, UpsertOutcome::Stale);
        let outcome =
            registry.upsert_location(&id("d-1"), Point::new(3.0, 0.0), DriverStatus::Busy, 8);
        assert_eq!(outcome, UpsertOutcome::Applied);
        assert_eq!(registry.get(&id("d-1")).expect("record").location, Point::new(3.0, 0.0));
        assert_eq!(
            registry.record_position(&id("ghost"), Point::default()),
            Err(RegistryError::NotFound(id("ghost")))
        );
    }

    #[test]
    fn offline_report_respects_the_stream_order() {
        let registry = registry();
        registry.upsert_location(&id("d-1"), Point::default(), DriverStatus::Available, 5);
        registry.mark_busy(&id("d-1")).expect("reserve");

        let outcome = registry
            .apply_offline_report(&id("d-1"), Point::new(4.0, 4.0), 3)
            .expect("known driver");
        assert_eq!(outcome, UpsertOutcome::Stale);
        let record = registry.get(&id("d-1")).expect("record");
        assert_eq!(record.status, DriverStatus::Busy);
        assert_eq!(record.location, Point::default());

        let outcome = registry
            .apply_offline_report(&id("d-1"), Point::new(4.0, 4.0), 6)
            .expect("known driver");
        assert_eq!(outcome, UpsertOutcome::Applied);
        let record = registry.get(&id("d-1")).expect("record");
        assert_eq!(record.status, DriverStatus::Offline);
        assert_eq!(record.location, Point::new(4.0, 4.0));
        assert_eq!(
            registry.apply_offline_report(&id("ghost"), Point::default(), 1),
            Err(RegistryError::NotFound(id("ghost")))
        );
    }

    #[test]
    fn every_change_publishes_a_snapshot() {
        let registry = registry();
        registry.upsert_location(&id("d-1"), Point::default(), DriverStatus::Available, 1);
        registry.mark_busy(&id("d-1")).expect("reserve");
        let current = registry.broadcast().current();
        assert_eq!(current.version, 2);
        assert_eq!(
            current.get(&id("d-1")).expect("view").status,
            DriverStatus::Busy
        );

        registry.mark_offline(&id("d-1")).expect("offline");
        assert!(registry.broadcast().current().is_empty());
    }
}
