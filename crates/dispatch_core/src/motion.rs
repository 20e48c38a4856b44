//! Motion simulator: moves drivers along straight-line legs on a fixed tick.
//!
//! Each leg runs as its own tokio task. Every tick applies [`advance`], and
//! every `report_every_ticks` ticks the position is written into the
//! [`DriverRegistry`]. Arrival writes the final position, emits exactly one
//! [`MotionEvent::Arrived`] and ends the task. Legs are cancelled through a
//! [`CancellationToken`]; a cancelled leg never emits an event.
//!
//! The step function is pure so tick arithmetic can be tested without a
//! runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::MotionConfig;
use crate::error::RegistryError;
use crate::geometry::{distance, step_toward, Point};
use crate::model::{DriverId, RideId};
use crate::registry::DriverRegistry;

/// Which half of a ride a motion belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Pickup,
    Dropoff,
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Leg::Pickup => f.write_str("pickup"),
            Leg::Dropoff => f.write_str("dropoff"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MotionEvent {
    Arrived {
        driver_id: DriverId,
        ride_id: RideId,
        leg: Leg,
        location: Point,
        /// Ticks elapsed from start to arrival.
        ticks: u64,
    },
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Moved(Point),
    /// Snapped onto the target.
    Arrived(Point),
}

/// Advance one tick from `position` toward `target`.
///
/// Arrives when the distance is strictly below `epsilon`, either before the
/// move or right after it. A driver exactly `epsilon` away keeps moving.
pub fn advance(position: Point, target: Point, speed: f64, epsilon: f64) -> Step {
    if distance(position, target) < epsilon {
        return Step::Arrived(target);
    }
    let next = step_toward(position, target, speed);
    if distance(next, target) < epsilon {
        Step::Arrived(target)
    } else {
        Step::Moved(next)
    }
}

/// Handle to one running leg.
#[derive(Debug, Clone)]
pub struct MotionHandle {
    id: u64,
    driver_id: DriverId,
    ride_id: RideId,
    leg: Leg,
    token: CancellationToken,
}

impl MotionHandle {
    pub fn driver_id(&self) -> &DriverId {
        &self.driver_id
    }

    pub fn ride_id(&self) -> RideId {
        self.ride_id
    }

    pub fn leg(&self) -> Leg {
        self.leg
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct ActiveMotion {
    id: u64,
    ride_id: RideId,
    leg: Leg,
    token: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    registry: Arc<DriverRegistry>,
    events: mpsc::UnboundedSender<MotionEvent>,
    config: MotionConfig,
    active: Mutex<HashMap<DriverId, ActiveMotion>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct MotionSimulator {
    inner: Arc<Inner>,
}

struct LegTask {
    id: u64,
    driver_id: DriverId,
    ride_id: RideId,
    leg: Leg,
    start: Point,
    target: Point,
    speed: f64,
    token: CancellationToken,
}

impl MotionSimulator {
    /// Build a simulator and the receiving end of its arrival events.
    pub fn channel(
        registry: Arc<DriverRegistry>,
        config: MotionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<MotionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let simulator = Self {
            inner: Arc::new(Inner {
                registry,
                events,
                config,
                active: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        };
        (simulator, receiver)
    }

    pub fn config(&self) -> &MotionConfig {
        &self.inner.config
    }

    /// Start moving a driver from its registry position toward `target`.
    ///
    /// Any leg the driver is already running is cancelled first. Must be
    /// called from within a tokio runtime.
    pub fn start_moving_toward(
        &self,
        driver_id: &DriverId,
        target: Point,
        speed_per_tick: f64,
        ride_id: RideId,
        leg: Leg,
    ) -> Result<MotionHandle, RegistryError> {
        let start = self
            .inner
            .registry
            .get(driver_id)
            .ok_or_else(|| RegistryError::NotFound(driver_id.clone()))?
            .location;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.shutdown.child_token();

        let replaced = {
            let mut active = self.inner.active.lock();
            let replaced = active.insert(
                driver_id.clone(),
                ActiveMotion {
                    id,
                    ride_id,
                    leg,
                    token: token.clone(),
                },
            );
            if let Some(previous) = &replaced {
                previous.token.cancel();
            }
            replaced
        };
        if let Some(previous) = replaced {
            debug!(driver_id = %driver_id, ride_id = %previous.ride_id, leg = %previous.leg, "previous leg replaced");
        }

        debug!(driver_id = %driver_id, ride_id = %ride_id, %leg, from = %start, to = %target, "leg started");
        let task = LegTask {
            id,
            driver_id: driver_id.clone(),
            ride_id,
            leg,
            start,
            target,
            speed: speed_per_tick,
            token: token.clone(),
        };
        tokio::spawn(run_leg(Arc::clone(&self.inner), task));

        Ok(MotionHandle {
            id,
            driver_id: driver_id.clone(),
            ride_id,
            leg,
            token,
        })
    }

    /// Cancel one leg. No-op if it already finished or was replaced.
    pub fn stop(&self, handle: &MotionHandle) {
        let mut active = self.inner.active.lock();
        if active
            .get(&handle.driver_id)
            .is_some_and(|motion| motion.id == handle.id)
        {
            active.remove(&handle.driver_id);
        }
        handle.token.cancel();
    }

    /// Cancel whatever leg the driver is running. Returns whether one was running.
    pub fn stop_driver(&self, driver_id: &DriverId) -> bool {
        let removed = {
            let mut active = self.inner.active.lock();
            let removed = active.remove(driver_id);
            if let Some(motion) = &removed {
                motion.token.cancel();
            }
            removed
        };
        match removed {
            Some(motion) => {
                debug!(driver_id = %driver_id, ride_id = %motion.ride_id, leg = %motion.leg, "leg stopped");
                true
            }
            None => false,
        }
    }

    /// Cancel the driver's leg only if it belongs to `ride_id`.
    pub fn stop_ride(&self, driver_id: &DriverId, ride_id: RideId) -> bool {
        let mut active = self.inner.active.lock();
        if !active
            .get(driver_id)
            .is_some_and(|motion| motion.ride_id == ride_id)
        {
            return false;
        }
        if let Some(motion) = active.remove(driver_id) {
            motion.token.cancel();
        }
        true
    }

    /// Ride and leg the driver is currently moving on, if any.
    pub fn active_leg(&self, driver_id: &DriverId) -> Option<(RideId, Leg)> {
        self.inner
            .active
            .lock()
            .get(driver_id)
            .map(|motion| (motion.ride_id, motion.leg))
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Cancel every running leg. Legs started afterwards are cancelled at
    /// birth; this is the shutdown path.
    pub fn stop_all(&self) {
        let mut active = self.inner.active.lock();
        self.inner.shutdown.cancel();
        active.clear();
    }
}

async fn run_leg(inner: Arc<Inner>, task: LegTask) {
    let config = inner.config;
    let report_every = u64::from(config.report_every_ticks.max(1));
    let mut interval = tokio::time::interval(config.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately.
    interval.tick().await;

    let mut position = task.start;
    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = task.token.cancelled() => {
                trace!(driver_id = %task.driver_id, ride_id = %task.ride_id, ticks, "leg cancelled");
                return;
            }
            _ = interval.tick() => {}
        }
        ticks += 1;

        match advance(position, task.target, task.speed, config.arrival_epsilon) {
            Step::Moved(next) => {
                position = next;
                if ticks % report_every == 0 && !write_position(&inner, &task, position) {
                    forget(&inner, &task);
                    return;
                }
            }
            Step::Arrived(at) => {
                if !write_position(&inner, &task, at) {
                    forget(&inner, &task);
                    return;
                }
                finish(&inner, &task, at, ticks);
                return;
            }
        }
    }
}

fn write_position(inner: &Inner, task: &LegTask, position: Point) -> bool {
    if task.token.is_cancelled() {
        return false;
    }
    match inner.registry.record_position(&task.driver_id, position) {
        Ok(sequence) => {
            trace!(driver_id = %task.driver_id, %position, sequence, "position written");
            true
        }
        Err(err) => {
            warn!(driver_id = %task.driver_id, error = %err, "dropping leg, position write failed");
            false
        }
    }
}

/// Emit the arrival unless the leg was cancelled. Stops cancel while holding
/// the active map lock, so checking under it settles the race one way.
fn finish(inner: &Inner, task: &LegTask, location: Point, ticks: u64) {
    let emit = {
        let mut active = inner.active.lock();
        if task.token.is_cancelled() {
            false
        } else {
            if active
                .get(&task.driver_id)
                .is_some_and(|motion| motion.id == task.id)
            {
                active.remove(&task.driver_id);
            }
            true
        }
    };
    if !emit {
        return;
    }
    debug!(driver_id = %task.driver_id, ride_id = %task.ride_id, leg = %task.leg, ticks, "arrived");
    let event = MotionEvent::Arrived {
        driver_id: task.driver_id.clone(),
        ride_id: task.ride_id,
        leg: task.leg,
        location,
        ticks,
    };
    if inner.events.send(event).is_err() {
        debug!(driver_id = %task.driver_id, "arrival dropped, no event consumer");
    }
}

fn forget(inner: &Inner, task: &LegTask) {
    let mut active = inner.active.lock();
    if active
        .get(&task.driver_id)
        .is_some_and(|motion| motion.id == task.id)
    {
        active.remove(&task.driver_id);
    }
}
