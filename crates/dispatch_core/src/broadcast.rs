//! Driver snapshot fan-out to subscribed riders.
//!
//! Built on a `tokio::sync::watch` channel: publishing replaces the current
//! snapshot without waiting on anyone, and each subscriber reads the newest
//! value when it gets around to it. A subscriber that falls behind simply skips
//! the intermediate frames, so slow viewers never push back on registry
//! writers or on each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::geometry::Point;
use crate::model::{DriverId, DriverRecord, DriverStatus};

/// What observers see of one driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverView {
    pub location: Point,
    pub status: DriverStatus,
}

/// Point-in-time view of all non-offline drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Increases by one for every registry change.
    pub version: u64,
    pub taken_at: DateTime<Utc>,
    pub drivers: BTreeMap<DriverId, DriverView>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            taken_at: Utc::now(),
            drivers: BTreeMap::new(),
        }
    }

    pub fn from_records<'a>(
        version: u64,
        records: impl IntoIterator<Item = &'a DriverRecord>,
    ) -> Self {
        let drivers = records
            .into_iter()
            .filter(|record| record.status != DriverStatus::Offline)
            .map(|record| {
                (
                    record.id.clone(),
                    DriverView {
                        location: record.location,
                        status: record.status,
                    },
                )
            })
            .collect();
        Self {
            version,
            taken_at: Utc::now(),
            drivers,
        }
    }

    pub fn get(&self, driver_id: &DriverId) -> Option<&DriverView> {
        self.drivers.get(driver_id)
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Wire form of the feed: a JSON object keyed by driver id.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.drivers)
    }
}

#[derive(Debug)]
pub struct BroadcastChannel {
    sender: watch::Sender<Arc<Snapshot>>,
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastChannel {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self { sender }
    }

    /// Replace the current snapshot. Never blocks, even with no subscribers.
    pub fn publish(&self, snapshot: Snapshot) {
        self.sender.send_replace(Arc::new(snapshot));
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            delivered_initial: false,
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.sender.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// One rider's feed. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: watch::Receiver<Arc<Snapshot>>,
    delivered_initial: bool,
}

impl Subscription {
    /// The first call yields the current snapshot immediately; later calls
    /// wait for the next change. Returns `None` once the channel is gone.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        if !self.delivered_initial {
            self.delivered_initial = true;
            return Some(self.receiver.borrow_and_update().clone());
        }
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        self.receiver.borrow().clone()
    }
}
