//! Collaborator interfaces: the station directory and the profile lookup.
//!
//! Both are owned by other services. The core only consumes them through these
//! traits; in-memory implementations back tests and the simulation binary.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;
use crate::geometry::Point;
use crate::model::StationId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub location: Point,
}

impl Station {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: Point) -> Self {
        Self {
            id: StationId::new(id),
            name: name.into(),
            location,
        }
    }
}

/// Static pickup-station reference data.
pub trait StationDirectory: Send + Sync {
    fn list_stations(&self) -> Result<Vec<Station>, DirectoryError>;

    fn station(&self, id: &StationId) -> Result<Option<Station>, DirectoryError> {
        Ok(self
            .list_stations()?
            .into_iter()
            .find(|station| &station.id == id))
    }

    /// Case-insensitive lookup by display name.
    fn station_by_name(&self, name: &str) -> Result<Option<Station>, DirectoryError> {
        let needle = name.trim();
        Ok(self
            .list_stations()?
            .into_iter()
            .find(|station| station.name.eq_ignore_ascii_case(needle)))
    }
}

/// Fixed list of stations.
#[derive(Debug, Clone, Default)]
pub struct StaticStations {
    stations: Vec<Station>,
}

impl StaticStations {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }
}

impl StationDirectory for StaticStations {
    fn list_stations(&self) -> Result<Vec<Station>, DirectoryError> {
        Ok(self.stations.clone())
    }

    fn station(&self, id: &StationId) -> Result<Option<Station>, DirectoryError> {
        Ok(self.stations.iter().find(|s| &s.id == id).cloned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Rider,
    Driver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub role: Role,
}

impl Profile {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Identity/profile lookup used to route a user to the rider or driver side.
pub trait ProfileDirectory: Send + Sync {
    fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DirectoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryProfiles {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: Profile) {
        self.profiles
            .write()
            .insert(profile.user_id.clone(), profile);
    }

    pub fn with_profile(self, profile: Profile) -> Self {
        self.insert(profile);
        self
    }
}

impl ProfileDirectory for InMemoryProfiles {
    fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DirectoryError> {
        Ok(self.profiles.read().get(user_id).cloned())
    }
}
