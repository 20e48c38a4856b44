//! Service configuration.
//!
//! All fields have defaults, so a config file only needs the values it
//! overrides. Durations are expressed in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::Point;

/// Default motion tick interval: 50 ms.
const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Default distance covered per tick.
const DEFAULT_SPEED_PER_TICK: f64 = 0.5;

/// Default arrival threshold (distance units).
const DEFAULT_ARRIVAL_EPSILON: f64 = 0.5;

/// Default driver-side polling interval for assigned rides: 3 s.
const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

/// Default number of reservation attempts per ride request.
const DEFAULT_MAX_RESERVATION_ATTEMPTS: usize = 5;

/// Location reported for a driver the registry has never seen.
const DEFAULT_START_LOCATION: Point = Point::new(10.0, 10.0);

/// Motion simulator knobs. `report_every_ticks` decouples the registry write
/// rate from the physical tick rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub tick_interval_ms: u64,
    pub speed_per_tick: f64,
    pub arrival_epsilon: f64,
    /// Write the running position into the registry every N ticks (N >= 1).
    pub report_every_ticks: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            speed_per_tick: DEFAULT_SPEED_PER_TICK,
            arrival_epsilon: DEFAULT_ARRIVAL_EPSILON,
            report_every_ticks: 1,
        }
    }
}

impl MotionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    pub fn with_speed_per_tick(mut self, speed: f64) -> Self {
        self.speed_per_tick = speed;
        self
    }

    pub fn with_arrival_epsilon(mut self, epsilon: f64) -> Self {
        self.arrival_epsilon = epsilon;
        self
    }

    pub fn with_report_every_ticks(mut self, ticks: u32) -> Self {
        self.report_every_ticks = ticks;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "motion.tick_interval_ms",
                "must be greater than zero",
            ));
        }
        if !(self.speed_per_tick.is_finite() && self.speed_per_tick > 0.0) {
            return Err(ConfigError::invalid(
                "motion.speed_per_tick",
                format!("must be a positive number, got {}", self.speed_per_tick),
            ));
        }
        if !(self.arrival_epsilon.is_finite() && self.arrival_epsilon > 0.0) {
            return Err(ConfigError::invalid(
                "motion.arrival_epsilon",
                format!("must be a positive number, got {}", self.arrival_epsilon),
            ));
        }
        if self.report_every_ticks == 0 {
            return Err(ConfigError::invalid(
                "motion.report_every_ticks",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Top-level configuration for [`crate::service::DispatchService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on CAS reservation attempts per ride request.
    pub max_reservation_attempts: usize,
    /// How often driver clients should poll for an assigned ride.
    pub poll_interval_ms: u64,
    /// Location handed out for drivers with no registry record yet.
    pub default_start_location: Point,
    pub motion: MotionConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_reservation_attempts: DEFAULT_MAX_RESERVATION_ATTEMPTS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            default_start_location: DEFAULT_START_LOCATION,
            motion: MotionConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn with_max_reservation_attempts(mut self, attempts: usize) -> Self {
        self.max_reservation_attempts = attempts;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_default_start_location(mut self, location: Point) -> Self {
        self.default_start_location = location;
        self
    }

    pub fn with_motion(mut self, motion: MotionConfig) -> Self {
        self.motion = motion;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_reservation_attempts == 0 {
            return Err(ConfigError::invalid(
                "max_reservation_attempts",
                "must be at least 1",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if !self.default_start_location.is_finite() {
            return Err(ConfigError::invalid(
                "default_start_location",
                "coordinates must be finite",
            ));
        }
        self.motion.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DispatchConfig::default();
        config.validate().expect("default config");
        assert_eq!(config.motion.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.default_start_location, Point::new(10.0, 10.0));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = DispatchConfig::from_json_str(
            r#"{ "max_reservation_attempts": 3, "motion": { "speed_per_tick": 2.0 } }"#,
        )
        .expect("config");
        assert_eq!(config.max_reservation_attempts, 3);
        assert_eq!(config.motion.speed_per_tick, 2.0);
        assert_eq!(config.motion.arrival_epsilon, 0.5);
        assert_eq!(config.poll_interval_ms, 3_000);
    }

    #[test]
    fn rejects_zero_report_rate() {
        let err = DispatchConfig::from_json_str(r#"{ "motion": { "report_every_ticks": 0 } }"#)
            .expect_err("invalid");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "motion.report_every_ticks",
                ..
            }
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            DispatchConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
