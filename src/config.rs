//! Engine configuration
//!
//! Operational knobs for the rolling window, grace gate, cooldown and evaluation
//! throttle. Classifier thresholds and model coefficients are fixed constants in
//! their own modules and are not configurable.

use crate::error::EngineError;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default decay applied per snapshot while a video is playing
pub const DEFAULT_WATCHING_VIDEO_DECAY: f64 = 0.80;

/// Default decay applied on each rolling-window reset
pub const DEFAULT_WINDOW_DECAY: f64 = 0.70;

/// Default wall-clock interval between rolling-window decays
pub const DEFAULT_WINDOW_RESET_SECS: i64 = 30;

/// Default minimum gap between two nudges (5 minutes)
pub const DEFAULT_NUDGE_COOLDOWN_SECS: i64 = 5 * 60;

/// Default grace period outside the Shorts feed
pub const DEFAULT_GRACE_MINUTES: f64 = 2.0;

/// Default grace period on the Shorts feed (30 seconds)
pub const DEFAULT_SHORTS_GRACE_MINUTES: f64 = 0.5;

/// Default minimum interval between evaluations of one session
pub const DEFAULT_EVALUATION_INTERVAL_MINUTES: f64 = 5.0;

/// Default number of nudge records retained by the in-memory history
pub const DEFAULT_NUDGE_HISTORY_CAPACITY: usize = 100;

/// Upper bound for every interval knob (one year)
pub const MAX_INTERVAL_SECS: i64 = 365 * 24 * 60 * 60;

/// Configuration for [`crate::DoomscrollEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Decay factor applied per snapshot in the `watching_video` context
    pub watching_video_decay: f64,
    /// Decay factor applied when the rolling window resets
    pub window_decay: f64,
    /// Seconds between rolling-window resets
    pub window_reset_secs: i64,
    /// Seconds that must pass between two nudges
    pub nudge_cooldown_secs: i64,
    /// Grace period in minutes for every context except the Shorts feed
    pub grace_minutes_default: f64,
    /// Grace period in minutes for the Shorts feed
    pub grace_minutes_shorts: f64,
    /// Minimum minutes between two throttled evaluations of the same session
    pub evaluation_interval_minutes: f64,
    /// Evict session state idle for longer than this; `None` keeps it forever
    pub session_idle_ttl_minutes: Option<f64>,
    /// Capacity of the in-memory nudge history
    pub nudge_history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watching_video_decay: DEFAULT_WATCHING_VIDEO_DECAY,
            window_decay: DEFAULT_WINDOW_DECAY,
            window_reset_secs: DEFAULT_WINDOW_RESET_SECS,
            nudge_cooldown_secs: DEFAULT_NUDGE_COOLDOWN_SECS,
            grace_minutes_default: DEFAULT_GRACE_MINUTES,
            grace_minutes_shorts: DEFAULT_SHORTS_GRACE_MINUTES,
            evaluation_interval_minutes: DEFAULT_EVALUATION_INTERVAL_MINUTES,
            session_idle_ttl_minutes: None,
            nudge_history_capacity: DEFAULT_NUDGE_HISTORY_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a configuration from JSON. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::EncodingError(e.to_string()))
    }

    /// Check that every knob is within its meaningful range
    pub fn validate(&self) -> Result<(), EngineError> {
        check_decay("watching_video_decay", self.watching_video_decay)?;
        check_decay("window_decay", self.window_decay)?;

        check_secs("window_reset_secs", self.window_reset_secs)?;
        check_secs("nudge_cooldown_secs", self.nudge_cooldown_secs)?;

        check_minutes("grace_minutes_default", self.grace_minutes_default)?;
        check_minutes("grace_minutes_shorts", self.grace_minutes_shorts)?;
        check_minutes("evaluation_interval_minutes", self.evaluation_interval_minutes)?;
        if let Some(ttl) = self.session_idle_ttl_minutes {
            check_minutes("session_idle_ttl_minutes", ttl)?;
        }

        if self.nudge_history_capacity == 0 {
            return Err(invalid("nudge_history_capacity must be at least 1"));
        }

        Ok(())
    }

    pub fn window_reset_interval(&self) -> Duration {
        Duration::seconds(self.window_reset_secs)
    }

    pub fn nudge_cooldown(&self) -> Duration {
        Duration::seconds(self.nudge_cooldown_secs)
    }

    pub fn evaluation_interval(&self) -> Duration {
        minutes_to_duration(self.evaluation_interval_minutes)
    }

    pub fn session_idle_ttl(&self) -> Option<Duration> {
        self.session_idle_ttl_minutes.map(minutes_to_duration)
    }
}

fn minutes_to_duration(minutes: f64) -> Duration {
    Duration::milliseconds((minutes * 60_000.0).round() as i64)
}

fn invalid(msg: &str) -> EngineError {
    EngineError::InvalidConfig(msg.to_string())
}

fn check_decay(name: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{} must be in (0, 1], got {}",
            name, value
        )))
    }
}

fn check_secs(name: &str, value: i64) -> Result<(), EngineError> {
    if (0..=MAX_INTERVAL_SECS).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{} must be between 0 and {} seconds, got {}",
            name, MAX_INTERVAL_SECS, value
        )))
    }
}

fn check_minutes(name: &str, value: f64) -> Result<(), EngineError> {
    let max_minutes = (MAX_INTERVAL_SECS / 60) as f64;
    if value.is_finite() && (0.0..=max_minutes).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{} must be between 0 and {} minutes, got {}",
            name, max_minutes, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = EngineConfig::from_json(r#"{"nudge_cooldown_secs": 60}"#).unwrap();
        assert_eq!(config.nudge_cooldown_secs, 60);
        assert_eq!(config.window_decay, DEFAULT_WINDOW_DECAY);
        assert_eq!(config.session_idle_ttl_minutes, None);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EngineConfig {
            session_idle_ttl_minutes: Some(90.0),
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_out_of_range_decay() {
        let result = EngineConfig::from_json(r#"{"window_decay": 1.5}"#);
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

        let result = EngineConfig::from_json(r#"{"watching_video_decay": 0.0}"#);
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_oversized_intervals() {
        let result = EngineConfig::from_json(r#"{"nudge_cooldown_secs": 9223372036854775807}"#);
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

        let result = EngineConfig::from_json(r#"{"window_reset_secs": 9223372036854775807}"#);
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

        let result = EngineConfig::from_json(r#"{"session_idle_ttl_minutes": 1e300}"#);
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

        let config = EngineConfig {
            nudge_cooldown_secs: MAX_INTERVAL_SECS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.nudge_cooldown(), Duration::seconds(MAX_INTERVAL_SECS));
    }

    #[test]
    fn test_rejects_zero_history_capacity() {
        let config = EngineConfig {
            nudge_history_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let config = EngineConfig::default();
        assert_eq!(config.nudge_cooldown(), Duration::minutes(5));
        assert_eq!(config.window_reset_interval(), Duration::seconds(30));
        assert_eq!(config.evaluation_interval(), Duration::minutes(5));
    }
}
