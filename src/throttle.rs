//! Per-session evaluation throttle
//!
//! Snapshots may arrive far more often than the user-configured evaluation
//! interval. The throttle admits at most one evaluation per interval per session.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct EvaluationThrottle {
    interval: Duration,
    last_evaluated: HashMap<String, DateTime<Utc>>,
}

impl EvaluationThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_evaluated: HashMap::new(),
        }
    }

    /// Returns true and records the time if `session_id` may be evaluated now
    pub fn admit(&mut self, session_id: &str, now: DateTime<Utc>) -> bool {
        match self.last_evaluated.get(session_id) {
            Some(last) if now - *last < self.interval => false,
            _ => {
                self.last_evaluated.insert(session_id.to_string(), now);
                true
            }
        }
    }

    pub fn forget(&mut self, session_id: &str) {
        self.last_evaluated.remove(session_id);
    }
}
