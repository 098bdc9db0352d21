//! Grace period gate
//!
//! No intervention is evaluated until a session has run for a context-dependent
//! minimum time, measured on the raw (non-decayed) elapsed duration.

use crate::types::BrowsingContext;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GracePeriodGate {
    default_minutes: f64,
    shorts_minutes: f64,
}

impl GracePeriodGate {
    pub fn new(default_minutes: f64, shorts_minutes: f64) -> Self {
        Self {
            default_minutes,
            shorts_minutes,
        }
    }

    /// Grace period that applies in `context`
    pub fn grace_minutes(&self, context: BrowsingContext) -> f64 {
        if context.is_shorts_feed() {
            self.shorts_minutes
        } else {
            self.default_minutes
        }
    }

    /// True while the session is still inside its grace period
    pub fn within_grace(&self, context: BrowsingContext, raw_duration_minutes: f64) -> bool {
        raw_duration_minutes < self.grace_minutes(context)
    }

    /// Gate a fused decision: inside the grace period it is always "not doomscrolling"
    pub fn admit(&self, context: BrowsingContext, raw_duration_minutes: f64, decision: bool) -> bool {
        decision && !self.within_grace(context, raw_duration_minutes)
    }
}
