//! Nudge escalation state machine
//!
//! Decides whether, when and at what level to intervene. Two properties matter:
//!
//! - **Cooldown**: at most one nudge per cooldown window; triggers inside the
//!   window are dropped without touching state.
//! - **Ratchet**: `nudge_count` only ever increases, so once the level 2/3
//!   thresholds are reachable they stay reachable for the life of the process.
//!
//! The state is process-wide, not per session: a nudge fired for one session
//! counts towards the escalation (and cooldown) of every other session.

use crate::messages;
use crate::types::{
    BrowsingContext, NudgeLevel, NudgeLogRecord, NudgeOutcome, RuleSignals,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Elapsed minutes required (with a repeat nudge) for resistance
const RESISTANCE_MINUTES: f64 = 25.0;
/// Elapsed minutes that alone justify a suggestion
const SUGGESTION_MINUTES: f64 = 20.0;
/// Nudge count from which escalation beyond awareness is allowed
const REPEAT_NUDGE_COUNT: u32 = 2;

/// Process-wide escalation state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NudgeState {
    pub nudge_level: NudgeLevel,
    pub nudge_count: u32,
    pub last_nudge_time: Option<DateTime<Utc>>,
}

/// What the controller needs to know about the triggering session
#[derive(Debug, Clone, Copy)]
pub struct NudgeRequest<'a> {
    pub session_id: &'a str,
    pub context: BrowsingContext,
    pub raw_duration_minutes: f64,
    /// Cumulative Shorts clicks reported by the snapshot
    pub shorts_clicks: f64,
    pub signals: &'a RuleSignals,
}

/// Pick the level for a trigger, given the post-increment nudge count
pub fn select_level(raw_duration_minutes: f64, nudge_count: u32) -> NudgeLevel {
    if raw_duration_minutes >= RESISTANCE_MINUTES && nudge_count >= REPEAT_NUDGE_COUNT {
        NudgeLevel::Resistance
    } else if raw_duration_minutes >= SUGGESTION_MINUTES || nudge_count >= REPEAT_NUDGE_COUNT {
        NudgeLevel::Suggestion
    } else {
        NudgeLevel::Awareness
    }
}

#[derive(Debug, Clone)]
pub struct NudgeEscalationController {
    state: NudgeState,
    cooldown: Duration,
}

impl NudgeEscalationController {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_state(NudgeState::default(), cooldown)
    }

    /// Start from an existing state
    pub fn with_state(state: NudgeState, cooldown: Duration) -> Self {
        Self { state, cooldown }
    }

    pub fn state(&self) -> &NudgeState {
        &self.state
    }

    /// Offer the gated decision for one snapshot
    pub fn consider(
        &mut self,
        is_doomscrolling: bool,
        request: &NudgeRequest<'_>,
        now: DateTime<Utc>,
    ) -> NudgeOutcome {
        if !is_doomscrolling {
            return NudgeOutcome::Idle;
        }
        if request.context.is_watching_video() {
            log::debug!(
                "Doomscrolling detected for {} while watching video, skipping nudge",
                request.session_id
            );
            return NudgeOutcome::SuppressedWatchingVideo;
        }
        self.trigger(request, now)
    }

    /// Fire a nudge unless the cooldown is still running
    pub fn trigger(&mut self, request: &NudgeRequest<'_>, now: DateTime<Utc>) -> NudgeOutcome {
        if let Some(last) = self.state.last_nudge_time {
            let since = now - last;
            if since < self.cooldown {
                let remaining_secs = (self.cooldown - since).num_seconds();
                log::debug!("Nudge on cooldown for another {}s, skipping", remaining_secs);
                return NudgeOutcome::CoolingDown { remaining_secs };
            }
        }

        self.state.last_nudge_time = Some(now);
        self.state.nudge_count += 1;

        let minutes = request.raw_duration_minutes;
        let level = select_level(minutes, self.state.nudge_count);
        self.state.nudge_level = level;

        let action = match level {
            NudgeLevel::Resistance => messages::resistance(request.context, minutes),
            NudgeLevel::Suggestion => messages::suggestion(request.context, request.signals, minutes),
            _ => messages::awareness(request.signals, request.shorts_clicks, minutes),
        };

        let record = NudgeLogRecord {
            record_id: Uuid::new_v4().to_string(),
            timestamp: now,
            session_id: request.session_id.to_string(),
            nudge_level: level.as_u8(),
            nudge_count: self.state.nudge_count,
            session_duration: minutes,
        };

        log::info!(
            "Nudge fired for {}: level {} (count {}) after {:.1} min",
            request.session_id,
            level.as_u8(),
            self.state.nudge_count,
            minutes
        );

        NudgeOutcome::Fired {
            level,
            nudge_count: self.state.nudge_count,
            action,
            record,
        }
    }
}
