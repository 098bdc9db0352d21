//! Core data types
//!
//! This module defines the snapshot consumed from the event-capture side, the
//! intermediate feature and vote types, and the actions/records handed to the
//! presentation and storage collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Navigational context of the observed page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowsingContext {
    WatchingVideo,
    ShortsFeed,
    Homepage,
    SearchResults,
    Subscriptions,
    Other,
    #[default]
    #[serde(other)]
    Unknown,
}

impl BrowsingContext {
    /// Wire name of the context
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowsingContext::WatchingVideo => "watching_video",
            BrowsingContext::ShortsFeed => "shorts_feed",
            BrowsingContext::Homepage => "homepage",
            BrowsingContext::SearchResults => "search_results",
            BrowsingContext::Subscriptions => "subscriptions",
            BrowsingContext::Other => "other",
            BrowsingContext::Unknown => "unknown",
        }
    }

    pub fn is_watching_video(&self) -> bool {
        matches!(self, BrowsingContext::WatchingVideo)
    }

    pub fn is_shorts_feed(&self) -> bool {
        matches!(self, BrowsingContext::ShortsFeed)
    }
}

/// Treat a missing or `null` numeric field as zero
fn zero_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// Periodic measurement of a browsing session.
///
/// Counters are cumulative since session start. Wire names follow the page-side
/// collaborator (camelCase).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Stable key for the browsing session
    pub session_id: String,
    /// Current navigational context
    #[serde(default)]
    pub current_context: BrowsingContext,
    /// Cumulative scroll distance in pixels
    #[serde(default, deserialize_with = "zero_if_null")]
    pub total_scroll_distance: f64,
    /// Cumulative regular video clicks
    #[serde(default, deserialize_with = "zero_if_null")]
    pub video_clicks: f64,
    /// Cumulative Shorts clicks
    #[serde(default, deserialize_with = "zero_if_null")]
    pub shorts_clicks: f64,
    /// Milliseconds elapsed since session start
    #[serde(default, deserialize_with = "zero_if_null")]
    pub session_duration: f64,
    /// Capture time in epoch milliseconds, used for deterministic replay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl SessionSnapshot {
    /// Create a snapshot with all counters at zero
    pub fn new(session_id: impl Into<String>, current_context: BrowsingContext) -> Self {
        Self {
            session_id: session_id.into(),
            current_context,
            ..Default::default()
        }
    }

    /// Raw (non-decayed) elapsed minutes reported by this snapshot
    pub fn raw_duration_minutes(&self) -> f64 {
        sanitize(self.session_duration) / 60_000.0
    }

    /// Capture time, if the producer stamped one
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    /// Problems a producer should fix. The engine tolerates all of them by
    /// treating the offending counters as zero.
    pub fn validation_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.session_id.trim().is_empty() {
            issues.push("sessionId is empty".to_string());
        }

        let counters = [
            ("totalScrollDistance", self.total_scroll_distance),
            ("videoClicks", self.video_clicks),
            ("shortsClicks", self.shorts_clicks),
            ("sessionDuration", self.session_duration),
        ];
        for (name, value) in counters {
            if !value.is_finite() || value < 0.0 {
                issues.push(format!("{} must be a non-negative number, got {}", name, value));
            }
        }

        if let Some(ts) = self.timestamp {
            if self.captured_at().is_none() {
                issues.push(format!("timestamp {} is out of range", ts));
            }
        }

        issues
    }
}

/// Clamp a counter to a finite, non-negative value
pub(crate) fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Smoothed rate features derived from a rolling window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Decayed duration in minutes
    pub duration_minutes: f64,
    /// Pixels scrolled per decayed minute
    pub scroll_intensity: f64,
    /// Clicks per decayed minute
    pub click_rate: f64,
    /// Clicks per 1000 pixels scrolled
    pub engagement_score: f64,
    /// Decayed scroll distance accumulator
    pub scroll_distance: f64,
    /// Decayed Shorts click accumulator
    pub shorts_clicks: f64,
}

/// The six rule-based doomscrolling signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSignals {
    pub long_duration: bool,
    pub high_scrolling: bool,
    pub low_engagement: bool,
    pub fast_scrolling: bool,
    pub low_click_rate: bool,
    pub shorts_overload: bool,
}

impl RuleSignals {
    /// Number of signals currently firing (0-6)
    pub fn count(&self) -> usize {
        [
            self.long_duration,
            self.high_scrolling,
            self.low_engagement,
            self.fast_scrolling,
            self.low_click_rate,
            self.shorts_overload,
        ]
        .iter()
        .filter(|s| **s)
        .count()
    }
}

/// Independent opinions of the three classifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVotes {
    pub rule_based: bool,
    pub ml_based: bool,
    pub bayes_doom: bool,
    /// Logistic model probability
    pub ml_probability: f64,
    /// Fallback average, present only when the fallback was consulted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bayes_posterior: Option<f64>,
}

/// Intervention level, ordered by intrusiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeLevel {
    #[default]
    None,
    Awareness,
    Suggestion,
    Resistance,
}

impl NudgeLevel {
    /// Numeric level 0-3
    pub fn as_u8(&self) -> u8 {
        match self {
            NudgeLevel::None => 0,
            NudgeLevel::Awareness => 1,
            NudgeLevel::Suggestion => 2,
            NudgeLevel::Resistance => 3,
        }
    }
}

/// Variant of an awareness or suggestion nudge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeType {
    ShortsAwareness,
    LowEngagement,
    TimeAwareness,
    ShortsRedirect,
    SearchPrompt,
    GeneralBreak,
}

/// Action handed to the presentation collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum NudgeAction {
    /// Level 1: short banner message
    Awareness {
        message: String,
        nudge_type: NudgeType,
    },
    /// Level 2: prompt with three suggestions
    Suggestion {
        suggestions: Vec<String>,
        /// Elapsed minutes, rounded
        duration: u32,
        nudge_type: NudgeType,
    },
    /// Level 3: scroll friction, time-boxed by the presenter to `duration`
    Resistance {
        duration: u32,
        context: BrowsingContext,
    },
}

impl NudgeAction {
    pub fn level(&self) -> NudgeLevel {
        match self {
            NudgeAction::Awareness { .. } => NudgeLevel::Awareness,
            NudgeAction::Suggestion { .. } => NudgeLevel::Suggestion,
            NudgeAction::Resistance { .. } => NudgeLevel::Resistance,
        }
    }
}

/// Record appended to the nudge history collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgeLogRecord {
    pub record_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub nudge_level: u8,
    pub nudge_count: u32,
    /// Elapsed session minutes at the time of the nudge
    pub session_duration: f64,
}

/// Result of offering a decision to the escalation controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NudgeOutcome {
    /// No doomscrolling decision this cycle
    Idle,
    /// Doomscrolling detected while a video is playing
    SuppressedWatchingVideo,
    /// Eligible trigger dropped by the cooldown
    CoolingDown { remaining_secs: i64 },
    /// A nudge was emitted
    Fired {
        level: NudgeLevel,
        nudge_count: u32,
        action: NudgeAction,
        record: NudgeLogRecord,
    },
}

impl NudgeOutcome {
    pub fn fired(&self) -> bool {
        matches!(self, NudgeOutcome::Fired { .. })
    }

    pub fn action(&self) -> Option<&NudgeAction> {
        match self {
            NudgeOutcome::Fired { action, .. } => Some(action),
            _ => None,
        }
    }
}

/// Full report of one analysis pass over a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalysis {
    pub session_id: String,
    pub context: BrowsingContext,
    pub analyzed_at: DateTime<Utc>,
    pub raw_duration_minutes: f64,
    pub features: FeatureVector,
    pub signals: RuleSignals,
    pub signal_count: usize,
    pub votes: ClassifierVotes,
    /// Majority vote before the grace gate
    pub quorum: bool,
    pub grace_minutes: f64,
    pub within_grace: bool,
    /// Final decision reported to the caller
    pub is_doomscrolling: bool,
    pub nudge: NudgeOutcome,
}
