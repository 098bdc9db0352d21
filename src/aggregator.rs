//! Rolling-window feature aggregation
//!
//! Cumulative per-snapshot counters are turned into decayed accumulators so that a
//! single spike does not flip the decision and long sessions do not grow without
//! bound. Each session gets its own [`RollingWindowState`], created lazily in the
//! [`SessionStore`].

use crate::types::{sanitize, BrowsingContext, FeatureVector, SessionSnapshot};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decayed engagement accumulators for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindowState {
    pub scroll_distance: f64,
    pub video_clicks: f64,
    pub shorts_clicks: f64,
    pub duration_ms: f64,
    pub last_reset: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_total_scroll: f64,
    pub last_video_clicks: f64,
    pub last_shorts_clicks: f64,
    /// Prior rule-based decision, used for hysteresis
    pub rule_hysteresis_state: bool,
}

impl RollingWindowState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            scroll_distance: 0.0,
            video_clicks: 0.0,
            shorts_clicks: 0.0,
            duration_ms: 0.0,
            last_reset: now,
            last_seen: now,
            last_total_scroll: 0.0,
            last_video_clicks: 0.0,
            last_shorts_clicks: 0.0,
            rule_hysteresis_state: false,
        }
    }

    /// Multiply all four accumulators by `factor`
    pub fn decay(&mut self, factor: f64) {
        self.scroll_distance *= factor;
        self.video_clicks *= factor;
        self.shorts_clicks *= factor;
        self.duration_ms *= factor;
    }

    /// Derive the smoothed feature vector. All divisions are guarded.
    pub fn features(&self) -> FeatureVector {
        let duration_minutes = self.duration_ms / 60_000.0;
        let total_clicks = self.video_clicks + self.shorts_clicks;

        let scroll_intensity = if duration_minutes > 0.0 {
            self.scroll_distance / duration_minutes
        } else {
            0.0
        };
        let click_rate = if duration_minutes > 0.0 {
            total_clicks / duration_minutes
        } else {
            0.0
        };
        let engagement_score = if self.scroll_distance > 0.0 {
            total_clicks * 1000.0 / self.scroll_distance
        } else {
            0.0
        };

        FeatureVector {
            duration_minutes,
            scroll_intensity,
            click_rate,
            engagement_score,
            scroll_distance: self.scroll_distance,
            shorts_clicks: self.shorts_clicks,
        }
    }
}

/// Per-session rolling window state, keyed by session ID
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStore {
    windows: HashMap<String, RollingWindowState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the window for a session, creating it on first sight
    pub fn get_or_insert(&mut self, session_id: &str, now: DateTime<Utc>) -> &mut RollingWindowState {
        self.windows
            .entry(session_id.to_string())
            .or_insert_with(|| RollingWindowState::new(now))
    }

    pub fn get(&self, session_id: &str) -> Option<&RollingWindowState> {
        self.windows.get(session_id)
    }

    pub fn remove(&mut self, session_id: &str) -> Option<RollingWindowState> {
        self.windows.remove(session_id)
    }

    /// Drop every session whose last snapshot is older than `ttl`.
    /// Returns the evicted session IDs.
    pub fn evict_idle(&mut self, now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .windows
            .iter()
            .filter(|(_, w)| now - w.last_seen > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.windows.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Maintains the decayed rolling windows of every session
#[derive(Debug, Clone)]
pub struct FeatureAggregator {
    store: SessionStore,
    watching_video_decay: f64,
    window_decay: f64,
    reset_interval: Duration,
}

impl FeatureAggregator {
    pub fn new(watching_video_decay: f64, window_decay: f64, reset_interval: Duration) -> Self {
        Self {
            store: SessionStore::new(),
            watching_video_decay,
            window_decay,
            reset_interval,
        }
    }

    /// Fold a snapshot into its session window and return the updated window
    pub fn update(&mut self, snapshot: &SessionSnapshot, now: DateTime<Utc>) -> &mut RollingWindowState {
        let watching_video_decay = self.watching_video_decay;
        let window_decay = self.window_decay;
        let reset_interval = self.reset_interval;

        let window = self.store.get_or_insert(&snapshot.session_id, now);
        window.last_seen = now;

        if snapshot.current_context == BrowsingContext::WatchingVideo {
            // Video playback is not scroll-driven; let the signal fade
            window.decay(watching_video_decay);
            window.rule_hysteresis_state = false;
            return window;
        }

        let total_scroll = sanitize(snapshot.total_scroll_distance);
        let video_clicks = sanitize(snapshot.video_clicks);
        let shorts_clicks = sanitize(snapshot.shorts_clicks);

        // Counter resets yield a zero delta, never a negative one
        window.scroll_distance += (total_scroll - window.last_total_scroll).max(0.0);
        window.video_clicks += (video_clicks - window.last_video_clicks).max(0.0);
        window.shorts_clicks += (shorts_clicks - window.last_shorts_clicks).max(0.0);
        window.duration_ms += sanitize(snapshot.session_duration);

        window.last_total_scroll = total_scroll;
        window.last_video_clicks = video_clicks;
        window.last_shorts_clicks = shorts_clicks;

        if now - window.last_reset > reset_interval {
            window.decay(window_decay);
            window.last_reset = now;
        }

        window
    }

    pub fn window(&self, session_id: &str) -> Option<&RollingWindowState> {
        self.store.get(session_id)
    }

    pub fn remove(&mut self, session_id: &str) -> Option<RollingWindowState> {
        self.store.remove(session_id)
    }

    pub fn evict_idle(&mut self, now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
        self.store.evict_idle(now, ttl)
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }
}
