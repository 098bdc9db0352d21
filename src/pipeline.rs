//! Detection pipeline orchestration
//!
//! Each snapshot is handled synchronously to completion:
//! aggregate → classify → fuse → grace gate → escalate → dispatch.

use crate::aggregator::FeatureAggregator;
use crate::classifiers::{
    BayesianFallbackEstimator, ClassifierInput, LogisticRegressionScorer, RuleBasedSignalDetector,
};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::escalation::{NudgeEscalationController, NudgeRequest, NudgeState};
use crate::fusion::DecisionFusion;
use crate::grace::GracePeriodGate;
use crate::sink::{NoopNudgeLog, NoopPresenter, NudgeLogSink, NudgePresenter};
use crate::throttle::EvaluationThrottle;
use crate::types::{
    ClassifierVotes, NudgeAction, NudgeLogRecord, NudgeOutcome, SessionAnalysis, SessionSnapshot,
};

/// Parse a session snapshot JSON string
pub fn parse_snapshot(json: &str) -> Result<SessionSnapshot, EngineError> {
    serde_json::from_str(json)
        .map_err(|e| EngineError::ParseError(e.to_string()))
}

/// Stateful doomscrolling detector and nudge controller.
///
/// Owns the per-session rolling windows and the process-wide escalation state.
/// Nothing outlives the engine instance.
pub struct DoomscrollEngine<C: Clock = SystemClock> {
    config: EngineConfig,
    clock: C,
    aggregator: FeatureAggregator,
    rules: RuleBasedSignalDetector,
    logistic: LogisticRegressionScorer,
    bayes: BayesianFallbackEstimator,
    fusion: DecisionFusion,
    gate: GracePeriodGate,
    controller: NudgeEscalationController,
    throttle: EvaluationThrottle,
    presenter: Box<dyn NudgePresenter>,
    nudge_log: Box<dyn NudgeLogSink>,
}

impl Default for DoomscrollEngine<SystemClock> {
    fn default() -> Self {
        Self::build(EngineConfig::default(), SystemClock)
    }
}

impl DoomscrollEngine<SystemClock> {
    /// Create an engine on the wall clock
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> DoomscrollEngine<C> {
    /// Create an engine on an injected clock
    pub fn with_clock(config: EngineConfig, clock: C) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: EngineConfig, clock: C) -> Self {
        Self {
            aggregator: FeatureAggregator::new(
                config.watching_video_decay,
                config.window_decay,
                config.window_reset_interval(),
            ),
            rules: RuleBasedSignalDetector::new(),
            logistic: LogisticRegressionScorer::new(),
            bayes: BayesianFallbackEstimator::new(),
            fusion: DecisionFusion::new(),
            gate: GracePeriodGate::new(config.grace_minutes_default, config.grace_minutes_shorts),
            controller: NudgeEscalationController::new(config.nudge_cooldown()),
            throttle: EvaluationThrottle::new(config.evaluation_interval()),
            presenter: Box::new(NoopPresenter),
            nudge_log: Box::new(NoopNudgeLog),
            config,
            clock,
        }
    }

    /// Attach the presentation collaborator
    pub fn with_presenter(mut self, presenter: impl NudgePresenter + 'static) -> Self {
        self.presenter = Box::new(presenter);
        self
    }

    /// Attach the nudge-log collaborator
    pub fn with_nudge_log(mut self, nudge_log: impl NudgeLogSink + 'static) -> Self {
        self.nudge_log = Box::new(nudge_log);
        self
    }

    /// Resume from a previously captured escalation state
    pub fn with_nudge_state(mut self, state: NudgeState) -> Self {
        self.controller = NudgeEscalationController::with_state(state, self.config.nudge_cooldown());
        self
    }

    /// Run one snapshot through the whole pipeline, bypassing the throttle
    pub fn analyze_session(&mut self, snapshot: &SessionSnapshot) -> SessionAnalysis {
        let now = self.clock.now();
        self.evict_expired(now);

        let context = snapshot.current_context;
        let raw_duration_minutes = snapshot.raw_duration_minutes();

        // Stage 1: fold the snapshot into the rolling window
        let window = self.aggregator.update(snapshot, now);
        let features = window.features();
        let input = ClassifierInput {
            features: &features,
            context,
            raw_duration_minutes,
        };

        // Stage 2: three independent opinions
        let rule = self.rules.evaluate(&input, &mut window.rule_hysteresis_state);
        let ml_probability = self.logistic.probability(&input);
        let ml_based = self.logistic.is_doomscrolling(ml_probability);
        let bayes_posterior = if ml_based {
            None
        } else {
            Some(self.bayes.posterior(&input))
        };
        let bayes_doom = bayes_posterior.is_some_and(|p| self.bayes.is_doomscrolling(p));

        let mut votes = ClassifierVotes {
            rule_based: rule.doomscrolling,
            ml_based,
            bayes_doom,
            ml_probability,
            bayes_posterior,
        };

        // Stage 3: majority vote
        let quorum = self.fusion.fuse(&mut votes, context);

        log::debug!(
            "{} [{}] features={:?} signals={} votes=(rule={}, ml={} p={:.3}, bayes={}) quorum={}",
            snapshot.session_id,
            context.as_str(),
            features,
            rule.signal_count,
            votes.rule_based,
            votes.ml_based,
            votes.ml_probability,
            votes.bayes_doom,
            quorum
        );

        // Stage 4: grace period
        let grace_minutes = self.gate.grace_minutes(context);
        let within_grace = self.gate.within_grace(context, raw_duration_minutes);
        let is_doomscrolling = self.gate.admit(context, raw_duration_minutes, quorum);

        // Stage 5: escalation
        let nudge = if within_grace {
            log::debug!(
                "{} within grace period ({} min), skipping nudge",
                snapshot.session_id,
                grace_minutes
            );
            NudgeOutcome::Idle
        } else {
            let request = NudgeRequest {
                session_id: &snapshot.session_id,
                context,
                raw_duration_minutes,
                shorts_clicks: snapshot.shorts_clicks,
                signals: &rule.signals,
            };
            self.controller.consider(is_doomscrolling, &request, now)
        };

        if let NudgeOutcome::Fired { action, record, .. } = &nudge {
            self.dispatch(action, record.clone());
        }

        SessionAnalysis {
            session_id: snapshot.session_id.clone(),
            context,
            analyzed_at: now,
            raw_duration_minutes,
            features,
            signals: rule.signals,
            signal_count: rule.signal_count,
            votes,
            quorum,
            grace_minutes,
            within_grace,
            is_doomscrolling,
            nudge,
        }
    }

    /// Analyze a snapshot unless its session was evaluated within the
    /// configured evaluation interval
    pub fn ingest(&mut self, snapshot: &SessionSnapshot) -> Option<SessionAnalysis> {
        let now = self.clock.now();
        if !self.throttle.admit(&snapshot.session_id, now) {
            log::debug!(
                "{} evaluated less than {} min ago, skipping",
                snapshot.session_id,
                self.config.evaluation_interval_minutes
            );
            return None;
        }
        Some(self.analyze_session(snapshot))
    }

    /// Parse a snapshot JSON, analyze it and return the analysis as JSON
    pub fn process_json(&mut self, snapshot_json: &str) -> Result<String, EngineError> {
        let snapshot = parse_snapshot(snapshot_json)?;
        let analysis = self.analyze_session(&snapshot);
        serde_json::to_string(&analysis).map_err(|e| EngineError::EncodingError(e.to_string()))
    }

    /// Drop session state idle for longer than the configured TTL.
    /// Returns the number of sessions removed.
    pub fn evict_idle_sessions(&mut self) -> usize {
        let now = self.clock.now();
        self.evict_expired(now)
    }

    /// Forget everything known about one session
    pub fn reset_session(&mut self, session_id: &str) {
        self.aggregator.remove(session_id);
        self.throttle.forget(session_id);
    }

    pub fn nudge_state(&self) -> &NudgeState {
        self.controller.state()
    }

    pub fn session_count(&self) -> usize {
        self.aggregator.session_count()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn evict_expired(&mut self, now: chrono::DateTime<chrono::Utc>) -> usize {
        let Some(ttl) = self.config.session_idle_ttl() else {
            return 0;
        };
        let evicted = self.aggregator.evict_idle(now, ttl);
        for id in &evicted {
            self.throttle.forget(id);
        }
        if !evicted.is_empty() {
            log::debug!("Evicted {} idle session(s)", evicted.len());
        }
        evicted.len()
    }

    /// Hand the nudge to the collaborators. Failures never reach the caller.
    fn dispatch(&mut self, action: &NudgeAction, record: NudgeLogRecord) {
        if let Err(e) = self.presenter.present(action) {
            log::warn!("Could not deliver nudge to presenter: {}", e);
        }
        if let Err(e) = self.nudge_log.append(record) {
            log::warn!("Error logging nudge: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::SinkError;
    use crate::sink::{NudgeHistory, RecordingPresenter};
    use crate::types::{BrowsingContext, NudgeLevel};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn engine(clock: &ManualClock) -> DoomscrollEngine<ManualClock> {
        DoomscrollEngine::with_clock(EngineConfig::default(), clock.clone()).unwrap()
    }

    fn snapshot(
        id: &str,
        context: BrowsingContext,
        scroll: f64,
        videos: f64,
        shorts: f64,
        minutes: f64,
    ) -> SessionSnapshot {
        SessionSnapshot {
            session_id: id.to_string(),
            current_context: context,
            total_scroll_distance: scroll,
            video_clicks: videos,
            shorts_clicks: shorts,
            session_duration: minutes * 60_000.0,
            timestamp: None,
        }
    }

    /// Heavy, click-free scrolling: every classifier agrees
    fn doomscroll(id: &str, minutes: f64) -> SessionSnapshot {
        snapshot(id, BrowsingContext::Homepage, 200_000.0, 0.0, 0.0, minutes)
    }

    struct FailingPresenter;

    impl NudgePresenter for FailingPresenter {
        fn present(&mut self, _action: &NudgeAction) -> Result<(), SinkError> {
            Err(SinkError::PresenterUnavailable("no active tab".to_string()))
        }
    }

    struct FailingLog;

    impl NudgeLogSink for FailingLog {
        fn append(&mut self, _record: NudgeLogRecord) -> Result<(), SinkError> {
            Err(SinkError::WriteFailed("quota exceeded".to_string()))
        }
    }

    #[test]
    fn test_doomscrolling_session_fires_awareness() {
        let clock = ManualClock::new(t0());
        let presenter = Rc::new(RefCell::new(RecordingPresenter::new()));
        let history = Rc::new(RefCell::new(NudgeHistory::default()));
        let mut engine = engine(&clock)
            .with_presenter(presenter.clone())
            .with_nudge_log(history.clone());

        let analysis = engine.analyze_session(&doomscroll("s1", 10.0));

        assert!(analysis.votes.rule_based);
        assert!(analysis.votes.ml_based);
        assert!(analysis.quorum);
        assert!(analysis.is_doomscrolling);
        assert!(!analysis.within_grace);
        assert!(matches!(
            analysis.nudge,
            NudgeOutcome::Fired { level: NudgeLevel::Awareness, nudge_count: 1, .. }
        ));

        assert_eq!(presenter.borrow().actions().len(), 1);
        assert_eq!(history.borrow().len(), 1);
        let record = history.borrow().latest().cloned().unwrap();
        assert_eq!(record.session_id, "s1");
        assert_eq!(record.nudge_level, 1);
        assert_eq!(engine.nudge_state().nudge_count, 1);
    }

    #[test]
    fn test_shorts_grace_period_blocks_then_allows() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);

        let early = snapshot("s1", BrowsingContext::ShortsFeed, 200_000.0, 0.0, 0.0, 0.4);
        let analysis = engine.analyze_session(&early);
        assert!(analysis.quorum);
        assert!(analysis.within_grace);
        assert!(!analysis.is_doomscrolling);
        assert_eq!(analysis.nudge, NudgeOutcome::Idle);
        assert_eq!(engine.nudge_state().nudge_count, 0);

        clock.advance(Duration::seconds(10));
        let later = snapshot("s1", BrowsingContext::ShortsFeed, 400_000.0, 0.0, 0.0, 0.6);
        let analysis = engine.analyze_session(&later);
        assert!(!analysis.within_grace);
        assert!(analysis.is_doomscrolling);
        assert!(analysis.nudge.fired());
    }

    #[test]
    fn test_cooldown_across_snapshots() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);

        assert!(engine.analyze_session(&doomscroll("s1", 10.0)).nudge.fired());

        clock.advance(Duration::minutes(1));
        let analysis = engine.analyze_session(&doomscroll("s1", 11.0));
        assert!(analysis.is_doomscrolling);
        assert!(matches!(analysis.nudge, NudgeOutcome::CoolingDown { .. }));
        assert_eq!(engine.nudge_state().nudge_count, 1);

        clock.advance(Duration::minutes(5));
        assert!(engine.analyze_session(&doomscroll("s1", 16.0)).nudge.fired());
        assert_eq!(engine.nudge_state().nudge_count, 2);
    }

    #[test]
    fn test_escalates_through_all_levels() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);

        let first = engine.analyze_session(&doomscroll("s1", 5.0));
        assert!(matches!(first.nudge, NudgeOutcome::Fired { level: NudgeLevel::Awareness, .. }));

        clock.advance(Duration::minutes(15));
        let second = engine.analyze_session(&doomscroll("s1", 20.0));
        assert!(matches!(second.nudge, NudgeOutcome::Fired { level: NudgeLevel::Suggestion, .. }));

        clock.advance(Duration::minutes(10));
        let third = engine.analyze_session(&doomscroll("s1", 30.0));
        assert!(matches!(third.nudge, NudgeOutcome::Fired { level: NudgeLevel::Resistance, .. }));
        assert_eq!(engine.nudge_state().nudge_level, NudgeLevel::Resistance);
    }

    #[test]
    fn test_watching_video_clears_rule_memory() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);

        let analysis = engine.analyze_session(&doomscroll("s1", 10.0));
        assert!(analysis.votes.rule_based);

        clock.advance(Duration::seconds(10));
        let watching = snapshot("s1", BrowsingContext::WatchingVideo, 200_000.0, 0.0, 0.0, 10.2);
        let analysis = engine.analyze_session(&watching);

        assert!(!analysis.votes.rule_based);
        assert!(!matches!(analysis.nudge, NudgeOutcome::Fired { .. }));
        assert!(!engine.aggregator.window("s1").unwrap().rule_hysteresis_state);
    }

    #[test]
    fn test_watching_video_never_nudges() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);

        // The rule vote is cleared and the fallback only runs when the model is
        // unsure, so at most one classifier can agree while watching
        engine.analyze_session(&doomscroll("s1", 40.0));
        clock.advance(Duration::minutes(6));
        let watching = snapshot("s1", BrowsingContext::WatchingVideo, 0.0, 0.0, 0.0, 46.0);
        let analysis = engine.analyze_session(&watching);

        assert!(analysis.votes.ml_based);
        assert!(!analysis.votes.rule_based);
        assert!(!analysis.quorum);
        assert!(!analysis.nudge.fired());
        assert_eq!(engine.nudge_state().nudge_count, 1);
    }

    #[test]
    fn test_calm_browsing_stays_idle() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);

        let calm = snapshot("s1", BrowsingContext::SearchResults, 600.0, 6.0, 0.0, 4.0);
        let analysis = engine.analyze_session(&calm);

        assert!(!analysis.votes.rule_based);
        assert!(!analysis.votes.ml_based);
        assert!(!analysis.votes.bayes_doom);
        assert!(analysis.votes.bayes_posterior.is_some());
        assert!(!analysis.is_doomscrolling);
        assert_eq!(analysis.nudge, NudgeOutcome::Idle);
    }

    #[test]
    fn test_collaborator_failures_do_not_change_decision() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock)
            .with_presenter(FailingPresenter)
            .with_nudge_log(FailingLog);

        let analysis = engine.analyze_session(&doomscroll("s1", 10.0));
        assert!(analysis.is_doomscrolling);
        assert!(analysis.nudge.fired());
        assert_eq!(engine.nudge_state().nudge_count, 1);
    }

    #[test]
    fn test_ingest_throttles_per_session() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);

        assert!(engine.ingest(&doomscroll("s1", 3.0)).is_some());
        clock.advance(Duration::seconds(30));
        assert!(engine.ingest(&doomscroll("s1", 3.5)).is_none());
        assert!(engine.ingest(&doomscroll("s2", 3.5)).is_some());

        clock.advance(Duration::minutes(5));
        assert!(engine.ingest(&doomscroll("s1", 8.5)).is_some());
    }

    #[test]
    fn test_resumed_nudge_state_escalates_immediately() {
        let clock = ManualClock::new(t0());
        let resumed = NudgeState {
            nudge_level: NudgeLevel::Awareness,
            nudge_count: 2,
            last_nudge_time: Some(t0() - Duration::minutes(30)),
        };
        let mut engine = engine(&clock).with_nudge_state(resumed);

        let analysis = engine.analyze_session(&doomscroll("s1", 10.0));
        assert!(matches!(
            analysis.nudge,
            NudgeOutcome::Fired { level: NudgeLevel::Suggestion, nudge_count: 3, .. }
        ));
        assert_eq!(engine.nudge_state().nudge_level, NudgeLevel::Suggestion);
    }

    #[test]
    fn test_resumed_nudge_state_keeps_cooldown() {
        let clock = ManualClock::new(t0());
        let resumed = NudgeState {
            nudge_level: NudgeLevel::Awareness,
            nudge_count: 1,
            last_nudge_time: Some(t0() - Duration::minutes(2)),
        };
        let mut engine = engine(&clock).with_nudge_state(resumed);

        let analysis = engine.analyze_session(&doomscroll("s1", 10.0));
        assert!(matches!(analysis.nudge, NudgeOutcome::CoolingDown { .. }));
        assert_eq!(engine.nudge_state().nudge_count, 1);
    }

    #[test]
    fn test_reset_session_clears_window_and_throttle() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);

        assert!(engine.ingest(&doomscroll("s1", 3.0)).is_some());
        assert!(engine.ingest(&doomscroll("s2", 3.0)).is_some());
        assert_eq!(engine.session_count(), 2);

        engine.reset_session("s1");
        assert_eq!(engine.session_count(), 1);
        assert!(engine.aggregator.window("s1").is_none());
        assert!(engine.aggregator.window("s2").is_some());

        // No interval has passed, yet the reset session is evaluated again
        clock.advance(Duration::seconds(10));
        assert!(engine.ingest(&doomscroll("s1", 3.2)).is_some());
        assert!(engine.ingest(&doomscroll("s2", 3.2)).is_none());
    }

    #[test]
    fn test_idle_sessions_are_evicted_when_configured() {
        let clock = ManualClock::new(t0());
        let config = EngineConfig {
            session_idle_ttl_minutes: Some(30.0),
            ..Default::default()
        };
        let mut engine = DoomscrollEngine::with_clock(config, clock.clone()).unwrap();

        engine.analyze_session(&doomscroll("old", 1.0));
        clock.advance(Duration::minutes(20));
        engine.analyze_session(&doomscroll("new", 1.0));
        assert_eq!(engine.session_count(), 2);

        clock.advance(Duration::minutes(15));
        assert_eq!(engine.evict_idle_sessions(), 1);
        assert_eq!(engine.session_count(), 1);
    }

    #[test]
    fn test_sessions_never_evicted_by_default() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);

        engine.analyze_session(&doomscroll("s1", 1.0));
        clock.advance(Duration::days(3));
        assert_eq!(engine.evict_idle_sessions(), 0);
        assert_eq!(engine.session_count(), 1);
    }

    #[test]
    fn test_process_json() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);

        let json = r#"{
            "sessionId": "session_1705327200000_abc",
            "currentContext": "homepage",
            "totalScrollDistance": 200000,
            "videoClicks": 0,
            "shortsClicks": 0,
            "sessionDuration": 600000
        }"#;
        let output = engine.process_json(json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["session_id"], "session_1705327200000_abc");
        assert_eq!(value["context"], "homepage");
        assert_eq!(value["is_doomscrolling"], true);
        assert_eq!(value["nudge"]["outcome"], "fired");
        assert_eq!(value["nudge"]["action"]["type"], "awareness");
    }

    #[test]
    fn test_process_json_rejects_garbage() {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock);
        let err = engine.process_json("not valid json").unwrap_err();
        assert!(matches!(err, EngineError::ParseError(_)));
        assert_eq!(
            err.to_string().matches("Failed to parse session snapshot").count(),
            1
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            window_decay: 2.0,
            ..Default::default()
        };
        assert!(DoomscrollEngine::new(config).is_err());
    }
}
