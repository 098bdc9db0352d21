//! Threshold rules with hysteresis

use super::ClassifierInput;
use crate::types::RuleSignals;

const LONG_DURATION_MINUTES: f64 = 7.5;
const HIGH_SCROLL_DISTANCE: f64 = 10_000.0;
const LOW_ENGAGEMENT_SCORE: f64 = 0.5;
const FAST_SCROLL_INTENSITY: f64 = 2_000.0;
const LOW_CLICK_RATE: f64 = 0.3;
const SHORTS_OVERLOAD_CLICKS: f64 = 18.0;

/// Signals needed to stay "on" once the detector has fired
const STAY_ON_SIGNALS: usize = 2;
/// Signals needed to turn "on" from "off"
const TURN_ON_SIGNALS: usize = 3;

/// Outcome of one rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleDecision {
    pub signals: RuleSignals,
    pub signal_count: usize,
    pub doomscrolling: bool,
}

/// Six fixed threshold signals combined with a hysteresis band
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedSignalDetector;

impl RuleBasedSignalDetector {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate the six signals against their thresholds
    pub fn signals(&self, input: &ClassifierInput<'_>) -> RuleSignals {
        let f = input.features;
        let long_duration = input.raw_duration_minutes > LONG_DURATION_MINUTES;

        RuleSignals {
            long_duration,
            high_scrolling: f.scroll_distance > HIGH_SCROLL_DISTANCE,
            low_engagement: f.engagement_score < LOW_ENGAGEMENT_SCORE,
            fast_scrolling: f.scroll_intensity > FAST_SCROLL_INTENSITY,
            low_click_rate: f.click_rate < LOW_CLICK_RATE && long_duration,
            shorts_overload: input.context.is_shorts_feed()
                && f.shorts_clicks > SHORTS_OVERLOAD_CLICKS,
        }
    }

    /// Evaluate and update the per-session hysteresis memory in place
    pub fn evaluate(&self, input: &ClassifierInput<'_>, hysteresis: &mut bool) -> RuleDecision {
        let signals = self.signals(input);
        let signal_count = signals.count();

        let doomscrolling = if input.context.is_watching_video() {
            false
        } else {
            apply_hysteresis(*hysteresis, signal_count)
        };
        *hysteresis = doomscrolling;

        RuleDecision {
            signals,
            signal_count,
            doomscrolling,
        }
    }
}

/// Lower bar to stay on than to turn on
pub fn apply_hysteresis(previous: bool, signal_count: usize) -> bool {
    if previous {
        signal_count >= STAY_ON_SIGNALS
    } else {
        signal_count >= TURN_ON_SIGNALS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BrowsingContext, FeatureVector};
    use pretty_assertions::assert_eq;

    fn input(features: &FeatureVector, context: BrowsingContext, minutes: f64) -> ClassifierInput<'_> {
        ClassifierInput {
            features,
            context,
            raw_duration_minutes: minutes,
        }
    }

    /// Features with engagement high enough that no signal fires
    fn calm() -> FeatureVector {
        FeatureVector {
            duration_minutes: 1.0,
            scroll_intensity: 100.0,
            click_rate: 5.0,
            engagement_score: 5.0,
            scroll_distance: 100.0,
            shorts_clicks: 0.0,
        }
    }

    #[test]
    fn test_hysteresis_band() {
        assert!(apply_hysteresis(true, 2));
        assert!(!apply_hysteresis(false, 2));
        assert!(apply_hysteresis(false, 3));
        assert!(apply_hysteresis(true, 3));
        assert!(!apply_hysteresis(true, 1));
    }

    #[test]
    fn test_two_signals_keep_but_do_not_start() {
        let detector = RuleBasedSignalDetector::new();
        // high_scrolling + low_engagement
        let features = FeatureVector {
            scroll_distance: 12_000.0,
            engagement_score: 0.2,
            ..calm()
        };
        let inp = input(&features, BrowsingContext::Homepage, 3.0);

        let mut state = false;
        let decision = detector.evaluate(&inp, &mut state);
        assert_eq!(decision.signal_count, 2);
        assert!(!decision.doomscrolling);
        assert!(!state);

        let mut state = true;
        let decision = detector.evaluate(&inp, &mut state);
        assert!(decision.doomscrolling);
        assert!(state);
    }

    #[test]
    fn test_three_signals_start_regardless_of_prior() {
        let detector = RuleBasedSignalDetector::new();
        let features = FeatureVector {
            scroll_distance: 12_000.0,
            engagement_score: 0.2,
            scroll_intensity: 2_500.0,
            ..calm()
        };
        let inp = input(&features, BrowsingContext::Homepage, 3.0);

        for prior in [false, true] {
            let mut state = prior;
            let decision = detector.evaluate(&inp, &mut state);
            assert_eq!(decision.signal_count, 3);
            assert!(decision.doomscrolling);
        }
    }

    #[test]
    fn test_watching_video_forces_false() {
        let detector = RuleBasedSignalDetector::new();
        let features = FeatureVector {
            scroll_distance: 50_000.0,
            engagement_score: 0.0,
            scroll_intensity: 9_000.0,
            click_rate: 0.0,
            ..calm()
        };
        let inp = input(&features, BrowsingContext::WatchingVideo, 30.0);

        let mut state = true;
        let decision = detector.evaluate(&inp, &mut state);
        assert!(decision.signal_count >= 5);
        assert!(!decision.doomscrolling);
        assert!(!state);
    }

    #[test]
    fn test_duration_signals_use_raw_minutes() {
        let detector = RuleBasedSignalDetector::new();
        let features = FeatureVector {
            click_rate: 0.1,
            ..calm()
        };

        let short = detector.signals(&input(&features, BrowsingContext::Other, 7.5));
        assert!(!short.long_duration);
        assert!(!short.low_click_rate);

        let long = detector.signals(&input(&features, BrowsingContext::Other, 8.0));
        assert!(long.long_duration);
        assert!(long.low_click_rate);
    }

    #[test]
    fn test_shorts_overload_only_on_shorts_feed() {
        let detector = RuleBasedSignalDetector::new();
        let features = FeatureVector {
            shorts_clicks: 19.0,
            ..calm()
        };

        assert!(detector
            .signals(&input(&features, BrowsingContext::ShortsFeed, 1.0))
            .shorts_overload);
        assert!(!detector
            .signals(&input(&features, BrowsingContext::Homepage, 1.0))
            .shorts_overload);
    }
}
