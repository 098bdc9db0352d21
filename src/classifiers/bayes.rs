//! Secondary heuristic consulted when the logistic model is unsure

use super::ClassifierInput;

/// Average score at or above which the fallback votes "doomscrolling"
pub const BAYES_DECISION_THRESHOLD: f64 = 0.6;

const FAST_SCROLL_INTENSITY: f64 = 2_000.0;
const LONG_SESSION_MINUTES: f64 = 20.0;
const LOW_ENGAGEMENT_SCORE: f64 = 0.5;

/// Averages three coarse per-feature likelihoods.
///
/// Not a real posterior: each feature contributes a fixed high or low score.
#[derive(Debug, Clone, Copy, Default)]
pub struct BayesianFallbackEstimator;

impl BayesianFallbackEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn posterior(&self, input: &ClassifierInput<'_>) -> f64 {
        let f = input.features;

        let p_scroll = if f.scroll_intensity > FAST_SCROLL_INTENSITY { 0.7 } else { 0.3 };
        let p_duration = if input.raw_duration_minutes > LONG_SESSION_MINUTES { 0.7 } else { 0.3 };
        let p_engagement = if f.engagement_score < LOW_ENGAGEMENT_SCORE { 0.6 } else { 0.4 };

        (p_scroll + p_duration + p_engagement) / 3.0
    }

    pub fn is_doomscrolling(&self, posterior: f64) -> bool {
        posterior >= BAYES_DECISION_THRESHOLD
    }
}
