//! Fixed logistic regression over three standardized features

use super::ClassifierInput;

/// Probability at or above which the model votes "doomscrolling"
pub const ML_DECISION_THRESHOLD: f64 = 0.65;

/// Standardization means for `[scroll_intensity, engagement_score, duration_minutes]`
const SCALER_MEAN: [f64; 3] = [1686.1593, 0.5569846, 23.7];
/// Standardization standard deviations, same feature order
const SCALER_STD: [f64; 3] = [1571.9131, 0.5189293, 13.1061054];

const WEIGHTS: [f64; 3] = [1.60056473, -0.34815377, 2.17577448];
const BIAS: f64 = 0.13098922;

/// Linear model trained offline; coefficients are fixed
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegressionScorer {
    mean: [f64; 3],
    std: [f64; 3],
    weights: [f64; 3],
    bias: f64,
    threshold: f64,
}

impl Default for LogisticRegressionScorer {
    fn default() -> Self {
        Self {
            mean: SCALER_MEAN,
            std: SCALER_STD,
            weights: WEIGHTS,
            bias: BIAS,
            threshold: ML_DECISION_THRESHOLD,
        }
    }
}

impl LogisticRegressionScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probability of doomscrolling in (0, 1)
    pub fn probability(&self, input: &ClassifierInput<'_>) -> f64 {
        let f = input.features;
        let x = [f.scroll_intensity, f.engagement_score, f.duration_minutes];

        let z = x
            .iter()
            .enumerate()
            .fold(self.bias, |z, (i, value)| {
                z + self.weights[i] * standardize(*value, self.mean[i], self.std[i])
            });

        sigmoid(z)
    }

    pub fn is_doomscrolling(&self, probability: f64) -> bool {
        probability >= self.threshold
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

fn standardize(value: f64, mean: f64, std: f64) -> f64 {
    if std > 0.0 {
        (value - mean) / std
    } else {
        0.0
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BrowsingContext, FeatureVector};

    fn score(scroll_intensity: f64, engagement_score: f64, duration_minutes: f64) -> f64 {
        let features = FeatureVector {
            scroll_intensity,
            engagement_score,
            duration_minutes,
            ..Default::default()
        };
        let input = ClassifierInput {
            features: &features,
            context: BrowsingContext::Homepage,
            raw_duration_minutes: duration_minutes,
        };
        LogisticRegressionScorer::new().probability(&input)
    }

    #[test]
    fn test_probability_at_feature_means_is_sigmoid_of_bias() {
        let p = score(SCALER_MEAN[0], SCALER_MEAN[1], SCALER_MEAN[2]);
        assert!((p - sigmoid(BIAS)).abs() < 1e-9);
        assert!(p > 0.5 && p < 0.55);
    }

    #[test]
    fn test_idle_session_scores_low() {
        let p = score(0.0, 0.0, 0.0);
        assert!(p > 0.0);
        assert!(p < 0.05);
        assert!(!LogisticRegressionScorer::new().is_doomscrolling(p));
    }

    #[test]
    fn test_long_fast_session_scores_high() {
        let p = score(4000.0, 0.1, 40.0);
        assert!(p > 0.99);
        assert!(LogisticRegressionScorer::new().is_doomscrolling(p));
    }

    #[test]
    fn test_engagement_lowers_probability() {
        assert!(score(2000.0, 2.0, 20.0) < score(2000.0, 0.1, 20.0));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let scorer = LogisticRegressionScorer::new();
        assert!(scorer.is_doomscrolling(ML_DECISION_THRESHOLD));
        assert!(!scorer.is_doomscrolling(ML_DECISION_THRESHOLD - 1e-9));
    }
}
