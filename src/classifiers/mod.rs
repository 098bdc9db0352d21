//! Independent doomscrolling classifiers
//!
//! Three scorers look at the same feature vector and each give a yes/no opinion.
//! None of them can trigger an intervention alone; see [`crate::fusion`].

mod bayes;
mod logistic;
mod rules;

pub use bayes::{BayesianFallbackEstimator, BAYES_DECISION_THRESHOLD};
pub use logistic::{LogisticRegressionScorer, ML_DECISION_THRESHOLD};
pub use rules::{RuleBasedSignalDetector, RuleDecision};

use crate::types::{BrowsingContext, FeatureVector};

/// Everything a classifier may look at for one evaluation
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub features: &'a FeatureVector,
    pub context: BrowsingContext,
    /// Raw (non-decayed) elapsed session minutes
    pub raw_duration_minutes: f64,
}
