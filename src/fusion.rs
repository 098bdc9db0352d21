//! Majority-vote decision fusion
//!
//! Combines the three classifier opinions into one boolean. A quorum of two is
//! required so that no single noisy classifier can trigger an intervention.

use crate::types::{BrowsingContext, ClassifierVotes};

/// Minimum number of agreeing classifiers
pub const QUORUM: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionFusion;

impl DecisionFusion {
    pub fn new() -> Self {
        Self
    }

    /// Apply the context override and return the quorum decision.
    ///
    /// The rule-based vote is cleared in place while a video is playing, so the
    /// returned votes reflect what was actually counted.
    pub fn fuse(&self, votes: &mut ClassifierVotes, context: BrowsingContext) -> bool {
        if context.is_watching_video() {
            votes.rule_based = false;
        }
        majority(votes.rule_based, votes.ml_based, votes.bayes_doom)
    }
}

/// True when at least [`QUORUM`] of the three opinions agree
pub fn majority(rule_based: bool, ml_based: bool, bayes_doom: bool) -> bool {
    [rule_based, ml_based, bayes_doom]
        .iter()
        .filter(|v| **v)
        .count()
        >= QUORUM
}
