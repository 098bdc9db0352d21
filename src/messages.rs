//! Nudge payload builders
//!
//! Builds the level-specific actions handed to the presentation collaborator.
//! Nothing here renders anything.

use crate::types::{BrowsingContext, NudgeAction, NudgeType, RuleSignals};

const SHORTS_REDIRECT: [&str; 3] = [
    "Watch a full video instead?",
    "Check your subscriptions",
    "Take a 5-minute break",
];

const SEARCH_PROMPT: [&str; 3] = [
    "Search for something specific?",
    "Browse your Watch Later",
    "Close YouTube for now",
];

const GENERAL_BREAK: [&str; 3] = [
    "Take a short break",
    "Find something specific to watch",
    "Switch to a different activity",
];

/// Round elapsed minutes for display
pub fn rounded_minutes(minutes: f64) -> u32 {
    if minutes.is_finite() && minutes > 0.0 {
        minutes.round() as u32
    } else {
        0
    }
}

/// Level 1: message chosen by the dominant signal
pub fn awareness(signals: &RuleSignals, shorts_clicks: f64, minutes: f64) -> NudgeAction {
    let elapsed = rounded_minutes(minutes);

    let (nudge_type, message) = if signals.shorts_overload {
        (
            NudgeType::ShortsAwareness,
            format!(
                "You've watched {} Shorts in {} minutes. Still enjoying?",
                rounded_minutes(shorts_clicks),
                elapsed
            ),
        )
    } else if signals.low_engagement {
        (
            NudgeType::LowEngagement,
            format!("{} minutes of scrolling. Finding what you need?", elapsed),
        )
    } else {
        (
            NudgeType::TimeAwareness,
            format!("You've been on YouTube for {} minutes.", elapsed),
        )
    };

    NudgeAction::Awareness { message, nudge_type }
}

/// Level 2: three suggestions appropriate to the context
pub fn suggestion(context: BrowsingContext, signals: &RuleSignals, minutes: f64) -> NudgeAction {
    let (nudge_type, suggestions) = if context.is_shorts_feed() {
        (NudgeType::ShortsRedirect, SHORTS_REDIRECT)
    } else if signals.low_engagement {
        (NudgeType::SearchPrompt, SEARCH_PROMPT)
    } else {
        (NudgeType::GeneralBreak, GENERAL_BREAK)
    };

    NudgeAction::Suggestion {
        suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        duration: rounded_minutes(minutes),
        nudge_type,
    }
}

/// Level 3: friction for `duration` minutes, expired by the presenter
pub fn resistance(context: BrowsingContext, minutes: f64) -> NudgeAction {
    NudgeAction::Resistance {
        duration: rounded_minutes(minutes),
        context,
    }
}
