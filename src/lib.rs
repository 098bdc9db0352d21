//! Doomscroll Engine - hybrid doomscrolling detection and nudge escalation
//!
//! The engine turns noisy, periodically arriving browsing counters into a stable
//! doomscrolling decision and a bounded, non-flapping sequence of interventions:
//! snapshot → rolling window → classifiers → majority vote → grace gate →
//! escalation controller → nudge action + nudge record.
//!
//! ## Modules
//!
//! - **Aggregation**: decayed per-session rolling windows and derived features
//! - **Classifiers**: rule thresholds with hysteresis, a fixed logistic model, and a
//!   fallback heuristic
//! - **Escalation**: cooldown-gated, ratcheting three-level nudge state machine
//!
//! Capturing raw input events, persisting history, and rendering nudges are left to
//! collaborators behind the traits in [`sink`].

pub mod aggregator;
pub mod classifiers;
pub mod clock;
pub mod config;
pub mod error;
pub mod escalation;
pub mod fusion;
pub mod grace;
pub mod messages;
pub mod pipeline;
pub mod sink;
pub mod throttle;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{EngineError, SinkError};
pub use escalation::{NudgeEscalationController, NudgeState};
pub use pipeline::{parse_snapshot, DoomscrollEngine};
pub use sink::{NudgeHistory, NudgeLogSink, NudgePresenter};
pub use types::{
    BrowsingContext, NudgeAction, NudgeLevel, NudgeLogRecord, NudgeOutcome, SessionAnalysis,
    SessionSnapshot,
};

/// Engine version embedded in CLI reports
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for CLI reports
pub const PRODUCER_NAME: &str = "doomscroll-engine";
