//! Error types for the doomscroll engine

use thiserror::Error;

/// Errors surfaced by the JSON and configuration entry points.
///
/// The decision pipeline itself never fails; these only come from parsing input,
/// validating configuration, or encoding output.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse session snapshot: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Collaborator failure: {0}")]
    Sink(#[from] SinkError),
}

/// Failures reported by presentation and nudge-log collaborators
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Presentation collaborator unavailable: {0}")]
    PresenterUnavailable(String),

    #[error("Nudge log write failed: {0}")]
    WriteFailed(String),

    #[error("Nudge log receiver disconnected")]
    Disconnected,
}
