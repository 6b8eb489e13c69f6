//! StoryReel Error Definitions
//!
//! Defines error types used throughout the project.

use thiserror::Error;

use super::{Credits, SegmentId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Segment Collection Errors
    // =========================================================================
    #[error("Segment not found: {0}")]
    SegmentNotFound(SegmentId),

    #[error("Segment {0} cannot be edited in its current state ({1})")]
    SegmentLocked(SegmentId, String),

    #[error("Segment collection is held by an active run")]
    CollectionLocked,

    #[error("Invalid state transition for segment {segment_id}: {from} -> {to}")]
    InvalidStateTransition {
        segment_id: SegmentId,
        from: String,
        to: String,
    },

    #[error("Invalid segment position: {0}")]
    InvalidPosition(usize),

    // =========================================================================
    // Cost Errors
    // =========================================================================
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits {
        required: Credits,
        available: Credits,
    },

    // =========================================================================
    // Run Errors
    // =========================================================================
    #[error("Nothing to generate: no enabled segments")]
    NothingToGenerate,

    #[error("Total enabled duration is zero")]
    ZeroDuration,

    #[error("A run is already active")]
    RunAlreadyActive,

    #[error("Run is not halted on a failed segment")]
    RunNotHalted,

    #[error("Run has already finished")]
    RunFinished,

    #[error("Retry limit reached for segment {segment_id} ({attempts} attempts)")]
    RetryLimitExceeded {
        segment_id: SegmentId,
        attempts: u32,
    },

    // =========================================================================
    // Generation Errors
    // =========================================================================
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Content rejected by provider: {0}")]
    ContentRejected(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Frame extraction failed: {0}")]
    FrameExtractionFailed(String),

    // =========================================================================
    // AI Errors
    // =========================================================================
    #[error("AI request failed: {0}")]
    AIRequestFailed(String),

    #[error("AI response could not be parsed: {0}")]
    AIResponseInvalid(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether this error blocks a run before any generation call is made
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            CoreError::NothingToGenerate
                | CoreError::ZeroDuration
                | CoreError::InsufficientCredits { .. }
        )
    }

    /// Short reason string recorded on a failed segment
    pub fn failure_reason(&self) -> String {
        match self {
            CoreError::Timeout(_) => "timeout".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InsufficientCredits {
            required: 120,
            available: 40,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient credits: 120 required, 40 available"
        );
    }

    #[test]
    fn test_preflight_classification() {
        assert!(CoreError::NothingToGenerate.is_preflight());
        assert!(CoreError::ZeroDuration.is_preflight());
        assert!(!CoreError::GenerationFailed("boom".to_string()).is_preflight());
    }

    #[test]
    fn test_timeout_failure_reason() {
        let err = CoreError::Timeout("generation call exceeded 300s".to_string());
        assert_eq!(err.failure_reason(), "timeout");

        let err = CoreError::ContentRejected("nsfw".to_string());
        assert!(err.failure_reason().contains("nsfw"));
    }
}
