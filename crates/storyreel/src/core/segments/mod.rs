//! Segment Model
//!
//! A segment is one planned clip. The collection keeps segments ordered and
//! linked to their nearest enabled neighbours; every edit goes through
//! [`SegmentCommand`].

mod collection;
mod commands;
mod shared;

pub use collection::{CollectionSummary, SegmentCollection};
pub use commands::{CommandResult, SegmentCommand, StateChange};
pub use shared::SharedSegments;

use serde::{Deserialize, Serialize};

use crate::core::{new_id, SegmentId, TimeSec};

// =============================================================================
// Generation State
// =============================================================================

/// Per-segment generation state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum GenerationState {
    #[default]
    Idle,
    Queued,
    Generating,
    ExtractingFrame,
    Completed,
    Failed {
        reason: String,
    },
}

impl GenerationState {
    /// Failed state with the given reason
    pub fn failed(reason: impl Into<String>) -> Self {
        GenerationState::Failed {
            reason: reason.into(),
        }
    }

    /// Short label used in logs and errors
    pub fn label(&self) -> &'static str {
        match self {
            GenerationState::Idle => "idle",
            GenerationState::Queued => "queued",
            GenerationState::Generating => "generating",
            GenerationState::ExtractingFrame => "extractingFrame",
            GenerationState::Completed => "completed",
            GenerationState::Failed { .. } => "failed",
        }
    }

    /// Whether the transition `self -> next` is legal
    pub fn can_transition_to(&self, next: &GenerationState) -> bool {
        use GenerationState::*;
        matches!(
            (self, next),
            (Idle, Queued)
                | (Queued, Idle)
                | (Queued, Generating)
                | (Generating, ExtractingFrame)
                | (Generating, Completed)
                | (Generating, Failed { .. })
                | (ExtractingFrame, Completed)
                | (Failed { .. }, Queued)
        )
    }

    /// Segments in these states can no longer be edited
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            GenerationState::Queued
                | GenerationState::Generating
                | GenerationState::ExtractingFrame
                | GenerationState::Completed
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, GenerationState::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, GenerationState::Failed { .. })
    }

    /// Failure reason, if failed
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            GenerationState::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationState::Failed { reason } => write!(f, "failed({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

// =============================================================================
// Captured Frame
// =============================================================================

/// Still frame sampled near the end of a finished clip
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedFrame {
    /// Encoded image bytes
    pub data: Vec<u8>,
    /// MIME type of `data`
    pub mime_type: String,
    /// Sample position within the source clip
    pub at_sec: TimeSec,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl CapturedFrame {
    /// JPEG frame without known dimensions
    pub fn jpeg(data: Vec<u8>, at_sec: TimeSec) -> Self {
        Self {
            data,
            mime_type: "image/jpeg".to_string(),
            at_sec,
            width: None,
            height: None,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// =============================================================================
// Segment
// =============================================================================

/// One planned clip
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: SegmentId,
    /// Prompt text for the scene
    pub text: String,
    /// Position in the collection, contiguous from 0
    pub order: usize,
    /// Seconds
    pub duration: TimeSec,
    pub is_enabled: bool,
    /// Nearest enabled segment with a lower order
    pub previous_segment_id: Option<SegmentId>,
    /// Nearest enabled segment with a higher order
    pub next_segment_id: Option<SegmentId>,
    #[serde(default)]
    pub generation_state: GenerationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_frame: Option<CapturedFrame>,
}

impl Segment {
    /// Creates an enabled, idle segment with a fresh id
    pub fn new(text: &str, duration: TimeSec) -> Self {
        Self {
            id: new_id(),
            text: text.to_string(),
            order: 0,
            duration,
            is_enabled: true,
            previous_segment_id: None,
            next_segment_id: None,
            generation_state: GenerationState::Idle,
            last_frame: None,
        }
    }

    /// Sets a caller-chosen id
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.is_enabled = enabled;
        self
    }

    /// Word count of the prompt text
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Display name used for generated clips, e.g. `segment_003`
    pub fn generation_name(&self) -> String {
        format!("segment_{:03}", self.order + 1)
    }
}
