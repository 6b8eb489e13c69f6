//! Script Segmentation
//!
//! Turns a script into an ordered, bounded list of timed segments. Four modes
//! are supported; the LLM-backed ones always degrade to deterministic
//! duration packing instead of failing.

mod ai;
mod dialogue;
mod engine;
mod expansion;
mod postprocess;
mod strategies;
pub mod text;

pub use dialogue::has_dialogue;
pub use engine::SegmentationEngine;

use serde::{Deserialize, Serialize};

use crate::core::{segments::Segment, TimeSec};

// =============================================================================
// Modes and Styles
// =============================================================================

/// Segmentation strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SegmentationMode {
    /// Equal word chunks, no I/O
    EvenSplit,
    /// Sentence packing against a target duration, no I/O
    Duration,
    /// LLM scene boundaries, falls back to `Duration` with a warning
    Ai,
    /// LLM scene boundaries, falls back to `Duration` silently
    #[default]
    Hybrid,
}

impl SegmentationMode {
    pub fn uses_llm(&self) -> bool {
        matches!(self, SegmentationMode::Ai | SegmentationMode::Hybrid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationMode::EvenSplit => "evenSplit",
            SegmentationMode::Duration => "duration",
            SegmentationMode::Ai => "ai",
            SegmentationMode::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for SegmentationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "evensplit" | "even" => Ok(SegmentationMode::EvenSplit),
            "duration" => Ok(SegmentationMode::Duration),
            "ai" => Ok(SegmentationMode::Ai),
            "hybrid" => Ok(SegmentationMode::Hybrid),
            other => Err(format!("unknown segmentation mode: {other}")),
        }
    }
}

/// Tone used by semantic expansion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionStyle {
    Vivid,
    Emotional,
    Action,
    Atmospheric,
    #[default]
    Balanced,
}

impl ExpansionStyle {
    /// Writing direction handed to the LLM
    pub fn instruction(&self) -> &'static str {
        match self {
            ExpansionStyle::Vivid => {
                "Use concrete, visual detail: colours, textures, light and motion."
            }
            ExpansionStyle::Emotional => {
                "Bring out the characters' feelings through expression, gesture and framing."
            }
            ExpansionStyle::Action => {
                "Emphasise movement, pace and physical action with dynamic camera work."
            }
            ExpansionStyle::Atmospheric => {
                "Focus on mood, weather, ambient sound and the sense of place."
            }
            ExpansionStyle::Balanced => {
                "Balance visual detail, mood and action without overstating any of them."
            }
        }
    }
}

// =============================================================================
// Request
// =============================================================================

/// Caps and targets every segmentation result must satisfy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationConstraints {
    pub max_segments: usize,
    pub max_tokens_per_segment: usize,
    /// Seconds
    pub target_duration: TimeSec,
    /// Seconds
    pub max_duration: TimeSec,
}

impl Default for SegmentationConstraints {
    fn default() -> Self {
        Self {
            max_segments: 20,
            max_tokens_per_segment: 120,
            target_duration: 5.0,
            max_duration: 10.0,
        }
    }
}

impl SegmentationConstraints {
    /// Copy with degenerate values replaced by usable ones
    pub fn sanitized(&self) -> Self {
        let target = if self.target_duration.is_finite() && self.target_duration > 0.0 {
            self.target_duration
        } else {
            Self::default().target_duration
        };
        let max = if self.max_duration.is_finite() {
            self.max_duration.max(target)
        } else {
            target.max(Self::default().max_duration)
        };
        Self {
            max_segments: self.max_segments.max(1),
            max_tokens_per_segment: self.max_tokens_per_segment.max(1),
            target_duration: target,
            max_duration: max,
        }
    }

    /// Words that fit in one target-length segment
    pub fn target_words(&self) -> f64 {
        self.target_duration * text::WORDS_PER_SECOND
    }
}

/// Options for one segmentation call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationOptions {
    pub mode: SegmentationMode,
    pub constraints: SegmentationConstraints,
    pub enable_semantic_expansion: bool,
    pub expansion_style: ExpansionStyle,
    pub enable_dialogue_implantation: bool,
}

impl SegmentationOptions {
    pub fn new(mode: SegmentationMode, constraints: SegmentationConstraints) -> Self {
        Self {
            mode,
            constraints,
            ..Self::default()
        }
    }

    pub fn with_expansion(mut self, style: ExpansionStyle) -> Self {
        self.enable_semantic_expansion = true;
        self.expansion_style = style;
        self
    }

    pub fn with_dialogue(mut self) -> Self {
        self.enable_dialogue_implantation = true;
        self
    }
}

// =============================================================================
// Result
// =============================================================================

/// Category of a non-blocking segmentation warning
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarningKind {
    AiUnavailable,
    AiFailed,
    AiConstraintViolation,
    ExpansionFailed,
    DialogueFailed,
    SegmentSplit,
    SegmentsMerged,
    ConstraintsUnsatisfiable,
    EmptyScript,
}

/// Non-blocking note attached to a segmentation result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationWarning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_index: Option<usize>,
}

impl SegmentationWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            segment_index: None,
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.segment_index = Some(index);
        self
    }
}

/// What actually happened during a segmentation call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationMetadata {
    pub requested_mode: SegmentationMode,
    /// Mode whose output was returned
    pub effective_mode: SegmentationMode,
    pub fell_back: bool,
    pub word_count: usize,
    pub estimated_tokens: usize,
    pub estimated_duration_sec: TimeSec,
    pub expanded_segments: usize,
    pub dialogue_segments: usize,
    pub elapsed_ms: u64,
}

/// Segments plus warnings and metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationResult {
    pub segments: Vec<Segment>,
    pub warnings: Vec<SegmentationWarning>,
    pub metadata: SegmentationMetadata,
}

impl SegmentationResult {
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// Segment text and duration before ids and order are assigned
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SegmentDraft {
    pub text: String,
    pub duration: TimeSec,
}

impl SegmentDraft {
    /// Draft whose duration is estimated from its text
    pub fn estimated(text: String, max_duration: TimeSec) -> Self {
        let duration = text::snap_duration(text::estimate_duration(&text), max_duration);
        Self { text, duration }
    }

    pub fn tokens(&self) -> usize {
        text::estimate_tokens(&self.text)
    }

    pub fn words(&self) -> usize {
        text::word_count(&self.text)
    }
}
