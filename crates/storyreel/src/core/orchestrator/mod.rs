//! Generation Orchestrator
//!
//! Generates enabled segments strictly in order, feeding each clip's
//! continuity frame into the next request. A failed segment halts the run
//! until the operator retries or skips it.

mod runner;

pub use runner::GenerationOrchestrator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{
    continuity::DEFAULT_SAMPLE_FRACTION, ClipId, Credits, RunId, SegmentId,
};

/// Appended to the prompt when a continuity frame is attached
pub const DEFAULT_CONTINUITY_INSTRUCTION: &str = "Continue seamlessly from the reference image: \
keep the same characters, setting, lighting and camera framing.";

/// Default per-call generation timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Default retries allowed per segment before skip is the only option
pub const DEFAULT_MAX_RETRIES_PER_SEGMENT: u32 = 3;

// =============================================================================
// Configuration
// =============================================================================

/// Orchestrator configuration
#[derive(Clone, Debug, PartialEq)]
pub struct OrchestratorConfig {
    /// Attach the previous clip's frame to each request
    pub continuity_enabled: bool,
    /// Upper bound on one generation call
    pub call_timeout: Duration,
    /// Operator retries allowed per segment
    pub max_retries_per_segment: u32,
    /// Where in a finished clip the continuity frame is sampled
    pub frame_sample_fraction: f64,
    pub continuity_instruction: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            continuity_enabled: true,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_retries_per_segment: DEFAULT_MAX_RETRIES_PER_SEGMENT,
            frame_sample_fraction: DEFAULT_SAMPLE_FRACTION,
            continuity_instruction: DEFAULT_CONTINUITY_INSTRUCTION.to_string(),
        }
    }
}

// =============================================================================
// Run State
// =============================================================================

/// Run-level state
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    /// Waiting for the operator to retry or skip `segment_id`
    #[serde(rename_all = "camelCase")]
    HaltedOnError {
        segment_id: SegmentId,
        reason: String,
    },
    Completed,
    Aborted,
}

impl RunState {
    /// Whether the run has ended
    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, RunState::HaltedOnError { .. })
    }
}

// =============================================================================
// Events
// =============================================================================

/// Run progress event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    #[serde(rename_all = "camelCase")]
    SegmentStarted {
        segment_id: SegmentId,
        /// 1 for the first attempt
        attempt: u32,
        has_reference: bool,
    },
    #[serde(rename_all = "camelCase")]
    SegmentCompleted {
        segment_id: SegmentId,
        clip_id: ClipId,
    },
    #[serde(rename_all = "camelCase")]
    SegmentFailed {
        segment_id: SegmentId,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    SegmentSkipped { segment_id: SegmentId },
    #[serde(rename_all = "camelCase")]
    FrameCaptured { segment_id: SegmentId, bytes: usize },
    #[serde(rename_all = "camelCase")]
    FrameMissing { segment_id: SegmentId },
    #[serde(rename_all = "camelCase")]
    Progress {
        completed: usize,
        skipped: usize,
        total: usize,
        /// `(completed + skipped) / total`
        fraction: f64,
    },
    #[serde(rename_all = "camelCase")]
    RunFinished { state: RunState, summary: RunSummary },
}

// =============================================================================
// Summary
// =============================================================================

/// Aggregate outcome of a run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: RunId,
    pub completed: usize,
    pub skipped: usize,
    /// Generation attempts that failed, retried ones included
    pub failed: usize,
    pub credits_spent: Credits,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl RunSummary {
    /// `(completed + skipped) / total`, 0 when there is nothing to do
    pub fn progress(&self, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        ((self.completed + self.skipped) as f64 / total as f64).min(1.0)
    }
}

// =============================================================================
// Abort Handle
// =============================================================================

/// Cloneable abort request flag.
///
/// An abort never interrupts an in-flight call; the run stops once it resolves.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    requested: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}
