//! Segmentation Engine
//!
//! Mode dispatch, fallback policy and the optional LLM enrichment passes.
//! Nothing in here returns an error: every LLM problem becomes a warning and
//! the deterministic path takes over.

use std::time::Instant;

use tracing::{info, warn};

use super::ai::{ai_split, AiSplitError};
use super::dialogue::implant_dialogue;
use super::expansion::expand_drafts;
use super::postprocess::enforce_constraints;
use super::strategies::{duration_split, even_split};
use super::text;
use super::{
    SegmentDraft, SegmentationConstraints, SegmentationMetadata, SegmentationMode,
    SegmentationOptions, SegmentationResult, SegmentationWarning, WarningKind,
};
use crate::core::ai::{LlmCallOptions, LlmCapability};
use crate::core::segments::Segment;

/// Stateless segmenter; holds only the LLM call bounds
#[derive(Clone, Debug, Default)]
pub struct SegmentationEngine {
    llm_options: LlmCallOptions,
}

impl SegmentationEngine {
    pub fn new(llm_options: LlmCallOptions) -> Self {
        Self { llm_options }
    }

    /// Segments `script` under `options`.
    ///
    /// `llm` is resolved by the caller once per call; an unavailable
    /// capability behaves exactly like a failing one.
    pub async fn segment(
        &self,
        script: &str,
        options: &SegmentationOptions,
        llm: &LlmCapability,
    ) -> SegmentationResult {
        let started = Instant::now();
        let constraints = options.constraints.sanitized();
        let requested_mode = options.mode;

        let word_count = text::word_count(script);
        let mut metadata = SegmentationMetadata {
            requested_mode,
            effective_mode: requested_mode,
            fell_back: false,
            word_count,
            estimated_tokens: text::tokens_for_words(word_count),
            estimated_duration_sec: text::estimate_duration_for_words(word_count),
            expanded_segments: 0,
            dialogue_segments: 0,
            elapsed_ms: 0,
        };
        let mut warnings = Vec::new();

        if word_count == 0 {
            warnings.push(SegmentationWarning::new(
                WarningKind::EmptyScript,
                "script contains no words",
            ));
            metadata.elapsed_ms = started.elapsed().as_millis() as u64;
            return SegmentationResult {
                segments: Vec::new(),
                warnings,
                metadata,
            };
        }

        let drafts = match requested_mode {
            SegmentationMode::EvenSplit => even_split(script, &constraints),
            SegmentationMode::Duration => duration_split(script, &constraints),
            SegmentationMode::Ai | SegmentationMode::Hybrid => {
                self.llm_or_fallback(
                    script,
                    &constraints,
                    requested_mode,
                    llm,
                    &mut metadata,
                    &mut warnings,
                )
                .await
            }
        };

        let mut drafts = enforce_constraints(drafts, &constraints, &mut warnings);

        if options.enable_semantic_expansion {
            match llm {
                LlmCapability::Available(provider) => {
                    metadata.expanded_segments = expand_drafts(
                        provider.as_ref(),
                        &mut drafts,
                        options.expansion_style,
                        constraints.max_tokens_per_segment,
                        &self.llm_options,
                        &mut warnings,
                    )
                    .await;
                }
                LlmCapability::Unavailable { reason } => warnings.push(SegmentationWarning::new(
                    WarningKind::ExpansionFailed,
                    format!("semantic expansion skipped: {reason}"),
                )),
            }
        }

        if options.enable_dialogue_implantation {
            match llm {
                LlmCapability::Available(provider) => {
                    metadata.dialogue_segments = implant_dialogue(
                        provider.as_ref(),
                        &mut drafts,
                        constraints.max_tokens_per_segment,
                        &self.llm_options,
                        &mut warnings,
                    )
                    .await;
                }
                LlmCapability::Unavailable { reason } => warnings.push(SegmentationWarning::new(
                    WarningKind::DialogueFailed,
                    format!("dialogue implantation skipped: {reason}"),
                )),
            }
        }

        let segments = into_segments(drafts);
        metadata.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            "Segmented {} words into {} segments (requested={}, effective={}, warnings={})",
            word_count,
            segments.len(),
            requested_mode.as_str(),
            metadata.effective_mode.as_str(),
            warnings.len()
        );

        SegmentationResult {
            segments,
            warnings,
            metadata,
        }
    }

    async fn llm_or_fallback(
        &self,
        script: &str,
        constraints: &SegmentationConstraints,
        mode: SegmentationMode,
        llm: &LlmCapability,
        metadata: &mut SegmentationMetadata,
        warnings: &mut Vec<SegmentationWarning>,
    ) -> Vec<SegmentDraft> {
        let (kind, reason) = match llm {
            LlmCapability::Unavailable { reason } => (WarningKind::AiUnavailable, reason.clone()),
            LlmCapability::Available(provider) => {
                match ai_split(provider.as_ref(), script, constraints, &self.llm_options).await {
                    Ok(drafts) => return drafts,
                    Err(e @ AiSplitError::Failed(_)) => (WarningKind::AiFailed, e.to_string()),
                    Err(e @ AiSplitError::Violation(_)) => {
                        (WarningKind::AiConstraintViolation, e.to_string())
                    }
                }
            }
        };

        warn!(
            "LLM segmentation unusable ({}), falling back to duration mode",
            reason
        );
        metadata.fell_back = true;
        metadata.effective_mode = SegmentationMode::Duration;
        if mode == SegmentationMode::Ai {
            warnings.push(SegmentationWarning::new(
                kind,
                format!("AI segmentation fell back to duration mode: {reason}"),
            ));
        }

        duration_split(script, constraints)
    }
}

fn into_segments(drafts: Vec<SegmentDraft>) -> Vec<Segment> {
    let mut segments: Vec<Segment> = drafts
        .into_iter()
        .enumerate()
        .map(|(order, draft)| {
            let mut segment = Segment::new(&draft.text, draft.duration);
            segment.order = order;
            segment
        })
        .collect();

    for i in 0..segments.len() {
        if i > 0 {
            segments[i].previous_segment_id = Some(segments[i - 1].id.clone());
        }
        if i + 1 < segments.len() {
            segments[i].next_segment_id = Some(segments[i + 1].id.clone());
        }
    }

    segments
}
