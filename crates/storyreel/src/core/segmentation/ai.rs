//! LLM Scene Splitting
//!
//! Asks the LLM for scene boundaries and durations, then checks the answer
//! against the constraints. Any problem is reported to the engine, which
//! falls back to duration packing.

use serde::Deserialize;
use tracing::debug;

use super::text::snap_duration;
use super::{SegmentDraft, SegmentationConstraints};
use crate::core::ai::{
    complete_with_retry, parse_json_response, AIProvider, CompletionRequest, LlmCallOptions,
};
use crate::core::CoreError;

const SYSTEM_PROMPT: &str = r#"You are a storyboard editor for short-form video.
Split the user's script into consecutive scenes, each filmable as one short clip.
Keep the script's wording and order; do not invent content.
Respond with JSON only, shaped as:
{"scenes":[{"text":"...","durationSec":5}]}"#;

/// Why an LLM split was not usable
#[derive(Debug)]
pub(crate) enum AiSplitError {
    /// The call failed or its response could not be parsed
    Failed(CoreError),
    /// The response parsed but broke a constraint
    Violation(String),
}

impl std::fmt::Display for AiSplitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiSplitError::Failed(e) => write!(f, "{e}"),
            AiSplitError::Violation(msg) => f.write_str(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenePlan {
    #[serde(default)]
    scenes: Vec<SceneProposal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneProposal {
    text: String,
    #[serde(default, alias = "duration")]
    duration_sec: Option<f64>,
}

/// Requests and validates an LLM scene split
pub(crate) async fn ai_split(
    provider: &dyn AIProvider,
    script: &str,
    constraints: &SegmentationConstraints,
    options: &LlmCallOptions,
) -> Result<Vec<SegmentDraft>, AiSplitError> {
    let request = CompletionRequest::new(&build_prompt(script, constraints))
        .with_system(SYSTEM_PROMPT)
        .with_max_tokens(options.max_tokens)
        .with_temperature(options.temperature)
        .with_json_mode();

    let response = complete_with_retry(provider, request, options)
        .await
        .map_err(AiSplitError::Failed)?;

    let plan: ScenePlan = parse_json_response(&response.text).map_err(AiSplitError::Failed)?;
    debug!("LLM proposed {} scenes", plan.scenes.len());

    validate_plan(plan, constraints)
}

fn build_prompt(script: &str, constraints: &SegmentationConstraints) -> String {
    format!(
        "Constraints:\n\
         - at most {} scenes\n\
         - at most {} tokens of text per scene\n\
         - target {:.1}s per scene, never more than {:.1}s\n\n\
         Script:\n{}",
        constraints.max_segments,
        constraints.max_tokens_per_segment,
        constraints.target_duration,
        constraints.max_duration,
        script.trim()
    )
}

fn validate_plan(
    plan: ScenePlan,
    constraints: &SegmentationConstraints,
) -> Result<Vec<SegmentDraft>, AiSplitError> {
    let scenes: Vec<SceneProposal> = plan
        .scenes
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();

    if scenes.is_empty() {
        return Err(AiSplitError::Violation("LLM returned no scenes".to_string()));
    }
    if scenes.len() > constraints.max_segments {
        return Err(AiSplitError::Violation(format!(
            "LLM returned {} scenes, limit is {}",
            scenes.len(),
            constraints.max_segments
        )));
    }

    let mut drafts = Vec::with_capacity(scenes.len());
    for (index, scene) in scenes.into_iter().enumerate() {
        let text = super::text::normalize_whitespace(&scene.text);
        let draft = match scene.duration_sec {
            Some(d) if d.is_finite() && d > 0.0 => SegmentDraft {
                duration: snap_duration(d, constraints.max_duration),
                text,
            },
            _ => SegmentDraft::estimated(text, constraints.max_duration),
        };
        if draft.tokens() > constraints.max_tokens_per_segment {
            return Err(AiSplitError::Violation(format!(
                "scene {} has {} tokens, limit is {}",
                index,
                draft.tokens(),
                constraints.max_tokens_per_segment
            )));
        }
        drafts.push(draft);
    }

    Ok(drafts)
}
