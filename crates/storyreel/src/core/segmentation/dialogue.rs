//! Dialogue Implantation
//!
//! Segments without any spoken line get one short line of character dialogue
//! synthesized by the LLM. Failures leave the segment unchanged.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{SegmentDraft, SegmentationWarning, WarningKind};
use crate::core::ai::{
    complete_with_retry, parse_json_response, AIProvider, CompletionRequest, LlmCallOptions,
};

/// Quoted speech (straight, curly or corner quotes) or a `NAME: line` script cue
static DIALOGUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)"[^"]{2,}"|“[^”]{2,}”|「[^」]+」|^\s*\p{Lu}[\p{Lu}'. -]{1,30}:\s+\S"#)
        .expect("valid regex")
});

const SYSTEM_PROMPT: &str = "You write one line of natural spoken dialogue for a scene. \
Respond with JSON only: {\"speaker\":\"Name\",\"line\":\"What they say\"}";

#[derive(Debug, Deserialize)]
struct DialogueLine {
    speaker: String,
    line: String,
}

/// Whether the text already contains spoken dialogue
pub fn has_dialogue(text: &str) -> bool {
    DIALOGUE_RE.is_match(text)
}

/// Adds a dialogue line to every dialogue-free draft. Returns how many changed.
pub(crate) async fn implant_dialogue(
    provider: &dyn AIProvider,
    drafts: &mut [SegmentDraft],
    max_tokens: usize,
    options: &LlmCallOptions,
    warnings: &mut Vec<SegmentationWarning>,
) -> usize {
    let mut implanted = 0;

    for index in 0..drafts.len() {
        if has_dialogue(&drafts[index].text) {
            continue;
        }

        let context = scene_context(drafts, index);
        let request = CompletionRequest::new(&context)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(options.max_tokens.min(256))
            .with_temperature(options.temperature)
            .with_json_mode();

        let parsed = match complete_with_retry(provider, request, options).await {
            Ok(response) => parse_json_response::<DialogueLine>(&response.text),
            Err(e) => Err(e),
        };

        let line = match parsed {
            Ok(line) => line,
            Err(e) => {
                warn!("Dialogue for segment {} failed: {}", index, e);
                warnings.push(
                    SegmentationWarning::new(
                        WarningKind::DialogueFailed,
                        format!("dialogue implantation failed: {e}"),
                    )
                    .at(index),
                );
                continue;
            }
        };

        let speaker = line.speaker.trim();
        let spoken = line
            .line
            .trim()
            .trim_matches(|c: char| c == '"' || c == '“' || c == '”')
            .trim();
        if speaker.is_empty() || spoken.is_empty() {
            warnings.push(
                SegmentationWarning::new(WarningKind::DialogueFailed, "dialogue line was empty")
                    .at(index),
            );
            continue;
        }

        let candidate = format!("{}\n{}: \"{}\"", drafts[index].text, speaker, spoken);
        if super::text::estimate_tokens(&candidate) > max_tokens {
            warnings.push(
                SegmentationWarning::new(
                    WarningKind::DialogueFailed,
                    format!("dialogue would exceed {max_tokens} tokens, segment unchanged"),
                )
                .at(index),
            );
            continue;
        }

        debug!("Implanted dialogue into segment {}", index);
        drafts[index].text = candidate;
        implanted += 1;
    }

    implanted
}

fn scene_context(drafts: &[SegmentDraft], index: usize) -> String {
    let mut context = String::new();
    if index > 0 {
        context.push_str(&format!("Previous scene: {}\n", drafts[index - 1].text));
    }
    context.push_str(&format!("Scene: {}\n", drafts[index].text));
    if let Some(next) = drafts.get(index + 1) {
        context.push_str(&format!("Next scene: {}\n", next.text));
    }
    context.push_str("\nWrite one line a character in this scene would say.");
    context
}
