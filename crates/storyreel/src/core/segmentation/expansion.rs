//! Semantic Expansion
//!
//! Rewrites segment text into richer visual prompts in a chosen style. A
//! segment whose rewrite fails or outgrows the token cap keeps its original
//! text.

use tracing::{debug, warn};

use super::{ExpansionStyle, SegmentDraft, SegmentationWarning, WarningKind};
use crate::core::ai::{complete_with_retry, AIProvider, CompletionRequest, LlmCallOptions};

const SYSTEM_PROMPT: &str = "You turn script excerpts into prompts for a text-to-video model. \
Describe what the camera sees in one short paragraph. Keep every story fact. \
Reply with the rewritten text only.";

/// Expands each draft in place. Returns how many were rewritten.
pub(crate) async fn expand_drafts(
    provider: &dyn AIProvider,
    drafts: &mut [SegmentDraft],
    style: ExpansionStyle,
    max_tokens: usize,
    options: &LlmCallOptions,
    warnings: &mut Vec<SegmentationWarning>,
) -> usize {
    let mut expanded = 0;

    for (index, draft) in drafts.iter_mut().enumerate() {
        let prompt = format!(
            "Style: {}\nStay under {} words.\n\nText:\n{}",
            style.instruction(),
            super::text::max_words_for_tokens(max_tokens),
            draft.text
        );
        let request = CompletionRequest::new(&prompt)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(options.max_tokens)
            .with_temperature(options.temperature);

        let rewritten = match complete_with_retry(provider, request, options).await {
            Ok(response) => clean_rewrite(&response.text),
            Err(e) => {
                warn!("Expansion of segment {} failed: {}", index, e);
                warnings.push(
                    SegmentationWarning::new(
                        WarningKind::ExpansionFailed,
                        format!("expansion failed, original text kept: {e}"),
                    )
                    .at(index),
                );
                continue;
            }
        };

        if rewritten.is_empty() {
            warnings.push(
                SegmentationWarning::new(
                    WarningKind::ExpansionFailed,
                    "expansion returned no text, original text kept",
                )
                .at(index),
            );
            continue;
        }
        if super::text::estimate_tokens(&rewritten) > max_tokens {
            warnings.push(
                SegmentationWarning::new(
                    WarningKind::ExpansionFailed,
                    format!("expansion exceeded {max_tokens} tokens, original text kept"),
                )
                .at(index),
            );
            continue;
        }

        debug!("Expanded segment {}", index);
        draft.text = rewritten;
        expanded += 1;
    }

    expanded
}

/// Strips code fences and wrapping quotes, collapses whitespace
fn clean_rewrite(text: &str) -> String {
    let unfenced = crate::core::ai::extract_json_payload(text);
    let trimmed = unfenced
        .trim()
        .trim_matches(|c: char| c == '"' || c == '“' || c == '”')
        .trim();
    super::text::normalize_whitespace(trimmed)
}
