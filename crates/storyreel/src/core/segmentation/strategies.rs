//! Deterministic Strategies
//!
//! `evenSplit` and `duration` segmentation. Both always succeed and perform
//! no I/O; `duration` is also the fallback for the LLM-backed modes.

use super::text::{self, split_sentences, split_words_evenly};
use super::{SegmentDraft, SegmentationConstraints};

/// Sentences longer than this multiple of the target are pre-split on words
const OVERSIZED_SENTENCE_FACTOR: f64 = 1.5;

/// Equal word chunks
pub(crate) fn even_split(script: &str, constraints: &SegmentationConstraints) -> Vec<SegmentDraft> {
    let words: Vec<&str> = script.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let estimated = text::estimate_duration_for_words(words.len());
    let by_duration = (estimated / constraints.target_duration).ceil().max(1.0) as usize;
    let count = constraints.max_segments.min(words.len()).min(by_duration).max(1);

    split_words_evenly(&words, count)
        .into_iter()
        .map(|chunk| SegmentDraft::estimated(chunk, constraints.max_duration))
        .collect()
}

/// Greedy sentence packing against cumulative target boundaries.
///
/// Boundary `k` sits at `k * target_words`. When a sentence straddles a
/// boundary the chunk ends before or after it, whichever is closer; ties keep
/// the sentence in the current chunk.
pub(crate) fn duration_split(
    script: &str,
    constraints: &SegmentationConstraints,
) -> Vec<SegmentDraft> {
    let target_words = constraints.target_words().max(1.0);
    let pieces = sentence_pieces(script, target_words);

    let mut drafts = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut emitted = 0usize;
    let mut boundary_index = 1usize;

    let flush = |current: &mut Vec<String>, drafts: &mut Vec<SegmentDraft>| {
        if !current.is_empty() {
            drafts.push(SegmentDraft::estimated(
                current.join(" "),
                constraints.max_duration,
            ));
            current.clear();
        }
    };

    for (piece, words) in pieces {
        let boundary = boundary_index as f64 * target_words;
        let before = emitted as f64;
        let after = (emitted + words) as f64;

        if after < boundary {
            current.push(piece);
            emitted += words;
            continue;
        }

        if !current.is_empty() && (boundary - before) < (after - boundary) {
            flush(&mut current, &mut drafts);
            boundary_index += 1;
            current.push(piece);
            emitted += words;
            if (emitted as f64) >= boundary_index as f64 * target_words {
                flush(&mut current, &mut drafts);
                boundary_index += 1;
            }
        } else {
            current.push(piece);
            emitted += words;
            flush(&mut current, &mut drafts);
            boundary_index += 1;
        }

        // Never leave the next boundary behind the words already emitted.
        while (boundary_index as f64) * target_words <= emitted as f64 {
            boundary_index += 1;
        }
    }
    flush(&mut current, &mut drafts);

    drafts
}

/// Sentences with their word counts, oversized ones pre-split
fn sentence_pieces(script: &str, target_words: f64) -> Vec<(String, usize)> {
    let limit = target_words * OVERSIZED_SENTENCE_FACTOR;
    let mut pieces = Vec::new();

    for sentence in split_sentences(script) {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        if words.len() as f64 > limit {
            let parts = (words.len() as f64 / target_words).ceil().max(1.0) as usize;
            for chunk in split_words_evenly(&words, parts) {
                let count = text::word_count(&chunk);
                pieces.push((chunk, count));
            }
        } else if !words.is_empty() {
            pieces.push((sentence.clone(), words.len()));
        }
    }

    pieces
}
