//! Constraint Enforcement
//!
//! Applied to every mode's output: oversized segments are split evenly, then
//! the smallest adjacent pairs are merged until the count cap holds. When both
//! caps cannot hold at once the count cap wins and a warning says so.

use tracing::debug;

use super::text::{max_words_for_tokens, split_words_evenly};
use super::{SegmentDraft, SegmentationConstraints, SegmentationWarning, WarningKind};

pub(crate) fn enforce_constraints(
    drafts: Vec<SegmentDraft>,
    constraints: &SegmentationConstraints,
    warnings: &mut Vec<SegmentationWarning>,
) -> Vec<SegmentDraft> {
    let split = split_oversized(drafts, constraints, warnings);
    merge_to_cap(split, constraints, warnings)
}

fn split_oversized(
    drafts: Vec<SegmentDraft>,
    constraints: &SegmentationConstraints,
    warnings: &mut Vec<SegmentationWarning>,
) -> Vec<SegmentDraft> {
    let max_words = max_words_for_tokens(constraints.max_tokens_per_segment);
    let mut out = Vec::with_capacity(drafts.len());

    for (index, draft) in drafts.into_iter().enumerate() {
        if draft.words() == 0 {
            continue;
        }
        if draft.tokens() <= constraints.max_tokens_per_segment {
            out.push(draft);
            continue;
        }

        let words: Vec<&str> = draft.text.split_whitespace().collect();
        let parts = words.len().div_ceil(max_words);
        let chunks = split_words_evenly(&words, parts);
        warnings.push(
            SegmentationWarning::new(
                WarningKind::SegmentSplit,
                format!(
                    "segment of {} tokens split into {} parts",
                    draft.tokens(),
                    chunks.len()
                ),
            )
            .at(index),
        );

        out.extend(
            chunks
                .into_iter()
                .map(|chunk| SegmentDraft::estimated(chunk, constraints.max_duration)),
        );
    }

    out
}

fn merge_to_cap(
    mut drafts: Vec<SegmentDraft>,
    constraints: &SegmentationConstraints,
    warnings: &mut Vec<SegmentationWarning>,
) -> Vec<SegmentDraft> {
    let cap = constraints.max_segments.max(1);
    if drafts.len() <= cap {
        return drafts;
    }

    let original = drafts.len();
    while drafts.len() > cap {
        let mut best = 0;
        let mut best_words = usize::MAX;
        for i in 0..drafts.len() - 1 {
            let combined = drafts[i].words() + drafts[i + 1].words();
            if combined < best_words {
                best_words = combined;
                best = i;
            }
        }

        let right = drafts.remove(best + 1);
        let left = &mut drafts[best];
        left.text = format!("{} {}", left.text, right.text);
        left.duration = (left.duration + right.duration).min(constraints.max_duration.max(1.0));
    }

    debug!("Merged {} segments down to {}", original, drafts.len());
    warnings.push(SegmentationWarning::new(
        WarningKind::SegmentsMerged,
        format!("merged {} segments down to the limit of {}", original, cap),
    ));

    let oversized = drafts
        .iter()
        .filter(|d| d.tokens() > constraints.max_tokens_per_segment)
        .count();
    if oversized > 0 {
        warnings.push(SegmentationWarning::new(
            WarningKind::ConstraintsUnsatisfiable,
            format!(
                "{} segments exceed {} tokens; the segment limit of {} takes precedence",
                oversized, constraints.max_tokens_per_segment, cap
            ),
        ));
    }

    drafts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(max_segments: usize, max_tokens: usize) -> SegmentationConstraints {
        SegmentationConstraints {
            max_segments,
            max_tokens_per_segment: max_tokens,
            target_duration: 5.0,
            max_duration: 10.0,
        }
    }

    fn draft(words: usize) -> SegmentDraft {
        SegmentDraft::estimated(vec!["w"; words].join(" "), 10.0)
    }

    #[test]
    fn test_within_limits_is_untouched() {
        let mut warnings = Vec::new();
        let drafts = vec![draft(10), draft(12)];
        let out = enforce_constraints(drafts.clone(), &constraints(5, 100), &mut warnings);
        assert_eq!(out, drafts);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_oversized_segment_is_split_evenly() {
        let mut warnings = Vec::new();
        // 40 tokens cap -> 30 words per part; 70 words -> 3 parts.
        let out = enforce_constraints(vec![draft(70)], &constraints(10, 40), &mut warnings);
        let sizes: Vec<usize> = out.iter().map(|d| d.words()).collect();
        assert_eq!(sizes, vec![24, 23, 23]);
        assert!(out.iter().all(|d| d.tokens() <= 40));
        assert_eq!(warnings[0].kind, WarningKind::SegmentSplit);
        assert_eq!(warnings[0].segment_index, Some(0));
    }

    #[test]
    fn test_smallest_adjacent_pair_merged_first() {
        let mut warnings = Vec::new();
        let drafts = vec![draft(10), draft(2), draft(3), draft(9)];
        let out = enforce_constraints(drafts, &constraints(3, 100), &mut warnings);
        let sizes: Vec<usize> = out.iter().map(|d| d.words()).collect();
        assert_eq!(sizes, vec![10, 5, 9]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::SegmentsMerged);
    }

    #[test]
    fn test_count_cap_wins_over_token_cap() {
        let mut warnings = Vec::new();
        let drafts = vec![draft(20), draft(20), draft(20)];
        let out = enforce_constraints(drafts, &constraints(1, 30), &mut warnings);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].words(), 60);
        assert!(warnings
            .iter()
            .any(|w| w.kind == WarningKind::ConstraintsUnsatisfiable));
    }

    #[test]
    fn test_empty_drafts_dropped() {
        let mut warnings = Vec::new();
        let drafts = vec![
            SegmentDraft {
                text: "  ".to_string(),
                duration: 1.0,
            },
            draft(4),
        ];
        let out = enforce_constraints(drafts, &constraints(5, 100), &mut warnings);
        assert_eq!(out.len(), 1);
    }
}
