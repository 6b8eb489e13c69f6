//! Text Metrics
//!
//! Word counts, token and spoken-duration estimates, and sentence splitting.

use crate::core::TimeSec;

/// Spoken words per second (about 150 words per minute)
pub const WORDS_PER_SECOND: f64 = 2.5;

/// Shortest duration assigned to any segment
pub const MIN_SEGMENT_DURATION: TimeSec = 1.0;

const TERMINATORS: &[char] = &['.', '!', '?', '…'];
const CJK_TERMINATORS: &[char] = &['。', '！', '？'];
const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', ']', '」', '』'];

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Token estimate for a word count: `ceil(words * 4 / 3)`
pub fn tokens_for_words(words: usize) -> usize {
    (words * 4).div_ceil(3)
}

pub fn estimate_tokens(text: &str) -> usize {
    tokens_for_words(word_count(text))
}

/// Most words a segment may hold while staying within `max_tokens`
pub fn max_words_for_tokens(max_tokens: usize) -> usize {
    (max_tokens * 3 / 4).max(1)
}

pub fn estimate_duration_for_words(words: usize) -> TimeSec {
    words as f64 / WORDS_PER_SECOND
}

pub fn estimate_duration(text: &str) -> TimeSec {
    estimate_duration_for_words(word_count(text))
}

/// Rounds to the nearest half second and clamps to `[1, max_duration]`
pub fn snap_duration(seconds: TimeSec, max_duration: TimeSec) -> TimeSec {
    let max = max_duration.max(MIN_SEGMENT_DURATION);
    if !seconds.is_finite() {
        return MIN_SEGMENT_DURATION;
    }
    ((seconds * 2.0).round() / 2.0).clamp(MIN_SEGMENT_DURATION, max)
}

/// Collapses runs of whitespace into single spaces
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits text into sentences, keeping terminators.
///
/// Blank lines always end a sentence. Returned sentences have normalized
/// whitespace and are never empty.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for paragraph in paragraphs(text) {
        split_paragraph(&paragraph, &mut sentences);
    }
    sentences
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join(" "));
    }
    out
}

fn split_paragraph(paragraph: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = paragraph.chars().collect();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let cjk = CJK_TERMINATORS.contains(&c);
        if TERMINATORS.contains(&c) || cjk {
            let mut end = i + 1;
            while end < chars.len()
                && (TERMINATORS.contains(&chars[end])
                    || CJK_TERMINATORS.contains(&chars[end])
                    || CLOSERS.contains(&chars[end]))
            {
                end += 1;
            }
            if cjk || end == chars.len() || chars[end].is_whitespace() {
                push_sentence(&chars[start..end], out);
                start = end;
            }
            i = end;
        } else {
            i += 1;
        }
    }

    if start < chars.len() {
        push_sentence(&chars[start..], out);
    }
}

fn push_sentence(chars: &[char], out: &mut Vec<String>) {
    let sentence: String = chars.iter().collect();
    let normalized = normalize_whitespace(&sentence);
    if !normalized.is_empty() {
        out.push(normalized);
    }
}

/// Splits `words` into `parts` chunks whose sizes differ by at most one
pub fn split_words_evenly(words: &[&str], parts: usize) -> Vec<String> {
    let parts = parts.clamp(1, words.len().max(1));
    let base = words.len() / parts;
    let extra = words.len() % parts;

    let mut chunks = Vec::with_capacity(parts);
    let mut cursor = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        if size == 0 {
            continue;
        }
        chunks.push(words[cursor..cursor + size].join(" "));
        cursor += size;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one"), 2);
        assert_eq!(estimate_tokens("one two three"), 4);
        assert_eq!(tokens_for_words(90), 120);
        assert_eq!(max_words_for_tokens(120), 90);
        assert_eq!(max_words_for_tokens(1), 1);
    }

    #[test]
    fn test_duration_estimate() {
        assert!((estimate_duration("a b c d e") - 2.0).abs() < 1e-9);
        assert!((estimate_duration_for_words(25) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_snap_duration() {
        assert!((snap_duration(4.2, 10.0) - 4.0).abs() < 1e-9);
        assert!((snap_duration(4.3, 10.0) - 4.5).abs() < 1e-9);
        assert!((snap_duration(0.2, 10.0) - 1.0).abs() < 1e-9);
        assert!((snap_duration(42.0, 10.0) - 10.0).abs() < 1e-9);
        assert!((snap_duration(f64::NAN, 10.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_sentences_basic() {
        let sentences = split_sentences("The door opens. A man walks in! Is he lost? Maybe");
        assert_eq!(
            sentences,
            vec!["The door opens.", "A man walks in!", "Is he lost?", "Maybe"]
        );
    }

    #[test]
    fn test_split_sentences_keeps_closing_quotes_and_decimals() {
        let sentences = split_sentences("She said \"Run.\" He ran 3.5 miles... Then stopped.");
        assert_eq!(
            sentences,
            vec!["She said \"Run.\"", "He ran 3.5 miles...", "Then stopped."]
        );
    }

    #[test]
    fn test_paragraph_break_ends_sentence() {
        let sentences = split_sentences("A heading without a stop\n\nThe body\ncontinues here.");
        assert_eq!(sentences, vec!["A heading without a stop", "The body continues here."]);
    }

    #[test]
    fn test_cjk_terminators() {
        let sentences = split_sentences("夜が明けた。彼は歩き出した！");
        assert_eq!(sentences, vec!["夜が明けた。", "彼は歩き出した！"]);
    }

    #[test]
    fn test_split_words_evenly() {
        let words: Vec<&str> = "a b c d e f g".split_whitespace().collect();
        let chunks = split_words_evenly(&words, 3);
        assert_eq!(chunks, vec!["a b c", "d e", "f g"]);

        let chunks = split_words_evenly(&words, 10);
        assert_eq!(chunks.len(), 7);

        assert!(split_words_evenly(&[], 3).is_empty());
    }
}
