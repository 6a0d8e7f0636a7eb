//! Text normalization and accumulation guards.
//!
//! Applied to every successful recognition before text reaches the pending
//! buffer. Recognizers under poor audio produce pathological repetition
//! ("aaaaaaah", "the the the the"), filler-only utterances, and runaway
//! output length; the normalizer collapses or discards these. The guards
//! then decide whether a cleaned chunk may be appended to the pending
//! buffer at all.

use crate::config::FilterConfig;

/// Marker appended when output is truncated at the length cap.
const ELLIPSIS: &str = "…";

/// Identical-character run length that triggers collapsing.
const CHAR_RUN_LIMIT: usize = 6;

/// Identical-word run length that triggers collapsing.
const WORD_RUN_LIMIT: usize = 4;

/// Verdict on appending a new chunk to the pending buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendVerdict {
    /// Chunk is clean; append it.
    Append,
    /// Chunk is a duplicate or degenerate; drop it, buffer unchanged.
    Skip,
    /// Appending would make the buffer degenerate; drop the chunk and
    /// signal the segmenter to consider sealing.
    SealHint,
}

/// Pure text transform + accumulation guard.
#[derive(Debug, Clone)]
pub struct Normalizer {
    filler_tokens: Vec<String>,
    max_repetition_ratio: f32,
    max_chunk_chars: usize,
}

impl Normalizer {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            filler_tokens: config
                .filler_tokens
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
            max_repetition_ratio: config.max_repetition_ratio,
            max_chunk_chars: config.max_chunk_chars,
        }
    }

    /// Cleans recognized text. Returns `None` when nothing survives.
    pub fn normalize(&self, text: &str) -> Option<String> {
        let collapsed = collapse_char_runs(text.trim(), CHAR_RUN_LIMIT);
        let collapsed = collapse_word_runs(&collapsed, WORD_RUN_LIMIT);

        if collapsed.is_empty() || self.is_filler_only(&collapsed) {
            return None;
        }

        Some(truncate_chars(&collapsed, self.max_chunk_chars))
    }

    /// Decides whether a normalized chunk may join the pending buffer.
    pub fn guard_append(&self, buffer: &str, chunk: &str) -> AppendVerdict {
        if chunk.is_empty() {
            return AppendVerdict::Skip;
        }

        // A chunk already contained in the buffer is recognizer overlap from
        // re-hearing the same audio window, not new speech.
        if !buffer.is_empty()
            && buffer.to_lowercase().contains(&chunk.to_lowercase())
        {
            tracing::debug!(target: "normalize", "chunk is substring of pending buffer, skipped");
            return AppendVerdict::Skip;
        }

        if word_repetition_ratio(chunk) > self.max_repetition_ratio {
            tracing::debug!(target: "normalize", "chunk has abnormal repetition, skipped");
            return AppendVerdict::Skip;
        }

        let combined = if buffer.is_empty() {
            chunk.to_string()
        } else {
            format!("{} {}", buffer, chunk)
        };
        if word_repetition_ratio(&combined) > self.max_repetition_ratio {
            tracing::debug!(target: "normalize",
                "appending would degrade buffer repetition ratio, sealing suggested");
            return AppendVerdict::SealHint;
        }

        AppendVerdict::Append
    }

    /// Strips filler tokens from an utterance, preserving everything else.
    pub fn strip_fillers(&self, text: &str) -> String {
        text.split_whitespace()
            .filter(|word| {
                let bare: String = word
                    .to_lowercase()
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect();
                !self.filler_tokens.contains(&bare)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn is_filler_only(&self, text: &str) -> bool {
        let mut saw_word = false;
        for word in text.split_whitespace() {
            let bare: String = word
                .to_lowercase()
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect();
            if bare.is_empty() {
                continue;
            }
            saw_word = true;
            if !self.filler_tokens.contains(&bare) {
                return false;
            }
        }
        saw_word
    }
}

/// Collapses runs of `limit`+ identical characters down to two.
pub fn collapse_char_runs(text: &str, limit: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run_char: Option<char> = None;
    let mut run_len = 0usize;
    let mut run_buf = String::new();

    let flush = |out: &mut String, ch: char, len: usize, buf: &str| {
        if len >= limit {
            out.push(ch);
            out.push(ch);
        } else {
            out.push_str(buf);
        }
    };

    for ch in text.chars() {
        if Some(ch) == run_char {
            run_len += 1;
            run_buf.push(ch);
        } else {
            if let Some(prev) = run_char {
                flush(&mut out, prev, run_len, &run_buf);
            }
            run_char = Some(ch);
            run_len = 1;
            run_buf.clear();
            run_buf.push(ch);
        }
    }
    if let Some(prev) = run_char {
        flush(&mut out, prev, run_len, &run_buf);
    }
    out
}

/// Collapses runs of `limit`+ identical words (case-insensitive) down to two.
pub fn collapse_word_runs(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut out: Vec<&str> = Vec::with_capacity(words.len());
    let mut i = 0;

    while i < words.len() {
        let current = words[i].to_lowercase();
        let mut run_end = i + 1;
        while run_end < words.len() && words[run_end].to_lowercase() == current {
            run_end += 1;
        }
        let run_len = run_end - i;
        let kept = if run_len >= limit { 2 } else { run_len };
        out.extend(&words[i..i + kept]);
        i = run_end;
    }
    out.join(" ")
}

/// Truncates to at most `max` characters, appending an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Fraction of words that repeat an earlier word, case-insensitive.
///
/// "the the the fine" has 4 words and 2 distinct → ratio 0.5. Empty text
/// scores 0 (never divides by zero).
pub fn word_repetition_ratio(text: &str) -> f32 {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let distinct: std::collections::HashSet<&String> = words.iter().collect();
    1.0 - distinct.len() as f32 / words.len() as f32
}

/// Splits text into sentences on terminal punctuation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?' | '。' | '！' | '？') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// Word-overlap similarity between two sentences, in [0, 1].
///
/// Shared distinct words divided by the larger distinct-word count, so a
/// short echo of a long sentence does not score as a duplicate.
pub fn sentence_similarity(a: &str, b: &str) -> f32 {
    let set_a: std::collections::HashSet<String> = a
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    let set_b: std::collections::HashSet<String> = b
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let common = set_a.intersection(&set_b).count();
    common as f32 / set_a.len().max(set_b.len()) as f32
}
