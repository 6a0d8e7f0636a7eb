//! Hallucination detection for recognizer output.
//!
//! Speech recognizers produce text that was never in the audio: stock
//! phrases learned from captioned videos, token loops, and echoed
//! sentences. These are detected heuristically and treated as empty
//! results, not errors. All cutoffs come from `FilterConfig`; they were
//! tuned on one language pair and are not correctness-critical.

use crate::config::FilterConfig;
use crate::normalize::{sentence_similarity, split_sentences, word_repetition_ratio};

/// Why a piece of text was judged hallucinated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HallucinationKind {
    /// Matched a known promotional/URL-like stock phrase.
    StockPhrase,
    /// Three or more consecutive identical tokens.
    TokenLoop,
    /// Two sentences that are near-duplicates of each other.
    SentenceEcho,
    /// Overall word-repetition ratio above the configured cutoff.
    RepetitionRatio,
}

impl HallucinationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HallucinationKind::StockPhrase => "stock_phrase",
            HallucinationKind::TokenLoop => "token_loop",
            HallucinationKind::SentenceEcho => "sentence_echo",
            HallucinationKind::RepetitionRatio => "repetition_ratio",
        }
    }
}

/// Inspects recognizer output for degenerate patterns.
#[derive(Debug, Clone)]
pub struct HallucinationFilter {
    phrases: Vec<String>,
    max_repetition_ratio: f32,
    similarity_threshold: f32,
}

impl HallucinationFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            phrases: config
                .hallucination_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            max_repetition_ratio: config.max_repetition_ratio,
            similarity_threshold: config.sentence_similarity_threshold,
        }
    }

    /// Returns the first degenerate pattern found, or `None` for clean text.
    pub fn check(&self, text: &str) -> Option<HallucinationKind> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let lower = trimmed.to_lowercase();
        if self.phrases.iter().any(|p| lower.contains(p)) {
            return Some(HallucinationKind::StockPhrase);
        }

        if has_token_loop(trimmed, 3) {
            return Some(HallucinationKind::TokenLoop);
        }

        if self.has_sentence_echo(trimmed) {
            return Some(HallucinationKind::SentenceEcho);
        }

        if word_repetition_ratio(trimmed) > self.max_repetition_ratio {
            return Some(HallucinationKind::RepetitionRatio);
        }

        None
    }

    fn has_sentence_echo(&self, text: &str) -> bool {
        let sentences = split_sentences(text);
        for pair in sentences.windows(2) {
            // Single-word sentences echo legitimately ("Yes. Yes.")
            if pair[0].split_whitespace().count() < 3 {
                continue;
            }
            if sentence_similarity(&pair[0], &pair[1]) > self.similarity_threshold {
                return true;
            }
        }
        false
    }
}

/// True when `min_run` or more consecutive identical tokens appear.
fn has_token_loop(text: &str, min_run: usize) -> bool {
    let mut run = 1usize;
    let mut prev: Option<String> = None;
    for word in text.split_whitespace() {
        let bare: String = word
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        if bare.is_empty() {
            continue;
        }
        if prev.as_deref() == Some(bare.as_str()) {
            run += 1;
            if run >= min_run {
                return true;
            }
        } else {
            run = 1;
            prev = Some(bare);
        }
    }
    false
}
