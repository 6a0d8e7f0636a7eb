//! Caching, coalescing, debouncing wrapper around the translation service.
//!
//! Translation requests are debounced with last-write-wins semantics: a
//! request replaces any pending one and restarts the delay, so a burst of
//! recognition updates costs one external call for the final text. The
//! pending slot is polled from the scheduler cycle, which keeps the whole
//! client inside the single-writer model.

use crate::cache::LruCache;
use crate::config::{FilterConfig, TranslationConfig};
use crate::error::{Result, TransliveError};
use crate::hash::text_hash;
use crate::normalize::{sentence_similarity, split_sentences, Normalizer};
use crate::translate::service::{TranslationOutcome, TranslationService};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pipeline-facing translation client.
pub struct TranslationClient {
    service: Arc<dyn TranslationService>,
    normalizer: Normalizer,
    cache: LruCache<String>,
    in_flight: HashSet<String>,
    similarity_threshold: f32,
    source_language: String,
    target_language: String,
    debounce: Duration,
    /// Last-write-wins pending request and its due time.
    pending: Option<(String, Instant)>,
    cache_hits: u64,
}

impl TranslationClient {
    pub fn new(
        service: Arc<dyn TranslationService>,
        config: &TranslationConfig,
        filter: &FilterConfig,
        source_language: String,
    ) -> Self {
        Self {
            service,
            normalizer: Normalizer::new(filter),
            cache: LruCache::new(config.cache_capacity),
            in_flight: HashSet::new(),
            similarity_threshold: filter.sentence_similarity_threshold,
            source_language,
            target_language: config.target_language.clone(),
            debounce: Duration::from_millis(config.debounce_ms),
            pending: None,
            cache_hits: 0,
        }
    }

    /// Schedules `text` for translation, superseding any pending request.
    pub fn schedule(&mut self, text: String, now: Instant) {
        if self.pending.is_some() {
            tracing::debug!(target: "translate", "pending translation superseded");
        }
        self.pending = Some((text, now + self.debounce));
    }

    /// Takes the pending text once its debounce delay has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, due)) if *due <= now => self.pending.take().map(|(text, _)| text),
            _ => None,
        }
    }

    /// Takes the pending text regardless of delay (seal/stop flush).
    pub fn take_pending(&mut self) -> Option<String> {
        self.pending.take().map(|(text, _)| text)
    }

    /// Translates `text` after cleanup, with caching and coalescing.
    ///
    /// Returns `Ok(None)` when cleanup leaves nothing worth translating or
    /// an identical request is already in flight.
    pub async fn translate(&mut self, text: &str) -> Result<Option<String>> {
        let cleaned = self.pre_clean(text);
        if cleaned.is_empty() {
            tracing::debug!(target: "translate", "nothing left after cleanup, skipped");
            return Ok(None);
        }

        let key = text_hash(&cleaned);
        if let Some(cached) = self.cache.get(&key) {
            self.cache_hits += 1;
            tracing::debug!(target: "translate", key = %key, "translation cache hit");
            return Ok(Some(cached.clone()));
        }
        if self.in_flight.contains(&key) {
            tracing::debug!(target: "translate", key = %key, "identical request in flight, suppressed");
            return Ok(None);
        }

        self.in_flight.insert(key.clone());
        let outcome = self
            .service
            .translate(&cleaned, &self.source_language, &self.target_language)
            .await;
        self.in_flight.remove(&key);

        match outcome {
            TranslationOutcome::Success { text: translated } => {
                self.cache.insert(key, translated.clone());
                Ok(Some(translated))
            }
            TranslationOutcome::Timeout => Err(TransliveError::Translation {
                message: "request timed out".to_string(),
            }),
            TranslationOutcome::RateLimited => Err(TransliveError::RateLimited {
                service: "translation".to_string(),
            }),
            TranslationOutcome::Rejected { status, message } => {
                Err(TransliveError::Translation {
                    message: format!("rejected with status {}: {}", status, message),
                })
            }
        }
    }

    /// Removes near-duplicate sentences and filler tokens so degenerate
    /// input never wastes an external call.
    fn pre_clean(&self, text: &str) -> String {
        let sentences = split_sentences(text);
        let mut kept: Vec<String> = Vec::with_capacity(sentences.len());
        for sentence in sentences {
            let duplicate = kept
                .iter()
                .any(|k| sentence_similarity(k, &sentence) > self.similarity_threshold);
            if !duplicate {
                kept.push(sentence);
            }
        }
        self.normalizer.strip_fillers(&kept.join(" "))
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }
}
