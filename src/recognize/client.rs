//! Caching, deduplicating, filtering wrapper around the recognition service.
//!
//! Everything that protects the external service (and the transcript) from
//! waste lives here: the minimum-size gate, the response cache, in-flight
//! suppression, confidence gating, and hallucination filtering. The raw
//! service is only invoked when all of those let the request through.

use crate::cache::LruCache;
use crate::config::RecognitionConfig;
use crate::error::{Result, TransliveError};
use crate::hash::content_hash;
use crate::recognize::hallucination::HallucinationFilter;
use crate::recognize::service::{RecognitionOutcome, RecognitionService};
use std::collections::HashSet;
use std::sync::Arc;

/// A filtered, confidence-scored transcription for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub text: String,
    /// [0, 1]; 0 for skipped/filtered chunks.
    pub confidence: f32,
    pub language: Option<String>,
}

impl Transcription {
    /// The no-op result used for skipped chunks.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            language: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Confidence assigned when the provider reports no log-probabilities.
const DEFAULT_CONFIDENCE: f32 = 0.8;

/// Pipeline-facing recognition client.
pub struct RecognitionClient {
    service: Arc<dyn RecognitionService>,
    filter: HallucinationFilter,
    cache: LruCache<Transcription>,
    in_flight: HashSet<String>,
    min_chunk_bytes: usize,
    min_confidence: f32,
    language: String,
    timeout_secs: u64,
    cache_hits: u64,
    hallucinations_filtered: u64,
}

impl RecognitionClient {
    pub fn new(
        service: Arc<dyn RecognitionService>,
        config: &RecognitionConfig,
        filter: HallucinationFilter,
    ) -> Self {
        Self {
            service,
            filter,
            cache: LruCache::new(config.cache_capacity),
            in_flight: HashSet::new(),
            min_chunk_bytes: config.min_chunk_bytes,
            min_confidence: config.min_confidence,
            language: config.language.clone(),
            timeout_secs: config.timeout_secs,
            cache_hits: 0,
            hallucinations_filtered: 0,
        }
    }

    /// Transcribes one encoded audio chunk.
    ///
    /// Returns an empty zero-confidence result for undersized chunks,
    /// in-flight duplicates, and filtered output. Timeouts, rate limits,
    /// and rejections surface as typed errors the session treats as
    /// chunk-local.
    pub async fn transcribe(&mut self, audio: &[u8], prompt: Option<&str>) -> Result<Transcription> {
        if audio.len() < self.min_chunk_bytes {
            tracing::debug!(target: "recognize",
                bytes = audio.len(), "chunk below minimum size, skipped");
            return Ok(Transcription::empty());
        }

        let key = content_hash(audio);
        if let Some(cached) = self.cache.get(&key) {
            self.cache_hits += 1;
            tracing::debug!(target: "recognize", key = %key, "recognition cache hit");
            return Ok(cached.clone());
        }
        if self.in_flight.contains(&key) {
            tracing::debug!(target: "recognize", key = %key, "identical request in flight, suppressed");
            return Ok(Transcription::empty());
        }

        self.in_flight.insert(key.clone());
        let language = if self.language == "auto" {
            None
        } else {
            Some(self.language.as_str())
        };
        let outcome = self.service.recognize(audio, language, prompt).await;
        self.in_flight.remove(&key);

        match outcome {
            RecognitionOutcome::Success(raw) => {
                let transcription = self.score_and_filter(raw.text, raw.avg_logprob, raw.language);
                self.cache.insert(key, transcription.clone());
                Ok(transcription)
            }
            RecognitionOutcome::Timeout => Err(TransliveError::RecognitionTimeout {
                seconds: self.timeout_secs,
            }),
            RecognitionOutcome::RateLimited => Err(TransliveError::RateLimited {
                service: "recognition".to_string(),
            }),
            RecognitionOutcome::Rejected { status, message } => {
                Err(TransliveError::RequestRejected { status, message })
            }
        }
    }

    fn score_and_filter(
        &mut self,
        text: String,
        avg_logprob: Option<f32>,
        language: Option<String>,
    ) -> Transcription {
        let confidence = match avg_logprob {
            Some(logprob) => logprob.exp().clamp(0.0, 1.0),
            None => DEFAULT_CONFIDENCE,
        };

        if let Some(kind) = self.filter.check(&text) {
            self.hallucinations_filtered += 1;
            tracing::info!(target: "recognize",
                kind = kind.as_str(), text = %text, "hallucination filtered");
            return Transcription::empty();
        }

        if confidence < self.min_confidence {
            tracing::info!(target: "recognize",
                confidence, text = %text, "below confidence floor, discarded");
            return Transcription::empty();
        }

        Transcription {
            text,
            confidence,
            language,
        }
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn hallucinations_filtered(&self) -> u64 {
        self.hallucinations_filtered
    }
}
