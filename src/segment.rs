//! Segmentation of the recognized/translated stream into sealed segments.
//!
//! The engine owns the pending transcript (the one mutable, not-yet-sealed
//! accumulation) and decides when to seal it into an immutable
//! [`TranscriptionSegment`]. Sealing happens when any of the thresholds
//! trips: sentence cap, maximum pending duration, or sustained silence.
//! Sealed segments are monotonically non-decreasing in start time and never
//! overlap.

use crate::config::SegmentConfig;
use crate::normalize::split_sentences;
use serde::{Deserialize, Serialize};

/// An immutable span of recognized and translated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    pub id: u64,
    /// Seconds from session start.
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
    pub translation: String,
    /// Best-effort speaker tag; "unknown" unless a heuristic applies.
    pub speaker: String,
    /// Mean confidence of the chunks that built this segment.
    pub confidence: f32,
    pub word_count: usize,
    /// True only for the terminal segment sealed on session stop.
    pub is_final: bool,
}

/// Why the pending transcript was sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealReason {
    SentenceCap,
    MaxDuration,
    SustainedSilence,
    /// The normalizer flagged that further accumulation would degrade the
    /// buffer.
    DegenerateBuffer,
    /// Session stop force-finalized the remainder.
    SessionEnd,
}

/// Mutable state for the segment currently being built.
#[derive(Debug, Default)]
struct PendingTranscript {
    text: String,
    translation: String,
    start_secs: Option<f64>,
    word_count: usize,
    confidence_sum: f32,
    chunk_count: u32,
    secondary_votes: u32,
    primary_votes: u32,
}

impl PendingTranscript {
    fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Consumes confirmed text and seals segments.
pub struct SegmentationEngine {
    config: SegmentConfig,
    pending: PendingTranscript,
    next_id: u64,
    /// End offset of the last sealed segment, for the ordering invariant.
    last_end_secs: f64,
    sealed_count: u64,
}

impl SegmentationEngine {
    pub fn new(config: SegmentConfig) -> Self {
        Self {
            config,
            pending: PendingTranscript::default(),
            next_id: 0,
            last_end_secs: 0.0,
            sealed_count: 0,
        }
    }

    /// Appends a confirmed recognized chunk to the pending transcript.
    pub fn append(&mut self, text: &str, confidence: f32, now_secs: f64) {
        if text.trim().is_empty() {
            return;
        }
        if self.pending.start_secs.is_none() {
            self.pending.start_secs = Some(now_secs);
        }
        if !self.pending.text.is_empty() {
            self.pending.text.push(' ');
        }
        self.pending.text.push_str(text.trim());
        self.pending.word_count = self.pending.text.split_whitespace().count();
        self.pending.confidence_sum += confidence;
        self.pending.chunk_count += 1;
    }

    /// Replaces the pending translation (it covers the whole pending text).
    pub fn set_translation(&mut self, translation: &str) {
        self.pending.translation = translation.to_string();
    }

    /// Records which source dominated the chunk's mixed energy, for the
    /// optional speaker heuristic.
    pub fn note_source_dominance(&mut self, secondary_dominant: bool) {
        if secondary_dominant {
            self.pending.secondary_votes += 1;
        } else {
            self.pending.primary_votes += 1;
        }
    }

    /// Current pending recognized text.
    pub fn pending_text(&self) -> &str {
        &self.pending.text
    }

    pub fn pending_is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn sealed_count(&self) -> u64 {
        self.sealed_count
    }

    /// Checks the seal predicate. Any single condition suffices.
    pub fn should_seal(
        &self,
        now_secs: f64,
        sustained_silence_ms: u64,
        degenerate_hint: bool,
    ) -> Option<SealReason> {
        if self.pending.is_empty() {
            return None;
        }
        if degenerate_hint {
            return Some(SealReason::DegenerateBuffer);
        }
        if split_sentences(&self.pending.text).len() >= self.config.max_sentences {
            return Some(SealReason::SentenceCap);
        }
        if let Some(start) = self.pending.start_secs
            && now_secs - start >= self.config.max_duration_secs
        {
            return Some(SealReason::MaxDuration);
        }
        if sustained_silence_ms >= self.config.seal_silence_ms {
            return Some(SealReason::SustainedSilence);
        }
        None
    }

    /// Seals the pending transcript into a segment and resets it.
    ///
    /// Returns `None` when there is nothing to seal. The caller must also
    /// discard upstream audio accumulation so the next segment starts from
    /// clean state.
    pub fn seal(&mut self, now_secs: f64, reason: SealReason) -> Option<TranscriptionSegment> {
        if self.pending.is_empty() {
            return None;
        }

        let pending = std::mem::take(&mut self.pending);
        // Clamp into the ordering invariant: never start before the previous
        // segment ended, never end before starting.
        let start_secs = pending
            .start_secs
            .unwrap_or(self.last_end_secs)
            .max(self.last_end_secs);
        let end_secs = now_secs.max(start_secs);

        let confidence = if pending.chunk_count > 0 {
            pending.confidence_sum / pending.chunk_count as f32
        } else {
            0.0
        };

        let speaker = if self.config.secondary_speaker_tag
            && pending.secondary_votes > pending.primary_votes
        {
            "system".to_string()
        } else {
            "unknown".to_string()
        };

        let segment = TranscriptionSegment {
            id: self.next_id,
            start_secs,
            end_secs,
            text: pending.text,
            translation: pending.translation,
            speaker,
            confidence,
            word_count: pending.word_count,
            is_final: reason == SealReason::SessionEnd,
        };

        self.next_id += 1;
        self.last_end_secs = end_secs;
        self.sealed_count += 1;
        tracing::info!(target: "segment",
            id = segment.id,
            reason = ?reason,
            words = segment.word_count,
            "segment sealed");
        Some(segment)
    }

    /// Force-seals any non-empty remainder as the terminal segment.
    pub fn finalize(&mut self, now_secs: f64) -> Option<TranscriptionSegment> {
        self.seal(now_secs, SealReason::SessionEnd)
    }
}
