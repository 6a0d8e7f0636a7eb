//! Default tuning constants for translive.
//!
//! This module provides shared constants used across the configuration types
//! to ensure consistency and eliminate duplication. Most of these are
//! empirically tuned starting points and are overridable through `Config`.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Default gain applied to the primary (voice) source when mixing.
pub const PRIMARY_GAIN: f32 = 1.0;

/// Default gain applied to the secondary (ambient/system) source.
///
/// Kept below the primary gain so background audio never drowns the speaker.
pub const SECONDARY_GAIN: f32 = 0.6;

/// Quality sampling tick in milliseconds.
///
/// The quality monitor scores the mixed stream once per tick; the scheduler
/// reads the rolling window of these scores when recomputing its interval.
pub const QUALITY_TICK_MS: u64 = 500;

/// Number of quality samples retained in the rolling window.
pub const QUALITY_WINDOW: usize = 12;

/// RMS volume below which a quality tick counts as silence.
pub const SILENCE_VOLUME_THRESHOLD: f32 = 0.01;

/// Base scheduling interval in milliseconds before adaptation.
pub const BASE_INTERVAL_MS: u64 = 2000;

/// Hard floor for the adaptive scheduling interval.
pub const MIN_INTERVAL_MS: u64 = 1000;

/// Hard ceiling for the adaptive scheduling interval.
pub const MAX_INTERVAL_MS: u64 = 5000;

/// Minimum encoded chunk size in bytes worth sending to recognition.
///
/// Anything smaller is a fraction of a syllable; the external service tends
/// to hallucinate on such windows, so they are skipped outright.
pub const MIN_CHUNK_BYTES: usize = 1024;

/// Recognition request timeout in seconds.
pub const RECOGNITION_TIMEOUT_SECS: u64 = 30;

/// Translation request timeout in seconds.
pub const TRANSLATION_TIMEOUT_SECS: u64 = 20;

/// Debounce delay for translation after the latest recognition update.
pub const TRANSLATION_DEBOUNCE_MS: u64 = 700;

/// Bounded capacity for the recognition and translation response caches.
pub const CACHE_CAPACITY: usize = 24;

/// Minimum recognition confidence to keep a result.
///
/// Confidence is mapped from provider log-probabilities into [0, 1]; below
/// this the text is treated as noise and discarded.
pub const MIN_CONFIDENCE: f32 = 0.35;

/// Word-repetition ratio above which recognized text is considered degenerate.
pub const MAX_REPETITION_RATIO: f32 = 0.55;

/// Word-overlap similarity above which two sentences count as duplicates.
pub const SENTENCE_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Maximum normalized chunk length in characters before truncation.
pub const MAX_CHUNK_CHARS: usize = 500;

/// Maximum sentences accumulated before a segment is sealed.
pub const MAX_SENTENCES_PER_SEGMENT: usize = 3;

/// Maximum pending duration in seconds before a segment is sealed.
pub const MAX_SEGMENT_SECS: f64 = 25.0;

/// Sustained silence in milliseconds that triggers a segment seal.
pub const SEAL_SILENCE_MS: u64 = 2000;

/// Default source language code ("auto" lets the recognizer detect).
pub const DEFAULT_SOURCE_LANGUAGE: &str = "auto";

/// Default target language code for translation.
pub const DEFAULT_TARGET_LANGUAGE: &str = "en";

/// Stock phrases recognizers emit on silence or music, lowercased.
///
/// These are the classic training-data artifacts: channel sign-offs,
/// subscription bait, subtitle credits. Matching is substring-based against
/// lowercased output.
pub const HALLUCINATION_PHRASES: &[&str] = &[
    "thanks for watching",
    "thank you for watching",
    "please subscribe",
    "like and subscribe",
    "see you in the next video",
    "subtitles by",
    "www.",
    "http://",
    "https://",
    ".com",
    ".org",
];

/// Filler tokens stripped before accumulation and translation, lowercased.
pub const FILLER_TOKENS: &[&str] = &[
    "um", "umm", "uh", "uhh", "er", "err", "ah", "ahh", "hmm", "hm", "mmm",
];
