//! Pipeline configuration.
//!
//! Every tuning knob the pipeline uses lives here, with defaults drawn from
//! `defaults.rs`. All filter thresholds are configurable: the repetition and
//! hallucination cutoffs were tuned on one language pair and may need
//! adjustment for others.

use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub scheduler: SchedulerConfig,
    pub recognition: RecognitionConfig,
    pub translation: TranslationConfig,
    pub filter: FilterConfig,
    pub segment: SegmentConfig,
}

/// Audio mixing and quality monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Mix gain for the primary (voice) source.
    pub primary_gain: f32,
    /// Mix gain for the secondary (ambient/system) source.
    pub secondary_gain: f32,
    /// RMS volume below which a quality tick counts as silence.
    pub silence_volume_threshold: f32,
    /// Quality sampling tick in milliseconds.
    pub quality_tick_ms: u64,
}

/// Adaptive chunk scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub base_interval_ms: u64,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
}

/// External recognition service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Base URL of the transcription endpoint.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Source language hint; "auto" lets the service detect.
    pub language: String,
    pub timeout_secs: u64,
    /// Encoded chunks smaller than this are skipped without a call.
    pub min_chunk_bytes: usize,
    /// Results below this confidence are discarded as noise.
    pub min_confidence: f32,
    pub cache_capacity: usize,
}

/// External translation service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub target_language: String,
    pub timeout_secs: u64,
    /// Delay after the latest recognition update before translating.
    pub debounce_ms: u64,
    pub cache_capacity: usize,
}

/// Hallucination and repetition filter configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// Stock phrases treated as hallucinations (substring match, lowercased).
    pub hallucination_phrases: Vec<String>,
    /// Filler tokens stripped from utterances (lowercased).
    pub filler_tokens: Vec<String>,
    /// Word-repetition ratio above which text is degenerate.
    pub max_repetition_ratio: f32,
    /// Word-overlap similarity above which sentences count as duplicates.
    pub sentence_similarity_threshold: f32,
    /// Normalized chunk length cap in characters.
    pub max_chunk_chars: usize,
}

/// Segmentation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentConfig {
    pub max_sentences: usize,
    pub max_duration_secs: f64,
    /// Sustained silence that triggers a seal, in milliseconds.
    pub seal_silence_ms: u64,
    /// Tag segments dominated by the secondary source as "system".
    pub secondary_speaker_tag: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            primary_gain: defaults::PRIMARY_GAIN,
            secondary_gain: defaults::SECONDARY_GAIN,
            silence_volume_threshold: defaults::SILENCE_VOLUME_THRESHOLD,
            quality_tick_ms: defaults::QUALITY_TICK_MS,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: defaults::BASE_INTERVAL_MS,
            min_interval_ms: defaults::MIN_INTERVAL_MS,
            max_interval_ms: defaults::MAX_INTERVAL_MS,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "whisper-1".to_string(),
            language: defaults::DEFAULT_SOURCE_LANGUAGE.to_string(),
            timeout_secs: defaults::RECOGNITION_TIMEOUT_SECS,
            min_chunk_bytes: defaults::MIN_CHUNK_BYTES,
            min_confidence: defaults::MIN_CONFIDENCE,
            cache_capacity: defaults::CACHE_CAPACITY,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            target_language: defaults::DEFAULT_TARGET_LANGUAGE.to_string(),
            timeout_secs: defaults::TRANSLATION_TIMEOUT_SECS,
            debounce_ms: defaults::TRANSLATION_DEBOUNCE_MS,
            cache_capacity: defaults::CACHE_CAPACITY,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            hallucination_phrases: defaults::HALLUCINATION_PHRASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            filler_tokens: defaults::FILLER_TOKENS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_repetition_ratio: defaults::MAX_REPETITION_RATIO,
            sentence_similarity_threshold: defaults::SENTENCE_SIMILARITY_THRESHOLD,
            max_chunk_chars: defaults::MAX_CHUNK_CHARS,
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_sentences: defaults::MAX_SENTENCES_PER_SEGMENT,
            max_duration_secs: defaults::MAX_SEGMENT_SECS,
            seal_silence_ms: defaults::SEAL_SILENCE_MS,
            secondary_speaker_tag: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if the file is
    /// missing or unreadable. Parse failures are logged, not fatal.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    tracing::warn!(target: "config",
                        "failed to load config from {}: {}, using defaults",
                        path.display(), e);
                    Self::default()
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - TRANSLIVE_RECOGNITION_API_KEY → recognition.api_key
    /// - TRANSLIVE_TRANSLATION_API_KEY → translation.api_key
    /// - TRANSLIVE_LANGUAGE → recognition.language
    /// - TRANSLIVE_TARGET_LANGUAGE → translation.target_language
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("TRANSLIVE_RECOGNITION_API_KEY")
            && !key.is_empty()
        {
            self.recognition.api_key = key;
        }

        if let Ok(key) = std::env::var("TRANSLIVE_TRANSLATION_API_KEY")
            && !key.is_empty()
        {
            self.translation.api_key = key;
        }

        if let Ok(language) = std::env::var("TRANSLIVE_LANGUAGE")
            && !language.is_empty()
        {
            self.recognition.language = language;
        }

        if let Ok(language) = std::env::var("TRANSLIVE_TARGET_LANGUAGE")
            && !language.is_empty()
        {
            self.translation.target_language = language;
        }

        self
    }

    /// Validate configuration values, returning the first problem found.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::TransliveError;

        if self.audio.sample_rate == 0 {
            return Err(TransliveError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.audio.primary_gain < 0.0 || self.audio.secondary_gain < 0.0 {
            return Err(TransliveError::ConfigInvalidValue {
                key: "audio.primary_gain/secondary_gain".to_string(),
                message: "gains must be non-negative".to_string(),
            });
        }
        if self.scheduler.min_interval_ms > self.scheduler.max_interval_ms {
            return Err(TransliveError::ConfigInvalidValue {
                key: "scheduler.min_interval_ms".to_string(),
                message: "must not exceed max_interval_ms".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.filter.max_repetition_ratio) {
            return Err(TransliveError::ConfigInvalidValue {
                key: "filter.max_repetition_ratio".to_string(),
                message: "must be within [0, 1]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.recognition.min_confidence) {
            return Err(TransliveError::ConfigInvalidValue {
                key: "recognition.min_confidence".to_string(),
                message: "must be within [0, 1]".to_string(),
            });
        }
        if self.segment.max_sentences == 0 {
            return Err(TransliveError::ConfigInvalidValue {
                key: "segment.max_sentences".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn load_parses_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[recognition]\nmodel = \"whisper-large\"\n\n[segment]\nmax_sentences = 5"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.recognition.model, "whisper-large");
        assert_eq!(config.segment.max_sentences, 5);
        // Untouched sections keep defaults
        assert_eq!(config.audio.sample_rate, defaults::SAMPLE_RATE);
    }

    #[test]
    fn load_or_default_returns_defaults_for_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/translive.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_or_default_survives_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not [valid toml").unwrap();
        let config = Config::load_or_default(file.path());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn validate_rejects_inverted_intervals() {
        let mut config = Config::default();
        config.scheduler.min_interval_ms = 6000;
        config.scheduler.max_interval_ms = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_repetition_ratio() {
        let mut config = Config::default();
        config.filter.max_repetition_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_sample_rate() {
        let mut config = Config::default();
        config.audio.sample_rate = 0;
        assert!(config.validate().is_err());
    }
}
