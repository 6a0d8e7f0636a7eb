//! Session lifecycle and the per-cycle pipeline.
//!
//! A [`Session`] owns every pipeline component and drives them from a single
//! cooperative loop: exactly one cycle is in flight at a time, so no
//! component needs internal locking and event order matches pipeline order.
//! Each cycle drains the capture sources, mixes and scores the audio,
//! encodes a chunk, runs recognition, feeds the normalizer and segmenter,
//! and polls the debounced translation slot.
//!
//! Provider failures are chunk-local: a timeout, rate limit, or rejection
//! costs that cycle's chunk and surfaces as an `Error` event, nothing more.
//! Only total loss of audio acquisition ends a session.

use crate::audio::mixer::Mixer;
use crate::audio::quality::{QualityMonitor, rms};
use crate::audio::source::{CaptureBackend, SourceManager};
use crate::audio::wav::encode_wav;
use crate::config::Config;
use crate::defaults;
use crate::error::{Result, TransliveError};
use crate::events::{EventBus, PipelineEvent, QualityMetrics, SessionStats};
use crate::normalize::{AppendVerdict, Normalizer};
use crate::recognize::{HallucinationFilter, HttpRecognitionService, RecognitionClient, RecognitionService};
use crate::scheduler::{AdaptiveScheduler, Clock, SchedulerPhase, SystemClock};
use crate::segment::SegmentationEngine;
use crate::translate::{HttpTranslationService, TranslationClient, TranslationService};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Characters of pending text handed to the recognizer as context.
const PROMPT_TAIL_CHARS: usize = 200;

/// Poll interval while paused.
const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Point-in-time view of a session for control surfaces.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub phase: SchedulerPhase,
    pub active_sources: usize,
    pub elapsed_secs: f64,
    pub stats: SessionStats,
}

/// Secondary-source request codes in `SessionControl::secondary`.
const SECONDARY_NONE: u8 = 0;
const SECONDARY_ENABLE: u8 = 1;
const SECONDARY_DISABLE: u8 = 2;

/// Shared control state between a running session and its handles.
#[derive(Debug, Default)]
struct SessionControl {
    stop: AtomicBool,
    /// Desired paused state; the loop converges the scheduler onto it.
    pause: AtomicBool,
    secondary: AtomicU8,
}

/// Cloneable remote control for a session whose [`Session::run`] loop is in
/// flight.
///
/// `run` borrows the session exclusively for its whole lifetime, so live
/// control goes through this handle: commands are atomic flags the loop
/// applies at the top of every iteration and again after each interval
/// sleep.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    control: Arc<SessionControl>,
}

impl SessionHandle {
    pub fn pause(&self) {
        self.control.pause.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.control.pause.store(false, Ordering::SeqCst);
    }

    /// Requests a stop; `run` returns once it has been applied.
    pub fn stop(&self) {
        self.control.stop.store(true, Ordering::SeqCst);
    }

    /// Requests the secondary source be enabled or disabled. A failure to
    /// acquire the device surfaces as an `Error` event.
    pub fn toggle_secondary(&self, enabled: bool) {
        let request = if enabled {
            SECONDARY_ENABLE
        } else {
            SECONDARY_DISABLE
        };
        self.control.secondary.store(request, Ordering::SeqCst);
    }
}

/// One transcription/translation session over a set of audio sources.
pub struct Session {
    config: Config,
    sources: SourceManager,
    mixer: Mixer,
    quality: QualityMonitor,
    scheduler: AdaptiveScheduler,
    recognition: RecognitionClient,
    translation: TranslationClient,
    normalizer: Normalizer,
    segments: SegmentationEngine,
    events: EventBus,
    clock: Arc<dyn Clock>,
    control: Arc<SessionControl>,
    stats: SessionStats,
    secondary_enabled: bool,
    last_quality_emit: Option<Instant>,
}

impl Session {
    /// Builds a session over explicit service implementations.
    ///
    /// Returns the session together with the subscriber end of its event
    /// bus.
    pub fn new(
        config: Config,
        backend: Box<dyn CaptureBackend>,
        recognition: Arc<dyn RecognitionService>,
        translation: Arc<dyn TranslationService>,
    ) -> Result<(Self, crossbeam_channel::Receiver<PipelineEvent>)> {
        Self::with_clock(config, backend, recognition, translation, Arc::new(SystemClock))
    }

    /// Like [`Session::new`] but with an injectable clock.
    pub fn with_clock(
        config: Config,
        backend: Box<dyn CaptureBackend>,
        recognition: Arc<dyn RecognitionService>,
        translation: Arc<dyn TranslationService>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, crossbeam_channel::Receiver<PipelineEvent>)> {
        config.validate()?;
        let (events, rx) = EventBus::new();

        let recognition_client = RecognitionClient::new(
            recognition,
            &config.recognition,
            HallucinationFilter::new(&config.filter),
        );
        let translation_client = TranslationClient::new(
            translation,
            &config.translation,
            &config.filter,
            config.recognition.language.clone(),
        );

        let session = Self {
            sources: SourceManager::new(backend),
            mixer: Mixer::new(config.audio.primary_gain, config.audio.secondary_gain),
            quality: QualityMonitor::new(
                defaults::QUALITY_WINDOW,
                config.audio.silence_volume_threshold,
                Arc::clone(&clock),
            ),
            scheduler: AdaptiveScheduler::new(config.scheduler.clone(), Arc::clone(&clock)),
            recognition: recognition_client,
            translation: translation_client,
            normalizer: Normalizer::new(&config.filter),
            segments: SegmentationEngine::new(config.segment.clone()),
            events,
            clock,
            control: Arc::new(SessionControl::default()),
            stats: SessionStats::default(),
            secondary_enabled: false,
            last_quality_emit: None,
            config,
        };
        Ok((session, rx))
    }

    /// Builds a session against the configured HTTP recognition and
    /// translation endpoints.
    pub fn with_http_services(
        config: Config,
        backend: Box<dyn CaptureBackend>,
    ) -> Result<(Self, crossbeam_channel::Receiver<PipelineEvent>)> {
        let recognition = Arc::new(HttpRecognitionService::new(&config.recognition)?);
        let translation = Arc::new(HttpTranslationService::new(&config.translation)?);
        Self::new(config, backend, recognition, translation)
    }

    /// Acquires audio sources and arms the scheduler.
    ///
    /// When no source at all can be acquired the error propagates and no
    /// source-change event is emitted; the session stays idle.
    pub fn start(&mut self) -> Result<()> {
        if self.scheduler.phase() != SchedulerPhase::Idle {
            return Err(TransliveError::InvalidState {
                operation: "start".to_string(),
            });
        }

        let count = self.sources.acquire_all(self.secondary_enabled)?;
        self.scheduler.start();
        self.events.emit(PipelineEvent::AudioSourceChanged {
            sources: self.sources.snapshots(),
        });
        tracing::info!(target: "session", sources = count, "session started");
        Ok(())
    }

    /// Suspends scheduling. Capture keeps running so resume is gapless.
    pub fn pause(&mut self) {
        self.scheduler.pause();
        tracing::info!(target: "session", "session paused");
    }

    pub fn resume(&mut self) {
        self.scheduler.resume();
        tracing::info!(target: "session", "session resumed");
    }

    /// Stops the session: discards the pending translation request,
    /// force-seals any remaining text, and releases every source.
    /// Idempotent.
    pub fn stop(&mut self) {
        if self.scheduler.phase() == SchedulerPhase::Stopped {
            return;
        }
        self.scheduler.stop();

        // In-flight work is discarded, not awaited.
        self.translation.take_pending();

        let now_secs = self.scheduler.elapsed_secs();
        if let Some(segment) = self.segments.finalize(now_secs) {
            self.stats.segments_sealed += 1;
            self.refresh_stats();
            self.events.emit(PipelineEvent::SegmentCreated {
                segment,
                total_segments: self.segments.sealed_count(),
                stats: self.stats.clone(),
            });
        }

        self.sources.release_all();
        self.quality.reset();
        self.events.emit(PipelineEvent::AudioSourceChanged {
            sources: self.sources.snapshots(),
        });
        tracing::info!(target: "session", "session stopped");
    }

    /// Enables or disables the secondary source. Takes effect immediately
    /// when running, otherwise at the next start.
    pub fn toggle_secondary(&mut self, enabled: bool) -> Result<()> {
        self.secondary_enabled = enabled;
        if self.scheduler.phase() == SchedulerPhase::Idle
            || self.scheduler.phase() == SchedulerPhase::Stopped
        {
            return Ok(());
        }
        if self.sources.toggle_secondary(enabled)? {
            self.events.emit(PipelineEvent::AudioSourceChanged {
                sources: self.sources.snapshots(),
            });
        }
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        let mut stats = self.stats.clone();
        stats.recognition_cache_hits = self.recognition.cache_hits();
        stats.translation_cache_hits = self.translation.cache_hits();
        stats.hallucinations_filtered = self.recognition.hallucinations_filtered();
        SessionStatus {
            phase: self.scheduler.phase(),
            active_sources: self.sources.active_count(),
            elapsed_secs: self.scheduler.elapsed_secs(),
            stats,
        }
    }

    /// Remote control for use while [`Session::run`] holds the session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// Applies commands issued through handles since the last check.
    fn apply_handle_commands(&mut self) {
        match self.control.secondary.swap(SECONDARY_NONE, Ordering::SeqCst) {
            SECONDARY_ENABLE => self.apply_secondary_request(true),
            SECONDARY_DISABLE => self.apply_secondary_request(false),
            _ => {}
        }

        let want_pause = self.control.pause.load(Ordering::SeqCst);
        match (want_pause, self.scheduler.phase()) {
            (true, SchedulerPhase::Scheduled) => self.pause(),
            (false, SchedulerPhase::Paused) => self.resume(),
            _ => {}
        }

        if self.control.stop.swap(false, Ordering::SeqCst) {
            self.stop();
        }
    }

    fn apply_secondary_request(&mut self, enabled: bool) {
        if let Err(e) = self.toggle_secondary(enabled) {
            self.events.emit(PipelineEvent::Error {
                message: e.to_string(),
            });
        }
    }

    /// Drives cycles until the session is stopped.
    ///
    /// Holds the session exclusively for its whole lifetime; concurrent
    /// control (pause, resume, stop, secondary toggle) goes through
    /// [`Session::handle`].
    pub async fn run(&mut self) {
        loop {
            self.apply_handle_commands();
            match self.scheduler.phase() {
                SchedulerPhase::Stopped | SchedulerPhase::Idle => break,
                SchedulerPhase::Paused => {
                    tokio::time::sleep(PAUSE_POLL).await;
                    continue;
                }
                _ => {}
            }

            tokio::time::sleep(self.scheduler.interval()).await;
            // Commands issued during the sleep take effect before the cycle.
            self.apply_handle_commands();
            if self.scheduler.phase() != SchedulerPhase::Scheduled {
                continue;
            }
            if let Err(e) = self.process_cycle().await {
                self.events.emit(PipelineEvent::Error {
                    message: e.to_string(),
                });
                if e.is_session_fatal() {
                    tracing::error!(target: "session", "fatal: {}", e);
                    self.stop();
                    break;
                }
            }
        }
    }

    /// Runs one full pipeline cycle. Public so tests and embedders can
    /// drive the pipeline without the timing loop.
    pub async fn process_cycle(&mut self) -> Result<()> {
        if !self.scheduler.begin_cycle() {
            return Ok(());
        }
        let mut rate_limited = false;
        let mut degenerate_hint = false;

        let drained = self.sources.drain_all();
        let mix = self.mixer.mix(&drained);

        // Score the chunk one quality tick at a time so the configured tick
        // resolution holds even when the cycle interval is much longer.
        let tick_samples = (u64::from(self.config.audio.sample_rate)
            * self.config.audio.quality_tick_ms
            / 1000)
            .max(1) as usize;
        let mut sample = self
            .quality
            .analyze(&mix.samples[..mix.samples.len().min(tick_samples)]);
        self.scheduler.record_silence(self.quality.is_silent());
        if mix.samples.len() > tick_samples {
            for window in mix.samples[tick_samples..].chunks(tick_samples) {
                sample = self.quality.analyze(window);
                self.scheduler.record_silence(self.quality.is_silent());
            }
        }
        for (kind, _) in &drained {
            self.sources.set_quality(*kind, sample.score);
        }
        self.emit_quality(sample.volume, sample.clarity, sample.score);

        let chunk_silent = rms(&mix.samples) < self.config.audio.silence_volume_threshold;
        if !mix.samples.is_empty() && !chunk_silent {
            let wav = encode_wav(
                &mix.samples,
                self.config.audio.sample_rate,
                1,
            );
            let prompt = prompt_tail(self.segments.pending_text());

            match self.recognition.transcribe(&wav, prompt.as_deref()).await {
                Ok(transcription) if !transcription.is_empty() => {
                    if let Some(cleaned) = self.normalizer.normalize(&transcription.text) {
                        match self
                            .normalizer
                            .guard_append(self.segments.pending_text(), &cleaned)
                        {
                            AppendVerdict::Append => {
                                let now_secs = self.scheduler.elapsed_secs();
                                self.segments.append(&cleaned, transcription.confidence, now_secs);
                                self.segments.note_source_dominance(mix.secondary_dominant());
                                self.stats.chunks_processed += 1;
                                self.events.emit(PipelineEvent::TranscriptionUpdate {
                                    text: cleaned,
                                    confidence: transcription.confidence,
                                    timestamp: now_secs,
                                });
                                self.translation.schedule(
                                    self.segments.pending_text().to_string(),
                                    self.clock.now(),
                                );
                            }
                            AppendVerdict::Skip => {}
                            AppendVerdict::SealHint => degenerate_hint = true,
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if matches!(e, TransliveError::RateLimited { .. }) {
                        rate_limited = true;
                    }
                    tracing::warn!(target: "session", "recognition failed: {}", e);
                    self.events.emit(PipelineEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(text) = self.translation.take_due(self.clock.now()) {
            rate_limited |= self.apply_translation(text).await;
        }

        let now_secs = self.scheduler.elapsed_secs();
        if let Some(reason) = self.segments.should_seal(
            now_secs,
            self.scheduler.sustained_silence_ms(),
            degenerate_hint,
        ) {
            // The sealed segment should carry the freshest translation we
            // can get, so flush the debounce slot before sealing.
            if let Some(text) = self.translation.take_pending() {
                rate_limited |= self.apply_translation(text).await;
            }
            if let Some(segment) = self.segments.seal(now_secs, reason) {
                self.sources.discard_buffers();
                self.stats.segments_sealed += 1;
                self.refresh_stats();
                self.events.emit(PipelineEvent::SegmentCreated {
                    segment,
                    total_segments: self.segments.sealed_count(),
                    stats: self.stats.clone(),
                });
            }
        }

        self.scheduler
            .complete_cycle(self.quality.average_score(), rate_limited);
        Ok(())
    }

    /// Translates `text` and applies the result to the pending transcript.
    /// Returns whether the call was rate limited.
    async fn apply_translation(&mut self, text: String) -> bool {
        match self.translation.translate(&text).await {
            Ok(Some(translated)) => {
                self.segments.set_translation(&translated);
                self.events.emit(PipelineEvent::TranslationUpdate {
                    text,
                    translation: translated,
                    timestamp: self.scheduler.elapsed_secs(),
                });
                false
            }
            Ok(None) => false,
            Err(e) => {
                let rate_limited = matches!(e, TransliveError::RateLimited { .. });
                tracing::warn!(target: "session", "translation failed: {}", e);
                self.events.emit(PipelineEvent::Error {
                    message: e.to_string(),
                });
                rate_limited
            }
        }
    }

    fn emit_quality(&mut self, volume: f32, clarity: f32, score: f32) {
        let now = self.clock.now();
        let tick = Duration::from_millis(self.config.audio.quality_tick_ms);
        if let Some(last) = self.last_quality_emit
            && now.duration_since(last) < tick
        {
            return;
        }
        self.last_quality_emit = Some(now);
        self.events.emit(PipelineEvent::AudioQualityUpdate {
            metrics: QualityMetrics {
                volume,
                clarity,
                score,
            },
        });
    }

    fn refresh_stats(&mut self) {
        self.stats.recognition_cache_hits = self.recognition.cache_hits();
        self.stats.translation_cache_hits = self.translation.cache_hits();
        self.stats.hallucinations_filtered = self.recognition.hallucinations_filtered();
    }
}

/// Tail of the pending text handed to the recognizer as a continuation
/// prompt, cut on a char boundary.
fn prompt_tail(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(PROMPT_TAIL_CHARS);
    Some(chars[start..].iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::{BufferFeeder, BufferSource, CaptureSource, SourceKind};
    use crate::recognize::{RecognitionOutcome, RecognizedText};
    use crate::translate::TranslationOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl MockClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            })
        }

        fn advance(&self, duration: Duration) {
            *self.offset.lock().unwrap() += duration;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }
    }

    /// Backend handing out buffer sources and collecting their feeders.
    struct FeederBackend {
        feeders: Arc<Mutex<Vec<BufferFeeder>>>,
        fail_all: bool,
    }

    impl FeederBackend {
        fn new() -> (Self, Arc<Mutex<Vec<BufferFeeder>>>) {
            let feeders = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    feeders: Arc::clone(&feeders),
                    fail_all: false,
                },
                feeders,
            )
        }

        fn failing() -> Self {
            Self {
                feeders: Arc::new(Mutex::new(Vec::new())),
                fail_all: true,
            }
        }
    }

    impl CaptureBackend for FeederBackend {
        fn open(&self, kind: SourceKind) -> Result<Box<dyn CaptureSource>> {
            if self.fail_all {
                return Err(TransliveError::DeviceUnavailable {
                    source_kind: kind.as_str().to_string(),
                    message: "no device".to_string(),
                });
            }
            let source = BufferSource::new();
            self.feeders.lock().unwrap().push(source.feeder());
            Ok(Box::new(source))
        }
    }

    /// Recognition service returning scripted texts in order.
    struct ScriptedRecognition {
        texts: Mutex<Vec<&'static str>>,
        calls: AtomicUsize,
    }

    impl ScriptedRecognition {
        fn new(texts: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                texts: Mutex::new(texts),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RecognitionService for ScriptedRecognition {
        async fn recognize(
            &self,
            _audio: &[u8],
            _language: Option<&str>,
            _prompt: Option<&str>,
        ) -> RecognitionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut texts = self.texts.lock().unwrap();
            let text = if texts.is_empty() { "" } else { texts.remove(0) };
            RecognitionOutcome::Success(RecognizedText {
                text: text.to_string(),
                avg_logprob: Some(-0.1),
                language: Some("en".to_string()),
            })
        }
    }

    struct EchoTranslation;

    #[async_trait]
    impl TranslationService for EchoTranslation {
        async fn translate(&self, text: &str, _source: &str, _target: &str) -> TranslationOutcome {
            TranslationOutcome::Success {
                text: format!("[t] {}", text),
            }
        }
    }

    struct FailingTranslation;

    #[async_trait]
    impl TranslationService for FailingTranslation {
        async fn translate(&self, _text: &str, _source: &str, _target: &str) -> TranslationOutcome {
            TranslationOutcome::Timeout
        }
    }

    fn session_with(
        recognition: Arc<dyn RecognitionService>,
        translation: Arc<dyn TranslationService>,
    ) -> (
        Session,
        crossbeam_channel::Receiver<PipelineEvent>,
        Arc<Mutex<Vec<BufferFeeder>>>,
        Arc<MockClock>,
    ) {
        let (backend, feeders) = FeederBackend::new();
        let clock = MockClock::new();
        let (session, rx) = Session::with_clock(
            Config::default(),
            Box::new(backend),
            recognition,
            translation,
            clock.clone(),
        )
        .unwrap();
        (session, rx, feeders, clock)
    }

    fn speech(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 300.0 * i as f32 / 16000.0).sin())
            .collect()
    }

    fn feed(feeders: &Arc<Mutex<Vec<BufferFeeder>>>, samples: &[f32]) {
        for feeder in feeders.lock().unwrap().iter() {
            feeder.push(samples);
        }
    }

    fn drain(rx: &crossbeam_channel::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        rx.try_iter().collect()
    }

    #[tokio::test]
    async fn failed_acquisition_is_fatal_and_emits_nothing() {
        let (mut session, rx) = Session::new(
            Config::default(),
            Box::new(FeederBackend::failing()),
            ScriptedRecognition::new(vec![]),
            Arc::new(EchoTranslation),
        )
        .unwrap();

        let err = session.start().unwrap_err();
        assert!(err.is_session_fatal());
        assert!(
            drain(&rx).is_empty(),
            "no source event may precede a failed start"
        );
        assert_eq!(session.status().phase, SchedulerPhase::Idle);
    }

    #[tokio::test]
    async fn start_emits_source_snapshot() {
        let (mut session, rx, _, _) = session_with(
            ScriptedRecognition::new(vec![]),
            Arc::new(EchoTranslation),
        );
        session.start().unwrap();

        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            PipelineEvent::AudioSourceChanged { sources } => {
                assert_eq!(sources.len(), 1);
                assert_eq!(sources[0].kind, "primary");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let (mut session, _rx, _, _) = session_with(
            ScriptedRecognition::new(vec![]),
            Arc::new(EchoTranslation),
        );
        session.start().unwrap();
        let err = session.start().unwrap_err();
        assert!(matches!(err, TransliveError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn cycle_emits_transcription_update() {
        let (mut session, rx, feeders, _) = session_with(
            ScriptedRecognition::new(vec!["hello there"]),
            Arc::new(EchoTranslation),
        );
        session.start().unwrap();
        drain(&rx);

        feed(&feeders, &speech(3200));
        session.process_cycle().await.unwrap();

        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::AudioQualityUpdate { .. })));
        let update = events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::TranscriptionUpdate { text, .. } => Some(text.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(update, "hello there");
        assert_eq!(session.status().stats.chunks_processed, 1);
    }

    #[tokio::test]
    async fn silent_cycle_skips_recognition() {
        let recognition = ScriptedRecognition::new(vec!["never"]);
        let (mut session, _rx, feeders, _) =
            session_with(recognition.clone(), Arc::new(EchoTranslation));
        session.start().unwrap();

        feed(&feeders, &vec![0.0f32; 3200]);
        session.process_cycle().await.unwrap();
        assert_eq!(recognition.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn translation_arrives_after_debounce() {
        let (mut session, rx, feeders, clock) = session_with(
            ScriptedRecognition::new(vec!["good morning"]),
            Arc::new(EchoTranslation),
        );
        session.start().unwrap();

        feed(&feeders, &speech(3200));
        session.process_cycle().await.unwrap();
        assert!(
            !drain(&rx)
                .iter()
                .any(|e| matches!(e, PipelineEvent::TranslationUpdate { .. })),
            "translation must wait out the debounce"
        );

        clock.advance(Duration::from_millis(800));
        feed(&feeders, &vec![0.0f32; 1600]);
        session.process_cycle().await.unwrap();

        let translation = drain(&rx).into_iter().find_map(|e| match e {
            PipelineEvent::TranslationUpdate { translation, .. } => Some(translation),
            _ => None,
        });
        assert_eq!(translation.as_deref(), Some("[t] good morning"));
    }

    #[tokio::test]
    async fn translation_failure_keeps_session_alive() {
        let (mut session, rx, feeders, clock) = session_with(
            ScriptedRecognition::new(vec!["still here"]),
            Arc::new(FailingTranslation),
        );
        session.start().unwrap();

        feed(&feeders, &speech(3200));
        session.process_cycle().await.unwrap();
        clock.advance(Duration::from_millis(800));
        feed(&feeders, &vec![0.0f32; 1600]);
        session.process_cycle().await.unwrap();

        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::TranscriptionUpdate { .. })));
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::Error { .. })));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, PipelineEvent::TranslationUpdate { .. })),
            "failed translation must not emit an update"
        );
        assert_ne!(session.status().phase, SchedulerPhase::Stopped);
    }

    #[tokio::test]
    async fn sentence_cap_seals_a_segment() {
        let (mut session, rx, feeders, clock) = session_with(
            ScriptedRecognition::new(vec![
                "First sentence here.",
                "Second sentence now.",
                "Third sentence done.",
            ]),
            Arc::new(EchoTranslation),
        );
        session.start().unwrap();

        for i in 0..3 {
            clock.advance(Duration::from_secs(2));
            // Distinct lengths keep the chunks from cache-colliding.
            let samples: Vec<f32> = speech(3200 + i * 16);
            feed(&feeders, &samples);
            session.process_cycle().await.unwrap();
        }

        let events = drain(&rx);
        let sealed = events.iter().find_map(|e| match e {
            PipelineEvent::SegmentCreated {
                segment,
                total_segments,
                stats,
            } => Some((segment.clone(), *total_segments, stats.clone())),
            _ => None,
        });
        let (segment, total, stats) = sealed.expect("third sentence must seal the segment");
        assert!(segment.text.contains("First sentence here."));
        assert!(segment.text.contains("Third sentence done."));
        assert!(!segment.is_final);
        assert_eq!(total, 1);
        assert_eq!(stats.segments_sealed, 1);
        assert!(session.segments.pending_is_empty(), "buffer resets on seal");
    }

    #[tokio::test]
    async fn stop_force_seals_and_releases_sources() {
        let (mut session, rx, feeders, _) = session_with(
            ScriptedRecognition::new(vec!["unfinished thought"]),
            Arc::new(EchoTranslation),
        );
        session.start().unwrap();
        feed(&feeders, &speech(3200));
        session.process_cycle().await.unwrap();
        drain(&rx);

        session.stop();
        session.stop(); // idempotent

        let events = drain(&rx);
        let segment = events.iter().find_map(|e| match e {
            PipelineEvent::SegmentCreated { segment, .. } => Some(segment.clone()),
            _ => None,
        });
        assert!(segment.unwrap().is_final);
        assert!(events.iter().any(
            |e| matches!(e, PipelineEvent::AudioSourceChanged { sources } if sources.is_empty())
        ));
        assert_eq!(session.status().active_sources, 0);
        assert_eq!(session.status().phase, SchedulerPhase::Stopped);
    }

    #[tokio::test]
    async fn paused_session_skips_cycles() {
        let recognition = ScriptedRecognition::new(vec!["nope"]);
        let (mut session, _rx, feeders, _) =
            session_with(recognition.clone(), Arc::new(EchoTranslation));
        session.start().unwrap();
        session.pause();

        feed(&feeders, &speech(3200));
        session.process_cycle().await.unwrap();
        assert_eq!(recognition.calls.load(Ordering::SeqCst), 0);

        session.resume();
        session.process_cycle().await.unwrap();
        assert_eq!(recognition.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn toggle_secondary_adds_and_removes_source() {
        let (mut session, rx, _, _) = session_with(
            ScriptedRecognition::new(vec![]),
            Arc::new(EchoTranslation),
        );
        session.start().unwrap();
        drain(&rx);

        session.toggle_secondary(true).unwrap();
        let events = drain(&rx);
        match events.last() {
            Some(PipelineEvent::AudioSourceChanged { sources }) => {
                assert_eq!(sources.len(), 2);
            }
            other => panic!("expected source change, got {:?}", other),
        }

        session.toggle_secondary(false).unwrap();
        let events = drain(&rx);
        match events.last() {
            Some(PipelineEvent::AudioSourceChanged { sources }) => {
                assert_eq!(sources.len(), 1);
            }
            other => panic!("expected source change, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn handle_controls_a_running_session() {
        let recognition = ScriptedRecognition::new(vec!["from the loop"]);
        let (mut session, rx, feeders, _) =
            session_with(recognition.clone(), Arc::new(EchoTranslation));
        session.start().unwrap();
        drain(&rx);

        let handle = session.handle();
        handle.pause();
        let task = tokio::spawn(async move {
            session.run().await;
            session
        });

        feed(&feeders, &speech(3200));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            recognition.calls.load(Ordering::SeqCst),
            0,
            "paused loop must not run cycles"
        );

        handle.resume();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(recognition.calls.load(Ordering::SeqCst) >= 1);

        handle.toggle_secondary(true);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(drain(&rx).iter().any(
            |e| matches!(e, PipelineEvent::AudioSourceChanged { sources } if sources.len() == 2)
        ));

        handle.stop();
        let session = task.await.unwrap();
        assert_eq!(session.status().phase, SchedulerPhase::Stopped);
        assert_eq!(session.status().active_sources, 0);
    }

    #[tokio::test]
    async fn quality_ticks_resolve_within_a_cycle() {
        let (mut session, rx, feeders, _) = session_with(
            ScriptedRecognition::new(vec!["trailing silence"]),
            Arc::new(EchoTranslation),
        );
        session.start().unwrap();
        drain(&rx);

        // Loud first half, silent second half: per-tick scoring must surface
        // the trailing silence while the chunk as a whole is still loud
        // enough to recognize.
        let mut samples = speech(8000);
        samples.resize(16000, 0.0);
        feed(&feeders, &samples);
        session.process_cycle().await.unwrap();

        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::TranscriptionUpdate { .. })));
        let metrics = events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::AudioQualityUpdate { metrics } => Some(metrics.clone()),
                _ => None,
            })
            .unwrap();
        assert!(
            metrics.volume < 0.01,
            "last tick of the chunk is silent, got volume {}",
            metrics.volume
        );
    }

    #[test]
    fn prompt_tail_cuts_on_char_boundary() {
        assert_eq!(prompt_tail(""), None);
        assert_eq!(prompt_tail("short"), Some("short".to_string()));

        let long = "ä".repeat(300);
        let tail = prompt_tail(&long).unwrap();
        assert_eq!(tail.chars().count(), PROMPT_TAIL_CHARS);
    }
}
