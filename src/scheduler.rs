//! Adaptive chunk scheduling.
//!
//! The scheduler decides how long to wait between recognition cycles. Quiet,
//! clean audio is sampled less often; noisy or silence-heavy audio more
//! often, to catch speech boundaries quickly. External recognition calls are
//! costly and error-prone on very short or very quiet windows, so the
//! interval adapts instead of being fixed:
//!
//! ```text
//! interval = clamp(base * quality_mult * silence_mult, min, max)
//! quality_mult = 1.3 if quality > 0.8, 0.7 if quality < 0.3, else 1.0
//! silence_mult = 1.5 if silence_ratio > 0.7, 0.8 if silence_ratio < 0.2, else 1.0
//! ```
//!
//! A rate-limited cycle doubles the next interval (still capped) instead of
//! retrying immediately.

use crate::config::SchedulerConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of time, injectable for tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real system clock using `std::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Elapsed recording time below which the silence ratio defaults to 0.5.
const SILENCE_RATIO_WARMUP: Duration = Duration::from_secs(5);

/// Scheduler lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Scheduled,
    Processing,
    Paused,
    Stopped,
}

/// Drives the interval between recognition cycles.
pub struct AdaptiveScheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    phase: SchedulerPhase,
    recording_start: Option<Instant>,
    /// When the current run of silence began, if one is ongoing.
    silence_start: Option<Instant>,
    /// Total silence observed over completed silence runs.
    accumulated_silence: Duration,
    current_interval: Duration,
    rate_limit_penalty: bool,
}

impl AdaptiveScheduler {
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let base = Duration::from_millis(config.base_interval_ms);
        Self {
            config,
            clock,
            phase: SchedulerPhase::Idle,
            recording_start: None,
            silence_start: None,
            accumulated_silence: Duration::ZERO,
            current_interval: base,
            rate_limit_penalty: false,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Interval to sleep before the next cycle.
    pub fn interval(&self) -> Duration {
        self.current_interval
    }

    /// Idle -> Scheduled; marks the start of recording time.
    pub fn start(&mut self) {
        if self.phase == SchedulerPhase::Idle {
            self.recording_start = Some(self.clock.now());
            self.phase = SchedulerPhase::Scheduled;
        }
    }

    /// Scheduled -> Processing. Returns false when not currently scheduled
    /// (paused or stopped), in which case the cycle must not run.
    pub fn begin_cycle(&mut self) -> bool {
        if self.phase == SchedulerPhase::Scheduled {
            self.phase = SchedulerPhase::Processing;
            true
        } else {
            false
        }
    }

    /// Processing -> Scheduled; recomputes the next interval from the rolling
    /// quality score and the observed silence ratio.
    pub fn complete_cycle(&mut self, quality: f32, rate_limited: bool) {
        if self.phase != SchedulerPhase::Processing {
            return;
        }
        self.rate_limit_penalty = rate_limited;
        self.current_interval = self.compute_interval(quality);
        self.phase = SchedulerPhase::Scheduled;
        tracing::debug!(target: "scheduler",
            quality,
            silence_ratio = self.silence_ratio(),
            rate_limited,
            next_interval_ms = self.current_interval.as_millis() as u64,
            "cycle complete");
    }

    /// Scheduled <-> Paused.
    pub fn pause(&mut self) {
        if self.phase == SchedulerPhase::Scheduled {
            self.phase = SchedulerPhase::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.phase == SchedulerPhase::Paused {
            self.phase = SchedulerPhase::Scheduled;
        }
    }

    /// Any state -> Stopped. Idempotent.
    pub fn stop(&mut self) {
        self.phase = SchedulerPhase::Stopped;
    }

    /// Feeds one quality tick's silence verdict into the ratio tracking.
    pub fn record_silence(&mut self, is_silent: bool) {
        let now = self.clock.now();
        match (is_silent, self.silence_start) {
            (true, None) => self.silence_start = Some(now),
            (false, Some(start)) => {
                self.accumulated_silence += now.duration_since(start);
                self.silence_start = None;
            }
            _ => {}
        }
    }

    /// True while silence is ongoing.
    pub fn is_silent(&self) -> bool {
        self.silence_start.is_some()
    }

    /// Length of the current uninterrupted silence run in milliseconds.
    pub fn sustained_silence_ms(&self) -> u64 {
        self.silence_start
            .map(|start| self.clock.now().duration_since(start).as_millis() as u64)
            .unwrap_or(0)
    }

    /// Fraction of recording time spent in silence.
    ///
    /// Defaults to 0.5 for the first five seconds: too little evidence to
    /// bias the interval either way.
    pub fn silence_ratio(&self) -> f32 {
        let Some(start) = self.recording_start else {
            return 0.5;
        };
        let elapsed = self.clock.now().duration_since(start);
        if elapsed < SILENCE_RATIO_WARMUP {
            return 0.5;
        }

        let mut silence = self.accumulated_silence;
        if let Some(silence_run) = self.silence_start {
            silence += self.clock.now().duration_since(silence_run);
        }
        (silence.as_secs_f32() / elapsed.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Seconds since recording started.
    pub fn elapsed_secs(&self) -> f64 {
        self.recording_start
            .map(|start| self.clock.now().duration_since(start).as_secs_f64())
            .unwrap_or(0.0)
    }

    fn compute_interval(&self, quality: f32) -> Duration {
        let quality_mult = if quality > 0.8 {
            1.3
        } else if quality < 0.3 {
            0.7
        } else {
            1.0
        };

        let ratio = self.silence_ratio();
        let silence_mult = if ratio > 0.7 {
            1.5
        } else if ratio < 0.2 {
            0.8
        } else {
            1.0
        };

        let mut interval_ms =
            self.config.base_interval_ms as f32 * quality_mult * silence_mult;
        if self.rate_limit_penalty {
            interval_ms *= 2.0;
        }

        Duration::from_millis(
            (interval_ms as u64)
                .clamp(self.config.min_interval_ms, self.config.max_interval_ms),
        )
    }
}
