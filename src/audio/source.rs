//! Audio source acquisition and lifecycle.
//!
//! Capture is abstracted behind two traits so the pipeline core stays
//! platform-independent: a `CaptureBackend` opens sources, a `CaptureSource`
//! produces samples. The cpal backend lives in `audio::capture`; tests and
//! file replay use `BufferSource`.

use crate::error::{Result, TransliveError};
use crate::events::SourceSnapshot;
use std::sync::{Arc, Mutex};

/// Which stream a source captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// The user's voice input.
    Primary,
    /// Optional ambient/system audio.
    Secondary,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Primary => "primary",
            SourceKind::Secondary => "secondary",
        }
    }
}

/// A live capture handle.
///
/// Capture appends into an internal buffer continuously; `drain` hands the
/// accumulated samples over and truncates. Only the scheduler cycle may
/// drain.
pub trait CaptureSource: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    /// Takes all samples buffered since the previous drain.
    fn drain(&mut self) -> Vec<f32>;
    fn is_active(&self) -> bool;
}

/// Opens capture sources for a platform.
pub trait CaptureBackend: Send {
    fn open(&self, kind: SourceKind) -> Result<Box<dyn CaptureSource>>;
}

/// In-memory capture source fed by the caller.
///
/// Used for tests and for replaying pre-recorded audio through the pipeline.
pub struct BufferSource {
    buffer: Arc<Mutex<Vec<f32>>>,
    active: bool,
}

impl BufferSource {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            active: false,
        }
    }

    /// Handle for pushing samples from outside (e.g. a replay thread).
    pub fn feeder(&self) -> BufferFeeder {
        BufferFeeder {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl Default for BufferSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Push side of a [`BufferSource`].
#[derive(Clone)]
pub struct BufferFeeder {
    buffer: Arc<Mutex<Vec<f32>>>,
}

impl BufferFeeder {
    pub fn push(&self, samples: &[f32]) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.extend_from_slice(samples);
        }
    }
}

impl CaptureSource for BufferSource {
    fn start(&mut self) -> Result<()> {
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
        Ok(())
    }

    fn drain(&mut self) -> Vec<f32> {
        match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => Vec::new(),
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

struct ManagedSource {
    kind: SourceKind,
    source: Box<dyn CaptureSource>,
    quality: f32,
}

/// Owns all live capture handles for a session.
///
/// Acquisition failures are per-source: a missing secondary device degrades
/// the session, it does not end it. Only zero acquired sources is fatal.
pub struct SourceManager {
    backend: Box<dyn CaptureBackend>,
    sources: Vec<ManagedSource>,
}

impl SourceManager {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            sources: Vec::new(),
        }
    }

    /// Opens and starts one source. Re-acquiring an already-held kind is a
    /// no-op.
    pub fn acquire(&mut self, kind: SourceKind) -> Result<()> {
        if self.holds(kind) {
            return Ok(());
        }
        let mut source = self.backend.open(kind)?;
        source.start()?;
        self.sources.push(ManagedSource {
            kind,
            source,
            quality: 0.5,
        });
        tracing::info!(target: "audio", source = kind.as_str(), "audio source acquired");
        Ok(())
    }

    /// Acquires the primary source and, when enabled, the secondary.
    ///
    /// Returns how many sources are live. Zero is the one session-fatal
    /// acquisition condition.
    pub fn acquire_all(&mut self, secondary_enabled: bool) -> Result<usize> {
        let mut failures: Vec<String> = Vec::new();

        if let Err(e) = self.acquire(SourceKind::Primary) {
            tracing::warn!(target: "audio", "primary source failed: {}", e);
            failures.push(format!("primary: {}", e));
        }
        if secondary_enabled
            && let Err(e) = self.acquire(SourceKind::Secondary)
        {
            tracing::warn!(target: "audio", "secondary source failed: {}", e);
            failures.push(format!("secondary: {}", e));
        }

        if self.sources.is_empty() {
            return Err(TransliveError::Acquisition {
                message: failures.join("; "),
            });
        }
        Ok(self.sources.len())
    }

    /// Stops and drops one source. Releasing an unheld kind is a no-op.
    pub fn release(&mut self, kind: SourceKind) {
        if let Some(pos) = self.sources.iter().position(|s| s.kind == kind) {
            let mut managed = self.sources.remove(pos);
            if let Err(e) = managed.source.stop() {
                tracing::warn!(target: "audio", source = kind.as_str(), "stop failed: {}", e);
            }
            tracing::info!(target: "audio", source = kind.as_str(), "audio source released");
        }
    }

    /// Stops and drops every source. Idempotent.
    pub fn release_all(&mut self) {
        for kind in [SourceKind::Primary, SourceKind::Secondary] {
            self.release(kind);
        }
    }

    /// Enables or disables the secondary source mid-session.
    ///
    /// Returns true when the set of live sources changed.
    pub fn toggle_secondary(&mut self, enabled: bool) -> Result<bool> {
        let held = self.holds(SourceKind::Secondary);
        if enabled && !held {
            self.acquire(SourceKind::Secondary)?;
            Ok(true)
        } else if !enabled && held {
            self.release(SourceKind::Secondary);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Drains buffered samples from every active source.
    pub fn drain_all(&mut self) -> Vec<(SourceKind, Vec<f32>)> {
        self.sources
            .iter_mut()
            .filter(|s| s.source.is_active())
            .map(|s| (s.kind, s.source.drain()))
            .collect()
    }

    /// Discards buffered samples without using them (segment seal).
    pub fn discard_buffers(&mut self) {
        for managed in &mut self.sources {
            let dropped = managed.source.drain().len();
            if dropped > 0 {
                tracing::debug!(target: "audio",
                    source = managed.kind.as_str(), dropped, "buffered samples discarded");
            }
        }
    }

    pub fn set_quality(&mut self, kind: SourceKind, quality: f32) {
        if let Some(managed) = self.sources.iter_mut().find(|s| s.kind == kind) {
            managed.quality = quality.clamp(0.0, 1.0);
        }
    }

    pub fn holds(&self, kind: SourceKind) -> bool {
        self.sources.iter().any(|s| s.kind == kind)
    }

    pub fn active_count(&self) -> usize {
        self.sources.iter().filter(|s| s.source.is_active()).count()
    }

    /// Liveness snapshot for `AudioSourceChanged` events.
    pub fn snapshots(&self) -> Vec<SourceSnapshot> {
        self.sources
            .iter()
            .map(|s| SourceSnapshot {
                kind: s.kind.as_str().to_string(),
                active: s.source.is_active(),
                quality: s.quality,
            })
            .collect()
    }
}
