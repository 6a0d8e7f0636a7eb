//! Typed event bus between the pipeline and the consuming application layer.
//!
//! Events are delivered over an unbounded crossbeam channel. Because exactly
//! one scheduling cycle is in flight at a time, emission order matches
//! pipeline order and consumers never observe a segment before the updates
//! that produced it.

use crate::segment::TranscriptionSegment;
use serde::{Deserialize, Serialize};

/// Per-source liveness snapshot included in source-change events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub kind: String,
    pub active: bool,
    pub quality: f32,
}

/// Audio quality metrics for observability consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub volume: f32,
    pub clarity: f32,
    pub score: f32,
}

/// Running counters reported alongside sealed segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub chunks_processed: u64,
    pub segments_sealed: u64,
    pub recognition_cache_hits: u64,
    pub translation_cache_hits: u64,
    pub hallucinations_filtered: u64,
}

/// Events emitted by the pipeline, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// New recognized text appended to the pending buffer.
    TranscriptionUpdate {
        text: String,
        confidence: f32,
        /// Seconds since session start.
        timestamp: f64,
    },
    /// Translation arrived for the current pending text.
    TranslationUpdate {
        text: String,
        translation: String,
        timestamp: f64,
    },
    /// The pending buffer was sealed into an immutable segment.
    SegmentCreated {
        segment: TranscriptionSegment,
        total_segments: u64,
        stats: SessionStats,
    },
    /// An audio source was acquired, released, or toggled.
    AudioSourceChanged { sources: Vec<SourceSnapshot> },
    /// Periodic quality score for the mixed stream.
    AudioQualityUpdate { metrics: QualityMetrics },
    /// Systemic error condition surfaced to the user.
    Error { message: String },
}

/// Publish side of the event bus.
///
/// Cloneable so the session can hand it to sub-components; `emit` never
/// blocks (the channel is unbounded) and silently drops events once the
/// subscriber has gone away, which is the desired teardown behavior.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: crossbeam_channel::Sender<PipelineEvent>,
}

impl EventBus {
    /// Creates a bus and its subscriber end.
    pub fn new() -> (Self, crossbeam_channel::Receiver<PipelineEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    /// Emits an event. A disconnected subscriber is not an error.
    pub fn emit(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(target: "events", "subscriber disconnected, event dropped");
        }
    }
}
