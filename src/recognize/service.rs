//! Recognition service boundary.
//!
//! The external speech-to-text service is opaque to the pipeline; this trait
//! is the entire contract. Failure modes are explicit variants rather than
//! stringly-typed errors so callers can react per mode: back off on
//! `RateLimited`, drop the chunk on `Rejected`, keep the session alive in
//! every case.

use async_trait::async_trait;

/// Raw successful response from the recognition service.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    /// Mean log-probability across provider segments, when reported.
    pub avg_logprob: Option<f32>,
    /// Detected language code, when reported.
    pub language: Option<String>,
}

/// Outcome of one recognition call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutcome {
    Success(RecognizedText),
    /// The request exceeded its deadline.
    Timeout,
    /// HTTP 429; the caller should lengthen its interval, not retry.
    RateLimited,
    /// Any other rejection, fatal to this chunk only.
    Rejected { status: u16, message: String },
}

/// External speech-to-text service.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Transcribes one self-contained audio container.
    ///
    /// `language` is a hint ("auto"/None lets the service detect); `prompt`
    /// is decoding context, typically the tail of the previous transcript.
    async fn recognize(
        &self,
        audio: &[u8],
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> RecognitionOutcome;
}
