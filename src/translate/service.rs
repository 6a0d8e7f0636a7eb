//! Translation service boundary.

use async_trait::async_trait;

/// Outcome of one translation call.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslationOutcome {
    Success { text: String },
    Timeout,
    RateLimited,
    Rejected { status: u16, message: String },
}

/// External translation/LLM service.
#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> TranslationOutcome;
}
