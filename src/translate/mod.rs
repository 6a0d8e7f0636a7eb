//! Translation: service boundary, HTTP implementation, and the caching,
//! debouncing client the pipeline talks to.

pub mod client;
pub mod http;
pub mod service;

pub use client::TranslationClient;
pub use http::HttpTranslationService;
pub use service::{TranslationOutcome, TranslationService};
