//! Speech recognition: service boundary, HTTP implementation, and the
//! caching/filtering client the pipeline talks to.

pub mod client;
pub mod hallucination;
pub mod http;
pub mod service;

pub use client::{RecognitionClient, Transcription};
pub use hallucination::{HallucinationFilter, HallucinationKind};
pub use http::HttpRecognitionService;
pub use service::{RecognitionOutcome, RecognitionService, RecognizedText};
