//! translive: adaptive streaming transcription and translation.
//!
//! Captures audio from one or two sources, mixes and scores it, feeds
//! adaptively sized chunks to an external speech recognition service, and
//! translates the recognized text on a debounce. Output flows as typed
//! events: live transcription updates, translation updates, and sealed
//! segments.
//!
//! The entry point is [`Session`]; everything else is a component it owns.
//! Components are individually usable for embedders that want only part of
//! the pipeline (for example [`normalize::Normalizer`] or
//! [`scheduler::AdaptiveScheduler`]).

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod cache;
pub mod config;
pub mod defaults;
pub mod error;
pub mod events;
pub mod hash;
pub mod normalize;
pub mod recognize;
pub mod scheduler;
pub mod segment;
pub mod session;
pub mod translate;

pub use config::Config;
pub use error::{Result, TransliveError};
pub use events::{EventBus, PipelineEvent, SessionStats};
pub use recognize::{HttpRecognitionService, RecognitionService};
pub use segment::TranscriptionSegment;
pub use session::{Session, SessionHandle, SessionStatus};
pub use translate::{HttpTranslationService, TranslationService};
