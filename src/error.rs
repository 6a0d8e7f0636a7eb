//! Error types for translive.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransliveError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio acquisition errors
    //
    // Per-source failures are PermissionDenied/DeviceUnavailable and keep the
    // session alive; Acquisition is raised only when zero sources open, which
    // is the single session-fatal condition.
    #[error("No audio source could be acquired: {message}")]
    Acquisition { message: String },

    #[error("Permission denied for {source_kind} audio source")]
    PermissionDenied { source_kind: String },

    #[error("Audio device unavailable for {source_kind} source: {message}")]
    DeviceUnavailable { source_kind: String, message: String },

    // Encoding errors (chunk-local; the encoder degrades rather than
    // propagating these, so they surface only in logs)
    #[error("Audio encoding failed: {message}")]
    Encoding { message: String },

    // Recognition errors (all chunk-local)
    #[error("Recognition request timed out after {seconds}s")]
    RecognitionTimeout { seconds: u64 },

    #[error("{service} service rate-limited the request")]
    RateLimited { service: String },

    #[error("Recognition request rejected with status {status}: {message}")]
    RequestRejected { status: u16, message: String },

    #[error("Recognition failed: {message}")]
    Recognition { message: String },

    // Translation errors (chunk-local; recognized text still stands)
    #[error("Translation failed: {message}")]
    Translation { message: String },

    // Session state errors
    #[error("Session is not in a state that allows {operation}")]
    InvalidState { operation: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl TransliveError {
    /// True when a failure should end the session rather than skip a chunk.
    ///
    /// Only the total inability to acquire audio is session-fatal; every
    /// recognition/translation/encoding failure is local to one chunk.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, TransliveError::Acquisition { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, TransliveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_display() {
        let error = TransliveError::Acquisition {
            message: "all devices busy".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "No audio source could be acquired: all devices busy"
        );
    }

    #[test]
    fn rate_limited_display() {
        let error = TransliveError::RateLimited {
            service: "recognition".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "recognition service rate-limited the request"
        );
    }

    #[test]
    fn request_rejected_display() {
        let error = TransliveError::RequestRejected {
            status: 400,
            message: "bad audio".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Recognition request rejected with status 400: bad audio"
        );
    }

    #[test]
    fn only_acquisition_is_session_fatal() {
        assert!(
            TransliveError::Acquisition {
                message: "none".into()
            }
            .is_session_fatal()
        );
        assert!(
            !TransliveError::RecognitionTimeout { seconds: 30 }.is_session_fatal()
        );
        assert!(
            !TransliveError::Translation {
                message: "x".into()
            }
            .is_session_fatal()
        );
        assert!(
            !TransliveError::DeviceUnavailable {
                source_kind: "secondary".into(),
                message: "unplugged".into()
            }
            .is_session_fatal()
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: TransliveError = io.into();
        assert!(error.to_string().contains("missing"));
    }
}
