//! Error types for translive.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransliveError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // External service errors
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Translation failed: {message}")]
    Translation { message: String },

    #[error("Circuit breaker open for {service}")]
    CircuitOpen { service: &'static str },

    // Session persistence errors
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Session persistence failed: {message}")]
    SessionPersist { message: String },

    #[error("Session serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, TransliveError>;
