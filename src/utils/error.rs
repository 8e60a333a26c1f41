//! Error types and handling
//!
//! Common error types used across the capture, recording and save paths.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stream unavailable: {0}")]
    StreamUnavailable(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Unsupported mime type: {0}")]
    UnsupportedMimeType(String),

    #[error("Failed to construct recorder: {0}")]
    RecorderConstruction(String),

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("Transcode error: {0}")]
    Transcode(String),

    #[error("Save error: {0}")]
    Save(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl AppError {
    /// Stable code attached to log records for this error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::StreamUnavailable(_) => "STREAM_UNAVAILABLE",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::UnsupportedMimeType(_) => "UNSUPPORTED_MIME_TYPE",
            AppError::RecorderConstruction(_) => "RECORDER_CONSTRUCTION_FAILED",
            AppError::Recorder(_) => "RECORDER_ERROR",
            AppError::Transcode(_) => "TRANSCODE_FAILED",
            AppError::Save(_) => "SAVE_FAILED",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::InvalidState(_) => "INVALID_STATE",
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
