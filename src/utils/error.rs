//! Error types and handling
//!
//! Common error types used across the recorder, and the payload shape used
//! when a failure has to be surfaced to the user as a notification.

use crate::recorder::{ConfigError, RecordingError};
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Recording(#[from] RecordingError),
}

/// Error payload for user-facing notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Storage(StorageError::Unsupported) => "UNSUPPORTED_PLATFORM",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<&RecordingError> for ErrorResponse {
    fn from(error: &RecordingError) -> Self {
        let code = match error {
            RecordingError::Storage(StorageError::Unsupported) => "UNSUPPORTED_PLATFORM",
            RecordingError::Storage(_) => "STORAGE_ERROR",
            RecordingError::Encoding(_) => "ENCODING_ERROR",
            RecordingError::AlreadyRecording | RecordingError::NotRecording => "STATE_ERROR",
            _ => "RECORDING_ERROR",
        };
        ErrorResponse::new(code, error.to_string())
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_platform_code() {
        let response: ErrorResponse = AppError::Storage(StorageError::Unsupported).into();
        assert_eq!(response.code, "UNSUPPORTED_PLATFORM");
        assert!(response.message.contains("No supported file write API"));
    }

    #[test]
    fn test_recording_error_code() {
        let response = ErrorResponse::from(&RecordingError::AlreadyRecording);
        assert_eq!(response.code, "STATE_ERROR");
    }
}
