use serde::Serialize;
use std::fmt;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AppError {
    pub message: String,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError {
            message: err.to_string(),
        }
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError {
            message: err.to_string(),
        }
    }
}

impl From<ort::Error> for AppError {
    fn from(err: ort::Error) -> Self {
        AppError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError {
            message: err.to_string(),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError {
            message: err.to_string(),
        }
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError { message: msg }
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError {
            message: msg.to_string(),
        }
    }
}

/// Failures the view is told about through the session snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to load model: {0}")]
    ModelLoad(String),
    #[error("Model is not loaded")]
    ModelNotReady,
    #[error("No image selected")]
    NoImage,
    #[error("Image is not in history: {0}")]
    UnknownHistoryEntry(String),
    #[error("Failed to load image: {0}")]
    ImageLoad(String),
    #[error("Classification failed: {0}")]
    Classification(String),
}

impl SessionError {
    /// Stable identifier the view can switch on.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::ModelLoad(_) => "model_load",
            SessionError::ModelNotReady => "model_not_ready",
            SessionError::NoImage => "no_image",
            SessionError::UnknownHistoryEntry(_) => "unknown_history_entry",
            SessionError::ImageLoad(_) => "image_load",
            SessionError::Classification(_) => "classification",
        }
    }
}
