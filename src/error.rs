use thiserror::Error;

use crate::constants::{
    BACKEND_FAILURE_REPLY, GENERIC_FAILURE_REPLY, QUOTA_REPLY, STORAGE_FAILURE_REPLY,
};

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("Telegram API error: {0}")]
    Telegram(String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Model quota exceeded")]
    QuotaExceeded,
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Short fixed text shown to the user for this failure. Never includes error details.
    pub(crate) fn user_reply(&self) -> &'static str {
        match self {
            AppError::QuotaExceeded => QUOTA_REPLY,
            AppError::Model(_) | AppError::Http(_) | AppError::Json(_) => BACKEND_FAILURE_REPLY,
            AppError::Database(_) | AppError::Io(_) => STORAGE_FAILURE_REPLY,
            AppError::Telegram(_) | AppError::Other(_) => GENERIC_FAILURE_REPLY,
        }
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Other(s.to_string())
    }
}
