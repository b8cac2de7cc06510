//! Error taxonomy for a single conversion attempt.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Every variant is terminal for the current conversion; retrying is up to
/// the caller.
#[derive(Debug, Clone, Error)]
pub enum ConvertError {
    /// Missing title, author or source text, or an unreadable request.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No candidate encoding produced clean text.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The archive could not be assembled.
    #[error("Archive write error: {0}")]
    ArchiveWrite(String),

    /// The cover image payload could not be decoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The conversion task died before producing a result.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

impl From<zip::result::ZipError> for ConvertError {
    fn from(err: zip::result::ZipError) -> Self {
        ConvertError::ArchiveWrite(err.to_string())
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        ConvertError::ArchiveWrite(err.to_string())
    }
}

impl From<base64::DecodeError> for ConvertError {
    fn from(err: base64::DecodeError) -> Self {
        ConvertError::Encoding(format!("cover image is not valid base64: {}", err))
    }
}

impl From<tokio::task::JoinError> for ConvertError {
    fn from(err: tokio::task::JoinError) -> Self {
        ConvertError::Internal(format!("conversion task failed: {}", err))
    }
}

impl ConvertError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConvertError::Validation(_) | ConvertError::Encoding(_) => StatusCode::BAD_REQUEST,
            ConvertError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ConvertError::ArchiveWrite(_) | ConvertError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("conversion failed: {}", self);
        } else {
            tracing::warn!("conversion rejected: {}", self);
        }

        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}
