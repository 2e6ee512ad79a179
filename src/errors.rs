use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// --- Backend Collaborator Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Row not found with ID: {0}")]
    NotFound(Uuid),

    #[error("Stored row could not be parsed: {0}")]
    DataCorruption(String),

    #[error("Injected failure: {0}")]
    Injected(&'static str),

    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File upload failed: {0}")]
    UploadFailed(String),

    #[error("File not found with key: {0}")]
    NotFound(String),

    #[error("Injected failure: {0}")]
    Injected(&'static str),

    #[error("Storage backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

/// Any failure reported by the backend collaborator.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// --- Board (controller) Errors ---

/// The action a generic backend-failure notice refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    LoadFeed,
    Upload,
    ClearAll,
    LoadComments,
    Like,
    AddComment,
    Delete,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Failure::LoadFeed => "Failed to load memes",
            Failure::Upload => "Failed to upload meme",
            Failure::ClearAll => "Failed to clear all memes",
            Failure::LoadComments => "Failed to load comments",
            Failure::Like => "Failed to like meme",
            Failure::AddComment => "Failed to add comment",
            Failure::Delete => "Failed to delete meme",
        };
        f.write_str(text)
    }
}

/// Outcome taxonomy of every feed/card action. The display text is what the user sees.
#[derive(Error, Debug)]
pub enum BoardError {
    // Validation: detected locally, never reaches the backend.
    #[error("Please provide a media file or URL")]
    MissingMedia,
    #[error("Please provide a valid media URL")]
    InvalidMediaUrl(String),
    #[error("File size must be less than {limit_mib}MB")]
    FileTooLarge { size: u64, limit_mib: u64 },
    #[error("Only image and video files are allowed")]
    UnsupportedMediaType(Option<String>),
    #[error("Incorrect password")]
    IncorrectPassword,
    #[error("Another {0} is already in progress")]
    Busy(&'static str),

    // Backend call failed; surfaced with a generic message.
    #[error("{action}")]
    Backend {
        action: Failure,
        #[source]
        source: BackendError,
    },
}

impl BoardError {
    pub fn backend(action: Failure, source: impl Into<BackendError>) -> Self {
        BoardError::Backend {
            action,
            source: source.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        !matches!(self, BoardError::Backend { .. })
    }
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Error processing multipart form data: {0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),
    #[error("Invalid meme ID format: {0}")]
    InvalidUuid(#[from] uuid::Error),
    #[error("Meme not found with ID: {0}")]
    MemeNotFound(Uuid),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("Could not perform file storage operation")]
    StorageError(#[source] StorageError),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::FileNotFound(key),
            e => AppError::StorageError(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // 4xx Client Errors
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::MultipartError(e) => (StatusCode::BAD_REQUEST, format!("Invalid multipart form data: {}", e)),
            AppError::InvalidUuid(e) => (StatusCode::BAD_REQUEST, format!("Invalid ID format: {}", e)),
            AppError::MemeNotFound(id) => (StatusCode::NOT_FOUND, format!("Meme not found with ID: {}", id)),
            AppError::FileNotFound(key) => (StatusCode::NOT_FOUND, format!("File not found: {}", key)),
            AppError::Board(BoardError::IncorrectPassword) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Board(BoardError::Busy(_)) => (StatusCode::CONFLICT, self.to_string()),
            AppError::Board(e) if e.is_validation() => (StatusCode::BAD_REQUEST, e.to_string()),

            // 5xx Server Errors
            AppError::Board(e) => {
                tracing::error!(error.source = ?e, "Backend call failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::StorageError(e) => {
                tracing::error!(error.source = ?e, "Storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "File storage operation failed".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred".to_string())
            }
        };

        tracing::debug!(error.message = %error_message, error.status = %status, "Responding with error");

        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failures_show_generic_text() {
        let err = BoardError::backend(Failure::Like, RepoError::Injected("likes"));
        assert_eq!(err.to_string(), "Failed to like meme");
        assert!(!err.is_validation());
    }

    #[test]
    fn size_message_uses_limit_in_mib() {
        let err = BoardError::FileTooLarge { size: 6 * 1024 * 1024, limit_mib: 5 };
        assert_eq!(err.to_string(), "File size must be less than 5MB");
        assert!(err.is_validation());
    }

    #[test]
    fn password_errors_are_forbidden() {
        let resp = AppError::from(BoardError::IncorrectPassword).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let resp = AppError::from(BoardError::Busy("like")).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let resp = AppError::from(BoardError::MissingMedia).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
