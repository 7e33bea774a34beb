//! Error types for the chat and assembly paths.
//!
//! Every failure on the chat endpoint collapses into the same `{"error": ...}`
//! body with HTTP 500; the variants exist for logging and tests.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use engine::ReplyError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage returned {status} for {object}: {body}")]
    Status {
        status: u16,
        object: String,
        body: String,
    },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("the chatbot API key is not configured")]
    MissingApiKey,

    #[error("chatbot request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chatbot returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("chatbot reply has no candidate text")]
    EmptyReply,

    #[error("the chatbot did not return valid JSON: {0}")]
    Reply(#[from] ReplyError),
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("scratch directory error: {0}")]
    Scratch(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("ffmpeg failed: {0}")]
    Mux(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),

    #[error("the assembly worker is not running")]
    WorkerUnavailable,
}

/// Error surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid method")]
    MethodNotAllowed,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::MethodNotAllowed => "Invalid method".to_string(),
            other => format!("A general error occurred: {}", other),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(
            ApiError::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiError::Chat(ChatError::MissingApiKey).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn reply_errors_mention_json() {
        let err = ChatError::from(ReplyError::NoJsonObject);
        assert!(err.to_string().contains("valid JSON"));
    }
}
