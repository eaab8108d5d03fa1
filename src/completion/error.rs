//! Completion error types

use thiserror::Error;

/// Completion failure with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Transport, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Unauthorized, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::InvalidResponse, message)
    }
}

/// Why a completion failed. The store treats every kind the same way; the
/// classification is for logs and for the UI's retry affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionErrorKind {
    Timeout,
    /// Connection refused, reset, DNS failure
    Transport,
    /// 401/403 from the service
    Unauthorized,
    /// 5xx, or a 4xx other than auth
    ServerError,
    /// Success status but a body we could not read
    InvalidResponse,
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(e.to_string())
        } else if e.is_decode() {
            Self::invalid_response(e.to_string())
        } else {
            Self::transport(e.to_string())
        }
    }
}
