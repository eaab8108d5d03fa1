//! Session and auth-endpoint errors

use super::{DecodeError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed credential: {0}")]
    MalformedCredential(#[from] DecodeError),
    #[error("Credential has already expired")]
    ExpiredCredential,
    #[error("Credential store error: {0}")]
    Storage(#[from] StoreError),
    /// Input rejected before any request was sent
    #[error("{0}")]
    Validation(String),
    /// The auth endpoint answered with a failure status
    #[error("{0}")]
    Rejected(String),
    #[error("Error connecting to server")]
    Network(#[source] reqwest::Error),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}
