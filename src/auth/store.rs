//! Persisted credential slot
//!
//! The session token lives in exactly one named slot. Reads and writes are
//! async so the session manager treats them as suspension points regardless
//! of the backing implementation.

use crate::db::{CredentialDb, DbError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Name of the slot holding the raw session token
pub const TOKEN_SLOT: &str = "token";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("{0}")]
    Other(String),
}

/// Storage for the single session-token slot
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the stored token, if any
    async fn load(&self) -> Result<Option<String>, StoreError>;

    /// Replace the stored token
    async fn save(&self, token: &str) -> Result<(), StoreError>;

    /// Remove the stored token; clearing an empty slot succeeds
    async fn clear(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    async fn load(&self) -> Result<Option<String>, StoreError> {
        (**self).load().await
    }

    async fn save(&self, token: &str) -> Result<(), StoreError> {
        (**self).save(token).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }
}

/// Adapter to use `CredentialDb` as the credential store
#[derive(Clone)]
pub struct DbCredentialStore {
    db: CredentialDb,
    slot: String,
}

impl DbCredentialStore {
    pub fn new(db: CredentialDb) -> Self {
        Self {
            db,
            slot: TOKEN_SLOT.to_string(),
        }
    }

    pub fn inner(&self) -> &CredentialDb {
        &self.db
    }
}

#[async_trait]
impl CredentialStore for DbCredentialStore {
    async fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.db.get(&self.slot)?)
    }

    async fn save(&self, token: &str) -> Result<(), StoreError> {
        Ok(self.db.set(&self.slot, token)?)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Ok(self.db.remove(&self.slot)?)
    }
}
