//! Client configuration
//!
//! Everything is read from the environment; unset variables fall back to the
//! defaults the hosted client uses.

use crate::auth::DbCredentialStore;
use crate::completion::{
    CannedCompletionService, CompletionService, HttpCompletionService, LoggingCompletionService,
};
use crate::db::{CredentialDb, DbError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str = "https://chatbuddy-1fcx.onrender.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CANNED_LATENCY: Duration = Duration::from_millis(1000);

/// Configuration for the session and completion collaborators
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL serving `POST /login`
    pub auth_url: String,
    /// Base URL serving `POST /signup`
    pub signup_url: String,
    /// Completion endpoint; `None` selects the canned responder
    pub completion_url: Option<String>,
    /// Path of the credential slot database
    pub db_path: PathBuf,
    pub request_timeout: Duration,
    /// Simulated latency of the canned responder
    pub canned_latency: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            signup_url: DEFAULT_AUTH_URL.to_string(),
            completion_url: None,
            db_path: default_db_path(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            canned_latency: DEFAULT_CANNED_LATENCY,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (the environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let auth_url = non_empty("CHATBUDDY_AUTH_URL").unwrap_or(defaults.auth_url);
        let signup_url = non_empty("CHATBUDDY_SIGNUP_URL").unwrap_or_else(|| auth_url.clone());

        Self {
            signup_url,
            auth_url,
            completion_url: non_empty("CHATBUDDY_COMPLETION_URL"),
            db_path: non_empty("CHATBUDDY_DB_PATH").map_or(defaults.db_path, PathBuf::from),
            request_timeout: non_empty("CHATBUDDY_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map_or(defaults.request_timeout, Duration::from_secs),
            canned_latency: non_empty("CHATBUDDY_CANNED_LATENCY_MS")
                .and_then(|v| v.parse().ok())
                .map_or(defaults.canned_latency, Duration::from_millis),
        }
    }

    /// Open the credential slot database at `db_path`
    pub fn credential_store(&self) -> Result<DbCredentialStore, DbError> {
        CredentialDb::open(&self.db_path).map(DbCredentialStore::new)
    }

    /// Build the configured completion service, wrapped with logging
    pub fn completion_service(&self) -> Arc<dyn CompletionService> {
        let inner: Arc<dyn CompletionService> = match &self.completion_url {
            Some(url) => match HttpCompletionService::new(url.clone(), self.request_timeout) {
                Ok(service) => Arc::new(service),
                Err(e) => {
                    tracing::warn!(error = %e, "Falling back to canned responses");
                    Arc::new(CannedCompletionService::new(self.canned_latency))
                }
            },
            None => Arc::new(CannedCompletionService::new(self.canned_latency)),
        };
        Arc::new(LoggingCompletionService::new(inner))
    }
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chatbuddy").join("credentials.db")
}
