//! Session manager
//!
//! Two states, `Unauthenticated` and `Authenticated(Identity)`, plus an
//! `initializing` flag that is true only until `initialize()` has resolved the
//! stored credential. Validity is always re-evaluated against the clock.

use super::claims::{Credential, Identity};
use super::client::{AuthApi, LoginRequest};
use super::clock::{Clock, SystemClock};
use super::error::AuthError;
use super::store::CredentialStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Observable authentication status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthStatus {
    Unauthenticated,
    Authenticated { identity: Identity },
}

/// Session state published to observers
#[derive(Debug, Clone)]
pub struct SessionState {
    pub credential: Option<Credential>,
    pub initializing: bool,
    /// Bumped on every transition into or out of `Authenticated`
    pub epoch: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            credential: None,
            initializing: true,
            epoch: 0,
        }
    }

    pub fn status(&self) -> AuthStatus {
        match &self.credential {
            Some(credential) => AuthStatus::Authenticated {
                identity: credential.identity(),
            },
            None => AuthStatus::Unauthenticated,
        }
    }
}

/// Materials needed to authorize an outbound request.
///
/// Two contexts compare equal only if they carry the same token from the same
/// session epoch, so logging out and back in with the same token still
/// invalidates contexts captured before the logout.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    token: String,
    epoch: u64,
}

impl AuthorizationContext {
    pub const HEADER: &'static str = "Authorization";

    pub(crate) fn new(token: impl Into<String>, epoch: u64) -> Self {
        Self {
            token: token.into(),
            epoch,
        }
    }

    /// Raw token, sent verbatim as the `Authorization` header value
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl fmt::Debug for AuthorizationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationContext")
            .field("token", &"<redacted>")
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Owner of the session credential
pub struct SessionManager<S: CredentialStore> {
    store: S,
    clock: Arc<dyn Clock>,
    state: watch::Sender<SessionState>,
}

impl<S: CredentialStore> SessionManager<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(SessionState::new());
        Self {
            store,
            clock,
            state,
        }
    }

    /// Subscribe to session state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current session state (a snapshot)
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Current instant according to the session clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_initializing(&self) -> bool {
        self.state.borrow().initializing
    }

    /// Authentication status as of now. An expired credential reports
    /// `Unauthenticated` even before `enforce_expiry` has dropped it.
    pub fn status(&self) -> AuthStatus {
        match self.identity() {
            Some(identity) => AuthStatus::Authenticated { identity },
            None => AuthStatus::Unauthenticated,
        }
    }

    /// Identity of the signed-in user while the credential is valid
    pub fn identity(&self) -> Option<Identity> {
        let now = self.clock.now();
        self.state
            .borrow()
            .credential
            .as_ref()
            .filter(|c| !c.is_expired(now))
            .map(Credential::identity)
    }

    /// True when there is no credential or it has expired
    pub fn is_expired(&self) -> bool {
        let now = self.clock.now();
        self.state
            .borrow()
            .credential
            .as_ref()
            .map_or(true, |c| c.is_expired(now))
    }

    /// Authorization materials for outbound requests; `None` unless a valid
    /// credential is held
    pub fn authorization_context(&self) -> Option<AuthorizationContext> {
        let now = self.clock.now();
        let state = self.state.borrow();
        state
            .credential
            .as_ref()
            .filter(|c| !c.is_expired(now))
            .map(|c| AuthorizationContext::new(c.raw(), state.epoch))
    }

    /// Resolve the stored credential at startup.
    ///
    /// Never fails: every failure path ends unauthenticated. Performs at most
    /// one write (clearing a malformed or expired token). Only the first call
    /// does anything.
    pub async fn initialize(&self) {
        if !self.is_initializing() {
            tracing::debug!("Session already initialized");
            return;
        }

        let credential = match self.store.load().await {
            Ok(None) => None,
            Ok(Some(raw)) => match Credential::parse(&raw) {
                Ok(credential) if !credential.is_expired(self.clock.now()) => Some(credential),
                Ok(_) => {
                    tracing::info!("Stored credential has expired, discarding");
                    self.clear_store().await;
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stored credential is malformed, discarding");
                    self.clear_store().await;
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored credential");
                None
            }
        };

        let authenticated = credential.is_some();
        self.state.send_modify(|state| {
            state.initializing = false;
            if let Some(credential) = credential {
                state.credential = Some(credential);
                state.epoch += 1;
            }
        });

        tracing::info!(authenticated, "Session initialized");
    }

    /// Adopt a token obtained from the auth endpoint.
    ///
    /// Decoding and persistence both happen before any state changes, so a
    /// failure leaves the previous session untouched.
    pub async fn login(&self, raw_token: &str) -> Result<Identity, AuthError> {
        let credential = Credential::parse(raw_token)?;
        if credential.is_expired(self.clock.now()) {
            return Err(AuthError::ExpiredCredential);
        }

        self.store.save(credential.raw()).await?;

        let identity = credential.identity();
        self.state.send_modify(|state| {
            state.credential = Some(credential);
            state.epoch += 1;
        });

        tracing::info!(
            user = identity.display_name.as_deref().unwrap_or("<unknown>"),
            "Logged in"
        );
        Ok(identity)
    }

    /// Call the login endpoint and adopt the returned token
    pub async fn authenticate<A>(&self, api: &A, request: &LoginRequest) -> Result<Identity, AuthError>
    where
        A: AuthApi + ?Sized,
    {
        let token = api.login(request).await?;
        self.login(&token).await
    }

    /// Clear the stored token and drop the credential. Idempotent.
    pub async fn logout(&self) {
        self.clear_store().await;
        let was_authenticated = self.drop_credential();
        if was_authenticated {
            tracing::info!("Logged out");
        }
    }

    /// Drop the credential if it has expired. Returns true if a transition
    /// to `Unauthenticated` happened.
    pub async fn enforce_expiry(&self) -> bool {
        let now = self.clock.now();
        let expired = self
            .state
            .borrow()
            .credential
            .as_ref()
            .is_some_and(|c| c.is_expired(now));
        if !expired {
            return false;
        }

        tracing::info!("Credential expired, ending session");
        self.clear_store().await;
        self.drop_credential()
    }

    fn drop_credential(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.credential.take().is_some() {
                state.epoch += 1;
                true
            } else {
                false
            }
        })
    }

    async fn clear_store(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Failed to clear stored credential");
        }
    }
}
