//! Test doubles for the session and conversation layers
//!
//! These mocks enable testing the stores without real I/O.

use crate::auth::{
    AuthApi, AuthError, AuthorizationContext, Clock, CredentialStore, LoginRequest,
    SignupRequest, StoreError,
};
use crate::completion::{CompletionError, CompletionRequest, CompletionService};
use crate::conversation::{ConversationId, RequestId};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, Notify};

/// Install a test-friendly tracing subscriber once per process
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build an unsigned JWT carrying `claims`
pub fn make_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

pub fn test_auth() -> AuthorizationContext {
    AuthorizationContext::new("test-token", 1)
}

pub fn completion_request(prompt: &str) -> CompletionRequest {
    CompletionRequest {
        request_id: RequestId::new(),
        conversation_id: ConversationId::new(),
        prompt: prompt.to_string(),
        auth: test_auth(),
    }
}

// ============================================================================
// Mock Completion Service
// ============================================================================

/// Completion service that returns queued replies
pub struct MockCompletionService {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletionService {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn queue_error(&self, error: CompletionError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockCompletionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::transport("No mock reply queued")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Gated Completion Service (for interleaving tests)
// ============================================================================

/// Completion service that holds each request until the test releases it
pub struct GatedCompletionService {
    started: Notify,
    release_tx: mpsc::UnboundedSender<Result<String, CompletionError>>,
    release_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl GatedCompletionService {
    pub fn new() -> Self {
        let (release_tx, release_rx) = mpsc::unbounded_channel();
        Self {
            started: Notify::new(),
            release_tx,
            release_rx: tokio::sync::Mutex::new(release_rx),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Wait until a request has reached the service. Each request wakes one wait.
    pub async fn wait_for_request(&self) {
        self.started.notified().await;
    }

    /// Resolve the oldest held request
    pub fn release(&self, result: Result<String, CompletionError>) {
        let _ = self.release_tx.send(result);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for GatedCompletionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionService for GatedCompletionService {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.started.notify_one();
        self.release_rx
            .lock()
            .await
            .recv()
            .await
            .unwrap_or_else(|| Err(CompletionError::transport("Gate closed")))
    }

    fn name(&self) -> &str {
        "gated"
    }
}

// ============================================================================
// In-memory Credential Store
// ============================================================================

/// Credential store backed by memory, with injectable failures
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
    writes: AtomicUsize,
    fail_loads: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(None),
            writes: AtomicUsize::new(0),
            fail_loads: Mutex::new(false),
            fail_writes: Mutex::new(false),
        }
    }

    /// Pre-populated slot; does not count as a write
    pub fn with_token(token: &str) -> Self {
        let store = Self::new();
        *store.token.lock().unwrap() = Some(token.to_string());
        store
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    /// Number of saves and clears attempted
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_loads(&self, fail: bool) {
        *self.fail_loads.lock().unwrap() = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    fn check_write(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if *self.fail_writes.lock().unwrap() {
            return Err(StoreError::Other("Injected write failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<String>, StoreError> {
        if *self.fail_loads.lock().unwrap() {
            return Err(StoreError::Other("Injected read failure".to_string()));
        }
        Ok(self.token())
    }

    async fn save(&self, token: &str) -> Result<(), StoreError> {
        self.check_write()?;
        *self.token.lock().unwrap() = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.check_write()?;
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

// ============================================================================
// Manual Clock
// ============================================================================

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ============================================================================
// Mock Auth API
// ============================================================================

/// Auth endpoint double with queued answers
pub struct MockAuthApi {
    logins: Mutex<VecDeque<Result<String, AuthError>>>,
    signups: Mutex<VecDeque<Result<(), AuthError>>>,
}

impl MockAuthApi {
    pub fn new() -> Self {
        Self {
            logins: Mutex::new(VecDeque::new()),
            signups: Mutex::new(VecDeque::new()),
        }
    }

    pub fn queue_login(&self, result: Result<String, AuthError>) {
        self.logins.lock().unwrap().push_back(result);
    }

    pub fn queue_signup(&self, result: Result<(), AuthError>) {
        self.signups.lock().unwrap().push_back(result);
    }
}

impl Default for MockAuthApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<String, AuthError> {
        request.validate()?;
        self.logins
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::rejected("No mock login queued")))
    }

    async fn signup(&self, request: &SignupRequest) -> Result<(), AuthError> {
        request.validate()?;
        self.signups
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::rejected("No mock signup queued")))
    }
}
