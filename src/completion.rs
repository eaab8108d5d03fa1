//! Completion service abstraction
//!
//! The conversation store only needs "submit a prompt, eventually get a reply
//! or a failure". Everything behind that is a `CompletionService`.

mod canned;
mod error;
mod http;

pub use canned::{CannedCompletionService, CANNED_REPLIES};
pub use error::{CompletionError, CompletionErrorKind};
pub use http::HttpCompletionService;

use crate::auth::AuthorizationContext;
use crate::conversation::{ConversationId, RequestId};
use async_trait::async_trait;
use std::sync::Arc;

/// A single prompt submitted on behalf of a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub request_id: RequestId,
    /// Conversation the reply belongs to, captured when the request is issued
    pub conversation_id: ConversationId,
    pub prompt: String,
    pub auth: AuthorizationContext,
}

/// Producer of assistant replies
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete a prompt. Timeouts are reported as errors like any other failure.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: CompletionService + ?Sized> CompletionService for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Logging wrapper for completion services
pub struct LoggingCompletionService {
    inner: Arc<dyn CompletionService>,
    name: String,
}

impl LoggingCompletionService {
    pub fn new(inner: Arc<dyn CompletionService>) -> Self {
        let name = inner.name().to_string();
        Self { inner, name }
    }
}

#[async_trait]
impl CompletionService for LoggingCompletionService {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    service = %self.name,
                    request_id = %request.request_id,
                    conv_id = %request.conversation_id,
                    duration_ms = %duration.as_millis(),
                    reply_chars = reply.chars().count(),
                    "Completion request succeeded"
                );
            }
            Err(e) => {
                tracing::error!(
                    service = %self.name,
                    request_id = %request.request_id,
                    conv_id = %request.conversation_id,
                    duration_ms = %duration.as_millis(),
                    kind = ?e.kind,
                    error = %e.message,
                    "Completion request failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}
