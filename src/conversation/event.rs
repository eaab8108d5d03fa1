//! Events that drive the conversation store

use super::model::ConversationId;
use super::RequestId;
use crate::auth::AuthorizationContext;
use crate::completion::CompletionError;
use chrono::{DateTime, Utc};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User intents
    StartNew,
    Submit {
        text: String,
        /// Session context at submission; `None` when signed out
        auth: Option<AuthorizationContext>,
        request_id: RequestId,
        /// Used only if the submission starts a new conversation
        new_conversation_id: ConversationId,
        now: DateTime<Utc>,
    },
    Select {
        id: ConversationId,
    },
    ClearActive,
    Delete {
        id: ConversationId,
    },

    // Completion service results
    CompletionSucceeded {
        request_id: RequestId,
        reply: String,
    },
    CompletionFailed {
        request_id: RequestId,
        error: CompletionError,
    },
    /// The submitter stopped waiting before a result arrived
    CompletionAbandoned {
        request_id: RequestId,
    },

    // Session
    SessionEnded,
}
