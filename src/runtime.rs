//! Runtime for the conversation store
//!
//! `ConversationStore` owns the conversation state, feeds intents and
//! completion results through the pure transition function, and executes the
//! resulting effects.

mod store;

#[cfg(test)]
pub mod testing;

pub use store::ConversationStore;

use crate::completion::{CompletionError, CompletionErrorKind};
use crate::conversation::{
    ConversationId, ConversationSummary, Message, RequestId, TransitionError,
};
use serde::Serialize;
use thiserror::Error;

/// Notification sent to store observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    ConversationCreated {
        conversation: ConversationSummary,
    },
    MessageAppended {
        conversation_id: ConversationId,
        message: Message,
        /// Whether the message was also pushed to the visible buffer
        visible: bool,
    },
    PendingChanged {
        pending: bool,
    },
    ResponseFailed {
        conversation_id: ConversationId,
        kind: CompletionErrorKind,
        message: String,
    },
    /// A reply arrived for a request that was no longer pending
    ResponseDiscarded {
        request_id: RequestId,
        conversation_id: ConversationId,
    },
    RequestAbandoned {
        request_id: RequestId,
        conversation_id: ConversationId,
    },
    ActiveChanged {
        conversation_id: Option<ConversationId>,
    },
    ViewCleared {
        conversation_id: ConversationId,
    },
    ConversationDeleted {
        conversation_id: ConversationId,
    },
}

/// Errors surfaced by `ConversationStore` operations
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    #[error("Response failed: {source}")]
    ResponseFailed {
        conversation_id: ConversationId,
        #[source]
        source: CompletionError,
    },

    #[error("Invalid transition: {0}")]
    Transition(TransitionError),

    #[error("Internal error: {0}")]
    Internal(&'static str),
}

impl From<TransitionError> for ChatError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::NotAuthenticated => ChatError::NotAuthenticated,
            TransitionError::UnknownConversation(id) => ChatError::UnknownConversation(id),
            other => ChatError::Transition(other),
        }
    }
}

/// Why a submission was dropped without doing anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    EmptyMessage,
    RequestPending,
}

/// How a `submit_message` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing changed
    Ignored(IgnoreReason),
    /// The assistant reply was appended to `conversation_id`
    Replied {
        conversation_id: ConversationId,
        message: Message,
    },
    /// The request was abandoned before its reply arrived; nothing was appended
    Discarded { conversation_id: ConversationId },
}

/// Serializable read-only view of the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSnapshot {
    pub conversations: Vec<ConversationSummary>,
    pub active: Option<ConversationId>,
    pub messages: Vec<Message>,
    pub pending: bool,
}
