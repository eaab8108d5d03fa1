//! Conversation store state

use super::model::{Conversation, ConversationId, Message};
use super::RequestId;
use crate::auth::AuthorizationContext;

/// The one outstanding completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request_id: RequestId,
    /// Conversation the reply will be appended to, whatever is active by then
    pub conversation_id: ConversationId,
    /// Authorization context the request was issued under
    pub auth: AuthorizationContext,
}

/// State owned by the conversation store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    /// Most recently created first
    pub conversations: Vec<Conversation>,
    pub active: Option<ConversationId>,
    /// Messages currently shown for the active conversation
    pub visible: Vec<Message>,
    pub pending: Option<PendingRequest>,
}

impl ConversationState {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    pub(crate) fn conversation_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id() == id)
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.and_then(|id| self.conversation(id))
    }
}
