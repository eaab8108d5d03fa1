//! Pure state transition function

use super::model::{Conversation, ConversationId, Message, Role};
use super::{ConversationState, Effect, Event, PendingRequest, RequestId};
use crate::completion::CompletionRequest;
use crate::runtime::StoreEvent;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition. None of them change state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("A reply is still pending")]
    RequestPending,
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),
    #[error("No pending request with id {0}")]
    StaleResponse(RequestId),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs. Ids and
/// timestamps arrive inside the events so nothing here reads the clock or
/// generates randomness.
#[allow(clippy::too_many_lines)]
pub fn transition(
    state: &ConversationState,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        // ============================================================
        // Navigation
        // ============================================================

        // Only clears the active pointer; the next submit creates the conversation
        Event::StartNew => {
            let mut next = state.clone();
            next.active = None;
            next.visible.clear();
            Ok(TransitionResult::new(next).with_effect(Effect::notify(
                StoreEvent::ActiveChanged {
                    conversation_id: None,
                },
            )))
        }

        Event::Select { id } => {
            let conversation = state
                .conversation(id)
                .ok_or(TransitionError::UnknownConversation(id))?;
            let mut next = state.clone();
            next.visible = conversation.messages().to_vec();
            next.active = Some(id);
            Ok(TransitionResult::new(next).with_effect(Effect::notify(
                StoreEvent::ActiveChanged {
                    conversation_id: Some(id),
                },
            )))
        }

        Event::ClearActive => {
            let Some(active) = state.active else {
                return Ok(TransitionResult::new(state.clone()));
            };
            let mut next = state.clone();
            next.visible.clear();
            Ok(TransitionResult::new(next).with_effect(Effect::notify(
                StoreEvent::ViewCleared {
                    conversation_id: active,
                },
            )))
        }

        Event::Delete { id } => {
            if state.conversation(id).is_none() {
                return Err(TransitionError::UnknownConversation(id));
            }
            let mut next = state.clone();
            let mut effects = vec![];
            next.conversations.retain(|c| c.id() != id);

            if next.active == Some(id) {
                next.active = None;
                next.visible.clear();
                effects.push(Effect::notify(StoreEvent::ActiveChanged {
                    conversation_id: None,
                }));
            }
            if next.pending.as_ref().is_some_and(|p| p.conversation_id == id) {
                if let Some(pending) = next.pending.take() {
                    effects.extend(abandon(&pending));
                }
            }
            effects.push(Effect::notify(StoreEvent::ConversationDeleted {
                conversation_id: id,
            }));
            Ok(TransitionResult::new(next).with_effects(effects))
        }

        // ============================================================
        // Submission
        // ============================================================
        Event::Submit {
            text,
            auth,
            request_id,
            new_conversation_id,
            now,
        } => {
            if text.trim().is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            // One request in flight per store, whichever conversation it belongs to
            if state.is_pending() {
                return Err(TransitionError::RequestPending);
            }
            let auth = auth.ok_or(TransitionError::NotAuthenticated)?;

            let mut next = state.clone();
            let mut effects = vec![];

            let existing = next.active.filter(|id| next.conversation(*id).is_some());
            let conversation_id = match existing {
                Some(id) => id,
                None => {
                    let conversation = Conversation::start(new_conversation_id, &text, now);
                    effects.push(Effect::notify(StoreEvent::ConversationCreated {
                        conversation: conversation.summary(),
                    }));
                    effects.push(Effect::notify(StoreEvent::ActiveChanged {
                        conversation_id: Some(new_conversation_id),
                    }));
                    next.conversations.insert(0, conversation);
                    next.active = Some(new_conversation_id);
                    next.visible.clear();
                    new_conversation_id
                }
            };

            let message = Message::user(text.clone());
            if let Some(conversation) = next.conversation_mut(conversation_id) {
                conversation.append(message.clone());
            }
            next.visible.push(message.clone());
            next.pending = Some(PendingRequest {
                request_id,
                conversation_id,
                auth: auth.clone(),
            });

            effects.push(Effect::notify(StoreEvent::MessageAppended {
                conversation_id,
                message,
                visible: true,
            }));
            effects.push(Effect::pending_changed(true));
            effects.push(Effect::RequestCompletion(CompletionRequest {
                request_id,
                conversation_id,
                prompt: text,
                auth,
            }));

            Ok(TransitionResult::new(next).with_effects(effects))
        }

        // ============================================================
        // Completion results
        // ============================================================

        // Matched by request id; appended to the conversation captured at issue time
        Event::CompletionSucceeded { request_id, reply } => {
            let pending = matching_pending(state, request_id)?;
            let mut next = state.clone();
            next.pending = None;

            let message = Message::assistant(reply);
            let visible = next.active == Some(pending.conversation_id);
            let Some(conversation) = next.conversation_mut(pending.conversation_id) else {
                // Deleting a conversation abandons its request, so this is
                // unreachable through the store; still never leave pending set.
                return Ok(TransitionResult::new(next)
                    .with_effect(Effect::pending_changed(false))
                    .with_effect(Effect::notify(StoreEvent::ResponseDiscarded {
                        request_id,
                        conversation_id: pending.conversation_id,
                    })));
            };
            conversation.append(message.clone());
            if visible {
                next.visible.push(message.clone());
            }

            Ok(TransitionResult::new(next)
                .with_effect(Effect::notify(StoreEvent::MessageAppended {
                    conversation_id: pending.conversation_id,
                    message,
                    visible,
                }))
                .with_effect(Effect::pending_changed(false)))
        }

        // Nothing is appended; the trailing user message stays unanswered
        Event::CompletionFailed { request_id, error } => {
            let pending = matching_pending(state, request_id)?;
            let mut next = state.clone();
            next.pending = None;

            Ok(TransitionResult::new(next)
                .with_effect(Effect::pending_changed(false))
                .with_effect(Effect::notify(StoreEvent::ResponseFailed {
                    conversation_id: pending.conversation_id,
                    kind: error.kind,
                    message: error.message,
                })))
        }

        // The caller stopped waiting; only the matching request is released
        Event::CompletionAbandoned { request_id } => {
            let pending = matching_pending(state, request_id)?;
            let mut next = state.clone();
            next.pending = None;
            Ok(TransitionResult::new(next).with_effects(abandon(&pending)))
        }

        // ============================================================
        // Session
        // ============================================================

        // The pending request is abandoned; its reply will be discarded on arrival
        Event::SessionEnded => {
            let mut next = state.clone();
            match next.pending.take() {
                Some(pending) => Ok(TransitionResult::new(next).with_effects(abandon(&pending))),
                None => Ok(TransitionResult::new(next)),
            }
        }
    }
}

fn matching_pending(
    state: &ConversationState,
    request_id: RequestId,
) -> Result<PendingRequest, TransitionError> {
    state
        .pending
        .as_ref()
        .filter(|p| p.request_id == request_id)
        .cloned()
        .ok_or(TransitionError::StaleResponse(request_id))
}

fn abandon(pending: &PendingRequest) -> [Effect; 2] {
    [
        Effect::pending_changed(false),
        Effect::notify(StoreEvent::RequestAbandoned {
            request_id: pending.request_id,
            conversation_id: pending.conversation_id,
        }),
    ]
}

/// Whether the effects end with an assistant reply being stored
pub(crate) fn appended_reply(effects: &[Effect]) -> Option<(ConversationId, Message)> {
    effects.iter().find_map(|effect| match effect {
        Effect::Notify(StoreEvent::MessageAppended {
            conversation_id,
            message,
            ..
        }) if message.role == Role::Assistant => Some((*conversation_id, message.clone())),
        _ => None,
    })
}
