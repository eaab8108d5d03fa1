//! Conversation store executor

use super::{ChatError, ConversationSnapshot, IgnoreReason, StoreEvent, SubmitOutcome};
use crate::auth::{AuthorizationContext, CredentialStore, SessionManager};
use crate::completion::{CompletionError, CompletionRequest, CompletionService};
use crate::conversation::transition::appended_reply;
use crate::conversation::{
    transition, Conversation, ConversationId, ConversationState, Effect, Event, Message,
    RequestId, TransitionError,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 128;

/// Owner of the conversation list, the active pointer, and the in-flight request.
///
/// Every mutation goes through `transition` while the state lock is held, so
/// check-and-set of the pending request is atomic. The lock is never held
/// across the completion call.
pub struct ConversationStore<S, C>
where
    S: CredentialStore,
    C: CompletionService + ?Sized,
{
    session: Arc<SessionManager<S>>,
    completion: Arc<C>,
    state: Mutex<ConversationState>,
    events: broadcast::Sender<StoreEvent>,
}

impl<S, C> ConversationStore<S, C>
where
    S: CredentialStore,
    C: CompletionService + ?Sized,
{
    pub fn new(session: Arc<SessionManager<S>>, completion: Arc<C>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            session,
            completion,
            state: Mutex::new(ConversationState::default()),
            events,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager<S>> {
        &self.session
    }

    /// Subscribe to store notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let state = self.read_state();
        ConversationSnapshot {
            conversations: state.conversations.iter().map(Conversation::summary).collect(),
            active: state.active,
            messages: state.visible.clone(),
            pending: state.is_pending(),
        }
    }

    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.read_state().conversation(id).cloned()
    }

    pub fn active_conversation_id(&self) -> Option<ConversationId> {
        self.read_state().active
    }

    pub fn visible_messages(&self) -> Vec<Message> {
        self.read_state().visible.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.read_state().is_pending()
    }

    /// Clear the active pointer. Nothing is created until the next submission.
    pub fn start_new_conversation(&self) {
        if let Err(e) = self.dispatch(Event::StartNew) {
            tracing::warn!(error = %e, "Failed to start new conversation");
        }
    }

    pub fn select_conversation(&self, id: ConversationId) -> Result<(), ChatError> {
        self.dispatch(Event::Select { id }).map_err(|e| {
            tracing::debug!(conv_id = %id, error = %e, "Select rejected");
            ChatError::from(e)
        })?;
        Ok(())
    }

    /// Clear the visible messages of the active conversation; its record is kept
    pub fn clear_active_conversation(&self) {
        if let Err(e) = self.dispatch(Event::ClearActive) {
            tracing::warn!(error = %e, "Failed to clear active conversation");
        }
    }

    pub fn delete_conversation(&self, id: ConversationId) -> Result<(), ChatError> {
        self.dispatch(Event::Delete { id })?;
        tracing::info!(conv_id = %id, "Conversation deleted");
        Ok(())
    }

    /// Submit a user message and wait for the reply.
    ///
    /// The user message is appended before the completion call starts. Other
    /// intents may run while this call is suspended; the reply is appended to
    /// the conversation it was issued for. Dropping the returned future
    /// before it resolves abandons the request.
    pub async fn submit_message(&self, text: &str) -> Result<SubmitOutcome, ChatError> {
        self.session.enforce_expiry().await;

        let request_id = RequestId::new();
        let new_conversation_id = ConversationId::new();
        let now = self.session.now();
        let submitted = self.dispatch_with(|current| Event::Submit {
            text: text.to_string(),
            auth: current.cloned(),
            request_id,
            new_conversation_id,
            now,
        });

        let effects = match submitted {
            Ok(effects) => effects,
            Err(TransitionError::EmptyMessage) => {
                tracing::debug!("Ignoring empty message");
                return Ok(SubmitOutcome::Ignored(IgnoreReason::EmptyMessage));
            }
            Err(TransitionError::RequestPending) => {
                tracing::debug!("Ignoring submission while a reply is pending");
                return Ok(SubmitOutcome::Ignored(IgnoreReason::RequestPending));
            }
            Err(e) => {
                tracing::debug!(error = %e, "Submission rejected");
                return Err(e.into());
            }
        };

        let Some(request) = effects.into_iter().find_map(|effect| match effect {
            Effect::RequestCompletion(request) => Some(request),
            Effect::Notify(_) => None,
        }) else {
            tracing::error!("Accepted submission produced no completion request");
            return Err(ChatError::Internal("no completion request issued"));
        };

        tracing::info!(
            request_id = %request.request_id,
            conv_id = %request.conversation_id,
            service = self.completion.name(),
            "Requesting completion"
        );
        let guard = PendingGuard::new(self, request.request_id);
        let result = self.completion.complete(&request).await;
        guard.disarm();
        self.resolve(&request, result)
    }

    /// Abandon the pending request if it was issued under a session that has
    /// since ended. Returns true if a request was abandoned.
    pub fn handle_session_change(&self) -> bool {
        let mut state = self.lock_state();
        let current = self.session.authorization_context();
        self.reconcile(&mut state, current.as_ref())
    }

    /// Follow session changes in the background so abandonment is announced
    /// to subscribers as soon as the session ends, not at the next read.
    /// The task ends when the store is dropped.
    pub fn spawn_session_watcher(self: &Arc<Self>) -> JoinHandle<()>
    where
        S: 'static,
        C: 'static,
    {
        let store = Arc::downgrade(self);
        let mut rx = self.session.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.handle_session_change();
            }
            tracing::debug!("Session watcher stopped");
        })
    }

    fn resolve(
        &self,
        request: &CompletionRequest,
        result: Result<String, CompletionError>,
    ) -> Result<SubmitOutcome, ChatError> {
        let conversation_id = request.conversation_id;
        let failure = result.as_ref().err().cloned();
        let event = match result {
            Ok(reply) => Event::CompletionSucceeded {
                request_id: request.request_id,
                reply,
            },
            Err(error) => Event::CompletionFailed {
                request_id: request.request_id,
                error,
            },
        };

        match self.dispatch(event) {
            Ok(effects) => {
                if let Some((conversation_id, message)) = appended_reply(&effects) {
                    return Ok(SubmitOutcome::Replied {
                        conversation_id,
                        message,
                    });
                }
                match failure {
                    Some(source) => Err(ChatError::ResponseFailed {
                        conversation_id,
                        source,
                    }),
                    None => Ok(SubmitOutcome::Discarded { conversation_id }),
                }
            }
            Err(TransitionError::StaleResponse(request_id)) => {
                tracing::warn!(
                    request_id = %request_id,
                    conv_id = %conversation_id,
                    "Discarding response for abandoned request"
                );
                self.publish(StoreEvent::ResponseDiscarded {
                    request_id,
                    conversation_id,
                });
                Ok(SubmitOutcome::Discarded { conversation_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release the pending request of a submitter that stopped waiting
    fn abandon(&self, request_id: RequestId) {
        match self.dispatch(Event::CompletionAbandoned { request_id }) {
            Ok(_) => {
                tracing::info!(request_id = %request_id, "Submitter went away, abandoning request");
            }
            // Already resolved or abandoned by a session change
            Err(TransitionError::StaleResponse(_)) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to abandon request"),
        }
    }

    fn dispatch(&self, event: Event) -> Result<Vec<Effect>, TransitionError> {
        self.dispatch_with(|_| event)
    }

    /// Reconcile with the session, then apply the event built from the
    /// authorization context read under the lock. Notifications are published
    /// before the lock is released so observers see them in order.
    fn dispatch_with(
        &self,
        make_event: impl FnOnce(Option<&AuthorizationContext>) -> Event,
    ) -> Result<Vec<Effect>, TransitionError> {
        let mut state = self.lock_state();
        let current = self.session.authorization_context();
        self.reconcile(&mut state, current.as_ref());

        let result = transition(&state, make_event(current.as_ref()))?;
        *state = result.new_state;
        for effect in &result.effects {
            if let Effect::Notify(event) = effect {
                self.publish(event.clone());
            }
        }
        Ok(result.effects)
    }

    fn reconcile(
        &self,
        state: &mut ConversationState,
        current: Option<&AuthorizationContext>,
    ) -> bool {
        let stale = state
            .pending
            .as_ref()
            .is_some_and(|pending| Some(&pending.auth) != current);
        if !stale {
            return false;
        }

        match transition(state, Event::SessionEnded) {
            Ok(result) => {
                *state = result.new_state;
                tracing::info!("Session ended, abandoning pending request");
                for effect in result.effects {
                    if let Effect::Notify(event) = effect {
                        self.publish(event);
                    }
                }
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to abandon pending request");
                false
            }
        }
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Lock for reading; a request from an ended session is abandoned first
    fn read_state(&self) -> MutexGuard<'_, ConversationState> {
        let mut state = self.lock_state();
        let current = self.session.authorization_context();
        self.reconcile(&mut state, current.as_ref());
        state
    }

    fn lock_state(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Abandons the pending request if `submit_message` is dropped mid-flight
struct PendingGuard<'a, S, C>
where
    S: CredentialStore,
    C: CompletionService + ?Sized,
{
    store: &'a ConversationStore<S, C>,
    request_id: Option<RequestId>,
}

impl<'a, S, C> PendingGuard<'a, S, C>
where
    S: CredentialStore,
    C: CompletionService + ?Sized,
{
    fn new(store: &'a ConversationStore<S, C>, request_id: RequestId) -> Self {
        Self {
            store,
            request_id: Some(request_id),
        }
    }

    fn disarm(mut self) {
        self.request_id = None;
    }
}

impl<S, C> Drop for PendingGuard<'_, S, C>
where
    S: CredentialStore,
    C: CompletionService + ?Sized,
{
    fn drop(&mut self) {
        if let Some(request_id) = self.request_id.take() {
            self.store.abandon(request_id);
        }
    }
}
