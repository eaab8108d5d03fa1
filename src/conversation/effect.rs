//! Effects produced by state transitions

use crate::completion::CompletionRequest;
use crate::runtime::StoreEvent;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send the prompt to the completion service
    RequestCompletion(CompletionRequest),

    /// Notify observers
    Notify(StoreEvent),
}

impl Effect {
    pub fn notify(event: StoreEvent) -> Self {
        Effect::Notify(event)
    }

    pub fn pending_changed(pending: bool) -> Self {
        Effect::Notify(StoreEvent::PendingChanged { pending })
    }
}
