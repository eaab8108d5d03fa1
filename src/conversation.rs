//! Conversation state machine
//!
//! Pure transitions in the Elm style: `transition(state, event)` returns the
//! next state and the effects to run. The runtime owns the state and performs
//! the effects.

mod effect;
pub mod event;
pub mod model;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use model::{
    derive_title, Conversation, ConversationId, ConversationSummary, Message, RequestId, Role,
    TITLE_ELLIPSIS, TITLE_MAX_CHARS,
};
pub use state::{ConversationState, PendingRequest};
pub use transition::{transition, TransitionError, TransitionResult};
