//! ChatBuddy client core
//!
//! Session and conversation state for the ChatBuddy chat client: the
//! authentication-token lifecycle (`auth`) and the conversation store backing
//! the chat screen (`conversation` + `runtime`). Page rendering and routing
//! live in the UI layer; this crate only owns state and its transitions.

pub mod auth;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod db;
pub mod runtime;

pub use auth::{
    AuthApi, AuthError, AuthStatus, AuthorizationContext, Claims, Credential, CredentialStore,
    HttpAuthClient, Identity, LoginRequest, SessionManager, SignupRequest,
};
pub use completion::{
    CannedCompletionService, CompletionError, CompletionErrorKind, CompletionRequest,
    CompletionService, HttpCompletionService, LoggingCompletionService,
};
pub use config::ClientConfig;
pub use conversation::{Conversation, ConversationId, Message, Role};
pub use runtime::{
    ChatError, ConversationSnapshot, ConversationStore, IgnoreReason, StoreEvent, SubmitOutcome,
};
