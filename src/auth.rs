//! Authentication-token lifecycle
//!
//! `SessionManager` is the single source of truth for "is the user
//! authenticated". Token decoding and the expiry predicate are pure functions
//! in `claims`; persistence goes through the `CredentialStore` seam.

mod claims;
mod client;
mod clock;
mod error;
mod session;
mod store;

pub use claims::{decode, is_expired, Claims, Credential, DecodeError, Identity};
pub use client::{AuthApi, HttpAuthClient, LoginRequest, SignupRequest};
pub use clock::{Clock, SystemClock};
pub use error::AuthError;
pub use session::{AuthStatus, AuthorizationContext, SessionManager, SessionState};
pub use store::{CredentialStore, DbCredentialStore, StoreError, TOKEN_SLOT};
