//! Session lifecycle: credential storage, reactive state, the controller
//! that logs users in and out, and route guards.

mod controller;
mod guard;
mod state;
mod store;

pub use controller::SessionController;
pub use guard::{GuardDecision, GuardedView, evaluate};
pub use state::{Role, Session, SessionHandle, SessionState, User};
pub use store::{
    ACCESS_KEY, AUTH_KEY, CredentialStore, FileBackend, MemoryBackend, REFRESH_KEY, StoreBackend,
    mask_token,
};
