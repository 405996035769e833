//! Session data model and the observable session handle.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::store::CredentialStore;

/// Account role as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Agent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "agent" => Ok(Role::Agent),
            other => Err(format!("unknown role '{other}' (expected admin or agent)")),
        }
    }
}

/// Identity record of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.email.is_empty() {
            write!(f, "{} ({})", self.name, self.role)
        } else {
            write!(f, "{} <{}> ({})", self.name, self.email, self.role)
        }
    }
}

/// Credentials plus identity of the current profile.
///
/// `user` and `access_token` are not transactionally linked: a cached user
/// with a stale token is valid until the next 401 corrects it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// What consumers observe about the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Startup rehydration has not run yet.
    #[default]
    Loading,
    Anonymous,
    Authenticated(User),
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            SessionState::Loading | SessionState::Anonymous => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    fn from_user(user: Option<User>) -> Self {
        user.map_or(SessionState::Anonymous, SessionState::Authenticated)
    }
}

/// Session state owned by the application root and handed to every
/// component that reads or mutates it.
///
/// Cloning is cheap; all clones share the same store and state channel.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<CredentialStore>,
    state: watch::Sender<SessionState>,
}

impl SessionHandle {
    /// Creates a handle in the `Loading` state. Call [`SessionHandle::rehydrate`]
    /// before evaluating any protected view.
    pub fn new(store: Arc<CredentialStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            inner: Arc::new(Inner { store, state }),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Restores the user from the credential store. Never touches the network.
    pub fn rehydrate(&self) -> SessionState {
        let session = self.inner.store.load();
        let state = SessionState::from_user(session.user);
        tracing::debug!(
            authenticated = state.user().is_some(),
            "rehydrated session from credential store"
        );
        self.inner.state.send_replace(state.clone());
        state
    }

    /// Persists a freshly established session and publishes its user.
    pub(crate) fn establish(&self, session: &Session) {
        self.inner.store.save(session);
        self.inner
            .state
            .send_replace(SessionState::from_user(session.user.clone()));
    }

    /// Clears every stored credential and publishes `Anonymous`.
    pub(crate) fn end(&self) {
        self.inner.store.clear();
        self.inner.state.send_replace(SessionState::Anonymous);
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}
