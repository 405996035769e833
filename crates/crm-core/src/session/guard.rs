//! Route protection.
//!
//! Protected views render only for a signed-in user; admin-only views
//! additionally require the admin role. While the session is still
//! loading nothing is decided.

use tokio::sync::watch;

use super::state::{SessionHandle, SessionState};
use crate::navigation::{Navigator, Route};

/// Outcome of checking a route against the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Show the view.
    Render,
    /// Session not yet known; show a loading placeholder.
    Pending,
    /// Send the user elsewhere.
    Redirect(Route),
}

pub fn evaluate(route: &Route, state: &SessionState) -> GuardDecision {
    if !route.is_protected() {
        return GuardDecision::Render;
    }

    match state {
        SessionState::Loading => GuardDecision::Pending,
        SessionState::Anonymous => GuardDecision::Redirect(Route::Login),
        SessionState::Authenticated(user) => {
            if route.requires_admin() && !user.is_admin() {
                GuardDecision::Redirect(Route::Dashboard)
            } else {
                GuardDecision::Render
            }
        }
    }
}

/// A protected view bound to the session, re-evaluated on every change.
pub struct GuardedView {
    route: Route,
    rx: watch::Receiver<SessionState>,
}

impl GuardedView {
    pub fn new(route: Route, session: &SessionHandle) -> Self {
        Self {
            route,
            rx: session.subscribe(),
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn decision(&self) -> GuardDecision {
        evaluate(&self.route, &self.rx.borrow())
    }

    /// Waits for the next session change and returns the new decision.
    /// Returns `None` once the session is gone.
    pub async fn changed(&mut self) -> Option<GuardDecision> {
        self.rx.changed().await.ok()?;
        let decision = evaluate(&self.route, &self.rx.borrow_and_update());
        Some(decision)
    }

    /// Waits out `Loading`, then renders or redirects.
    ///
    /// Returns `true` when the view may render.
    pub async fn enter(&mut self, navigator: &dyn Navigator) -> bool {
        let mut decision = self.decision();
        while decision == GuardDecision::Pending {
            match self.changed().await {
                Some(next) => decision = next,
                None => return false,
            }
        }

        match decision {
            GuardDecision::Render => true,
            GuardDecision::Redirect(target) => {
                tracing::debug!(from = %self.route, to = %target, "guard redirect");
                navigator.navigate(target);
                false
            }
            GuardDecision::Pending => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::navigation::NavigationHistory;
    use crate::session::{CredentialStore, Role, Session, User};

    fn user(role: Role) -> User {
        User {
            id: "u1".to_string(),
            name: "Ann".to_string(),
            email: String::new(),
            role,
        }
    }

    #[test]
    fn test_public_routes_always_render() {
        for state in [
            SessionState::Loading,
            SessionState::Anonymous,
            SessionState::Authenticated(user(Role::Agent)),
        ] {
            assert_eq!(evaluate(&Route::Login, &state), GuardDecision::Render);
            assert_eq!(evaluate(&Route::Bootstrap, &state), GuardDecision::Render);
        }
    }

    #[test]
    fn test_protected_route_decisions() {
        assert_eq!(
            evaluate(&Route::Leads, &SessionState::Loading),
            GuardDecision::Pending
        );
        assert_eq!(
            evaluate(&Route::Leads, &SessionState::Anonymous),
            GuardDecision::Redirect(Route::Login)
        );
        assert_eq!(
            evaluate(
                &Route::Lead("42".to_string()),
                &SessionState::Authenticated(user(Role::Agent))
            ),
            GuardDecision::Render
        );
    }

    #[test]
    fn test_register_requires_admin() {
        assert_eq!(
            evaluate(
                &Route::Register,
                &SessionState::Authenticated(user(Role::Agent))
            ),
            GuardDecision::Redirect(Route::Dashboard)
        );
        assert_eq!(
            evaluate(
                &Route::Register,
                &SessionState::Authenticated(user(Role::Admin))
            ),
            GuardDecision::Render
        );
        assert_eq!(
            evaluate(&Route::Register, &SessionState::Anonymous),
            GuardDecision::Redirect(Route::Login)
        );
    }

    #[tokio::test]
    async fn test_enter_waits_for_rehydration() {
        let store = Arc::new(CredentialStore::in_memory());
        store.save(&Session {
            user: Some(user(Role::Agent)),
            access_token: Some("A1".to_string()),
            refresh_token: Some("R1".to_string()),
        });
        let session = SessionHandle::new(store);
        let history = NavigationHistory::new();

        let mut view = GuardedView::new(Route::Tasks, &session);
        assert_eq!(view.decision(), GuardDecision::Pending);

        let rehydrate = {
            let session = session.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                session.rehydrate();
            }
        };
        let (allowed, ()) = tokio::join!(view.enter(&history), rehydrate);

        assert!(allowed);
        assert!(history.routes().is_empty());
    }

    #[tokio::test]
    async fn test_view_reacts_to_session_end() {
        let store = Arc::new(CredentialStore::in_memory());
        let session = SessionHandle::new(store);
        session.establish(&Session {
            user: Some(user(Role::Admin)),
            access_token: Some("A1".to_string()),
            refresh_token: None,
        });

        let mut view = GuardedView::new(Route::Customers, &session);
        assert_eq!(view.decision(), GuardDecision::Render);

        session.end();
        assert_eq!(
            view.changed().await,
            Some(GuardDecision::Redirect(Route::Login))
        );
    }

    #[tokio::test]
    async fn test_enter_redirects_anonymous_to_login() {
        let session = SessionHandle::new(Arc::new(CredentialStore::in_memory()));
        session.rehydrate();
        let history = NavigationHistory::new();

        let mut view = GuardedView::new(Route::Users, &session);
        assert!(!view.enter(&history).await);
        assert_eq!(history.routes(), vec![Route::Login]);
    }
}
