//! CLI command handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use crm_core::api::{ApiClient, ApiError, ApiErrorKind};
use crm_core::config::Config;
use crm_core::navigation::{NavigationHistory, Navigator, Route};
use crm_core::session::{CredentialStore, GuardedView, SessionController, SessionHandle};

pub mod auth;
pub mod config;
pub mod request;

/// Everything a session-aware command needs, wired once per invocation.
pub struct App {
    pub controller: SessionController,
    pub history: Arc<NavigationHistory>,
}

impl App {
    pub fn open(config: &Config) -> Result<Self> {
        let store = Arc::new(CredentialStore::open_default());
        let session = SessionHandle::new(store);
        let history = Arc::new(NavigationHistory::new());
        let navigator: Arc<dyn Navigator> = Arc::clone(&history) as Arc<dyn Navigator>;

        let api = ApiClient::from_config(config, session, Arc::clone(&navigator))
            .context("create API client")?;
        let controller = SessionController::new(Arc::new(api), navigator);
        controller.initialize();

        tracing::debug!(api_url = %config.effective_api_url(), "session rehydrated");
        Ok(Self {
            controller,
            history,
        })
    }

    /// Runs the route guard for `route`. Returns `true` when access is allowed;
    /// otherwise the redirect is recorded in `history`.
    pub async fn enter(&self, route: Route) -> bool {
        let mut view = GuardedView::new(route, self.controller.session());
        view.enter(self.history.as_ref()).await
    }
}

/// Turns an API error into a CLI error, adding a hint for auth failures.
pub fn explain(err: ApiError) -> anyhow::Error {
    let hint = match err.kind {
        ApiErrorKind::SessionExpired => {
            Some("Your session has expired. Run `crm login --email <EMAIL>` to sign in again.")
        }
        ApiErrorKind::Unauthorized => Some("Not authorized. Run `crm login --email <EMAIL>`."),
        _ => None,
    };

    let error = anyhow::Error::new(err);
    match hint {
        Some(hint) => error.context(hint),
        None => error,
    }
}
