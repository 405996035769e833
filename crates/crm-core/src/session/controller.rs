//! Login, logout, registration and first-run bootstrap.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::watch;

use super::state::{Session, SessionHandle, SessionState, User};
use crate::api::{
    ApiClient, ApiRequest, ApiResult, BOOTSTRAP_CHECK_PATH, BOOTSTRAP_PATH, BootstrapRequest,
    BootstrapStatus, LOGIN_PATH, LOGOUT_PATH, LoginRequest, LoginResponse, LogoutRequest,
    REGISTER_PATH, RegisterRequest,
};
use crate::navigation::{Navigator, Route};

/// Owns the session verbs and exposes who is signed in.
pub struct SessionController {
    api: Arc<ApiClient>,
    session: SessionHandle,
    navigator: Arc<dyn Navigator>,
}

impl SessionController {
    pub fn new(api: Arc<ApiClient>, navigator: Arc<dyn Navigator>) -> Self {
        let session = api.session().clone();
        Self {
            api,
            session,
            navigator,
        }
    }

    /// Startup: restores the cached user before anything protected renders.
    pub fn initialize(&self) -> SessionState {
        self.session.rehydrate()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Signs in and persists the returned tokens and profile.
    ///
    /// # Errors
    /// Returns the backend error unchanged; the session is left untouched.
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        let body = json!(LoginRequest { email, password });
        let response = self
            .api
            .send(ApiRequest::post(LOGIN_PATH, body).without_refresh())
            .await?;
        let payload: LoginResponse = response.json()?;

        self.session.establish(&Session {
            user: Some(payload.user.clone()),
            access_token: Some(payload.access_token.clone()),
            refresh_token: payload.refresh_token.clone(),
        });
        tracing::info!(user_id = %payload.user.id, role = %payload.user.role, "logged in");

        Ok(payload)
    }

    /// Signs out locally, telling the backend on a best-effort basis.
    pub async fn logout(&self) {
        let body = json!(LogoutRequest {
            refresh_token: self.session.store().refresh_token(),
        });
        let request = ApiRequest::post(LOGOUT_PATH, body).without_refresh();

        if let Err(err) = self.api.send(request).await {
            tracing::debug!(error = %err, "logout notification failed; clearing session anyway");
        }

        self.session.end();
        self.navigator.navigate(Route::Login);
        tracing::info!("logged out");
    }

    /// Creates another account. Never changes who is signed in.
    ///
    /// # Errors
    /// Returns a `Validation` error before sending, or the backend error.
    pub async fn register_user(&self, request: &RegisterRequest) -> ApiResult<Value> {
        request.validate()?;
        let response = self
            .api
            .send(ApiRequest::post(REGISTER_PATH, json!(request)))
            .await?;
        Ok(response.body)
    }

    /// Whether first-run admin creation is open. Failures read as `false`.
    pub async fn bootstrap_status(&self) -> bool {
        match self
            .api
            .send(ApiRequest::get(BOOTSTRAP_CHECK_PATH).without_refresh())
            .await
            .and_then(|response| response.json::<BootstrapStatus>())
        {
            Ok(status) => status.can_bootstrap,
            Err(err) => {
                tracing::warn!(error = %err, "bootstrap status check failed");
                false
            }
        }
    }

    /// Creates the first administrator. Does not sign in.
    ///
    /// # Errors
    /// Returns a `Validation` error before sending, or the backend error.
    pub async fn bootstrap_admin(&self, request: &BootstrapRequest) -> ApiResult<Value> {
        request.validate()?;
        let response = self
            .api
            .send(ApiRequest::post(BOOTSTRAP_PATH, json!(request)).without_refresh())
            .await?;
        Ok(response.body)
    }
}
