//! HTTP client wrapper with bearer credentials and one-shot refresh on 401.
//!
//! Per request: `Sent → Done | Failed | Refreshing` on a first 401.
//! `Refreshing → Sent once more → Done | Failed`, or `Failed` with the
//! session cleared when the refresh itself fails.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{ApiError, ApiErrorKind, ApiResult};
use super::types::{RefreshRequest, RefreshResponse};
use crate::config::Config;
use crate::navigation::{Navigator, Route};
use crate::session::SessionHandle;

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const REGISTER_PATH: &str = "/auth/register";
pub const BOOTSTRAP_CHECK_PATH: &str = "/auth/bootstrap/check";
pub const BOOTSTRAP_PATH: &str = "/auth/bootstrap";

/// Descriptor of a request that may be re-issued once.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    retried: bool,
    refresh_on_401: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
            refresh_on_401: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Opts out of refresh-on-401; a 401 is returned as is.
    #[must_use]
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_401 = false;
        self
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

/// Successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// JSON body; `Null` when empty, a string when not JSON
    pub body: Value,
}

impl ApiResponse {
    /// Decodes the body into `T`.
    ///
    /// # Errors
    /// Returns a `Parse` error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| ApiError::parse(format!("Unexpected response shape: {e}")))
    }
}

/// CRM API client.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    session: SessionHandle,
    navigator: Arc<dyn Navigator>,
    dedupe_refresh: bool,
    /// Serializes refreshes; holds the last failed one for requests queued behind it.
    refresh_gate: tokio::sync::Mutex<Option<FailedRefresh>>,
}

/// A refresh that ended the session, keyed by the token it tried to replace.
#[derive(Debug)]
struct FailedRefresh {
    stale: Option<String>,
    error: ApiError,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session: SessionHandle,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
            session,
            navigator,
            dedupe_refresh: true,
            refresh_gate: tokio::sync::Mutex::new(None),
        }
    }

    /// Builds a client from configuration (base URL, timeout, refresh policy).
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(
        config: &Config,
        session: SessionHandle,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("build HTTP client")?;

        Ok(Self::new(config.effective_api_url(), session, navigator)
            .with_http_client(http)
            .with_refresh_dedupe(config.dedupe_refresh))
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Share one refresh between requests that hit 401 together.
    #[must_use]
    pub fn with_refresh_dedupe(mut self, enabled: bool) -> Self {
        self.dedupe_refresh = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// # Errors
    /// Returns the request's [`ApiError`] or a `Parse` error on shape mismatch.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// # Errors
    /// Returns the request's [`ApiError`] or a `Parse` error on shape mismatch.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.send(ApiRequest::post(path, to_body(body)?))
            .await?
            .json()
    }

    /// # Errors
    /// Returns the request's [`ApiError`] or a `Parse` error on shape mismatch.
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.send(ApiRequest::new(Method::PUT, path).with_body(to_body(body)?))
            .await?
            .json()
    }

    /// # Errors
    /// Returns the request's [`ApiError`] or a `Parse` error on shape mismatch.
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.send(ApiRequest::new(Method::PATCH, path).with_body(to_body(body)?))
            .await?
            .json()
    }

    /// # Errors
    /// Returns the request's [`ApiError`] or a `Parse` error on shape mismatch.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send(ApiRequest::new(Method::DELETE, path))
            .await?
            .json()
    }

    /// Sends a request, refreshing the access token and retrying once on 401.
    ///
    /// # Errors
    /// - the second 401 when the retried request is rejected again
    /// - `SessionExpired` when no refresh token is stored or the refresh call
    ///   fails; the session is cleared and the navigator sent to login
    /// - any other failure unchanged
    pub async fn send(&self, mut request: ApiRequest) -> ApiResult<ApiResponse> {
        let sent_token = self.session.store().access_token();

        match self.dispatch(&request, sent_token.as_deref()).await {
            Err(err) if err.is_unauthorized() && request.refresh_on_401 && !request.retried => {
                request.retried = true;
                tracing::debug!(path = %request.path, "received 401, refreshing access token");

                let fresh = self.refresh_or_expire(sent_token.as_deref()).await?;

                tracing::debug!(path = %request.path, "retrying with refreshed token");
                self.dispatch(&request, Some(&fresh)).await
            }
            result => result,
        }
    }

    /// Obtains a new access token, or ends the session when that fails.
    ///
    /// With de-duplication on, refreshes are serialized and the session is
    /// expired before the gate is released. A queued caller that finds the
    /// stored token already replaced reuses it; one whose stale token just
    /// failed to refresh gets that same error.
    async fn refresh_or_expire(&self, stale: Option<&str>) -> ApiResult<String> {
        if !self.dedupe_refresh {
            return self
                .refresh_access_token(stale)
                .await
                .map_err(|cause| self.expire_session(&cause));
        }

        let mut gate = self.refresh_gate.lock().await;

        if let Some(current) = self.session.store().access_token()
            && stale != Some(current.as_str())
        {
            tracing::debug!("access token already refreshed by a concurrent request");
            return Ok(current);
        }

        if let Some(failed) = gate.as_ref()
            && failed.stale.as_deref() == stale
        {
            tracing::debug!("refresh already failed for this token in a concurrent request");
            return Err(failed.error.clone());
        }

        match self.refresh_access_token(stale).await {
            Ok(token) => {
                *gate = None;
                Ok(token)
            }
            Err(cause) => {
                let error = self.expire_session(&cause);
                *gate = Some(FailedRefresh {
                    stale: stale.map(str::to_string),
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Calls the refresh endpoint with the stored refresh token.
    async fn refresh_access_token(&self, stale: Option<&str>) -> ApiResult<String> {
        let store = self.session.store();

        let Some(refresh_token) = store.refresh_token() else {
            return Err(ApiError::new(
                ApiErrorKind::Unauthorized,
                "No refresh token stored",
            ));
        };

        let request = ApiRequest::post(
            REFRESH_PATH,
            to_body(&RefreshRequest {
                refresh_token: &refresh_token,
            })?,
        )
        .without_refresh();

        // Exempt from the 401 interception above: dispatch directly.
        let response = self.dispatch(&request, stale).await?;
        let RefreshResponse { access_token } = response.json()?;

        store.set_access_token(&access_token);
        tracing::debug!("access token refreshed");
        Ok(access_token)
    }

    fn expire_session(&self, cause: &ApiError) -> ApiError {
        tracing::warn!(error = %cause, "token refresh failed; clearing session");
        self.session.end();
        self.navigator.navigate(Route::Login);
        ApiError::session_expired(cause)
    }

    /// Issues one HTTP round trip.
    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> ApiResult<ApiResponse> {
        let url = self.url_for(&request.path);
        tracing::debug!(method = %request.method, url = %url, bearer = token.is_some(), "dispatch");

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(&e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(&e))?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), url = %url, "request failed");
            return Err(ApiError::http_status(status.as_u16(), &text));
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            body: parse_body(&text),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> ApiResult<Value> {
    serde_json::to_value(body).map_err(|e| ApiError::parse(format!("Failed to encode body: {e}")))
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
