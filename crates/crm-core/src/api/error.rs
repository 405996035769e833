//! Structured API errors.

use std::fmt;

use serde_json::Value;

/// Categories of API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Non-success HTTP status other than 401
    HttpStatus,
    /// HTTP 401 returned by the backend
    Unauthorized,
    /// The session could not be recovered; re-authentication required
    SessionExpired,
    /// Rejected by client-side validation before any request was sent
    Validation,
    /// Connection failure
    Transport,
    /// Connection or request timeout
    Timeout,
    /// Response body did not match the expected shape
    Parse,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::HttpStatus => write!(f, "http_status"),
            ApiErrorKind::Unauthorized => write!(f, "unauthorized"),
            ApiErrorKind::SessionExpired => write!(f, "session_expired"),
            ApiErrorKind::Validation => write!(f, "validation"),
            ApiErrorKind::Transport => write!(f, "transport"),
            ApiErrorKind::Timeout => write!(f, "timeout"),
            ApiErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// A single failed form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Error returned by every API operation.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    /// HTTP status, when the server answered
    pub status: Option<u16>,
    /// One-line summary suitable for display
    pub message: String,
    /// Raw response body, kept verbatim for the caller
    pub details: Option<String>,
    /// Per-field messages for validation errors
    pub fields: Vec<FieldError>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            details: None,
            fields: Vec::new(),
        }
    }

    /// Creates an error from a non-success response.
    ///
    /// A `message` field in a JSON body is surfaced in the summary.
    pub fn http_status(status: u16, body: &str) -> Self {
        let kind = if status == 401 {
            ApiErrorKind::Unauthorized
        } else {
            ApiErrorKind::HttpStatus
        };

        let server_message = serde_json::from_str::<Value>(body).ok().and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error").and_then(|e| e.get("message")))
                .or_else(|| json.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        let message = match server_message {
            Some(msg) => format!("HTTP {status}: {msg}"),
            None => format!("HTTP {status}"),
        };

        Self {
            kind,
            status: Some(status),
            message,
            details: (!body.is_empty()).then(|| body.to_string()),
            fields: Vec::new(),
        }
    }

    /// Wraps the failure that ended the session, keeping its status and body.
    pub fn session_expired(cause: &ApiError) -> Self {
        Self {
            kind: ApiErrorKind::SessionExpired,
            status: cause.status,
            message: format!("Session expired: {}", cause.message),
            details: cause.details.clone(),
            fields: Vec::new(),
        }
    }

    pub fn validation(fields: Vec<FieldError>) -> Self {
        let message = fields
            .iter()
            .map(|f| format!("{}: {}", f.field, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            kind: ApiErrorKind::Validation,
            status: None,
            message,
            details: None,
            fields,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Parse, message)
    }

    /// Classifies a reqwest error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ApiErrorKind::Timeout, format!("Request timed out: {err}"))
        } else if err.is_decode() {
            Self::parse(format!("Failed to decode response: {err}"))
        } else {
            Self::new(ApiErrorKind::Transport, format!("Request failed: {err}"))
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ApiErrorKind::Unauthorized
    }

    /// True for failures that require signing in again.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self.kind,
            ApiErrorKind::Unauthorized | ApiErrorKind::SessionExpired
        )
    }

    /// Parsed JSON body of the failed response, if any.
    pub fn body_json(&self) -> Option<Value> {
        self.details
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result type for API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_extracts_server_message() {
        let err = ApiError::http_status(422, r#"{"message":"Email already in use"}"#);
        assert_eq!(err.kind, ApiErrorKind::HttpStatus);
        assert_eq!(err.status, Some(422));
        assert_eq!(err.message, "HTTP 422: Email already in use");
        assert_eq!(
            err.body_json().unwrap()["message"],
            "Email already in use"
        );
    }

    #[test]
    fn test_http_401_is_unauthorized() {
        let err = ApiError::http_status(401, "");
        assert!(err.is_unauthorized());
        assert_eq!(err.message, "HTTP 401");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_non_json_body_kept_verbatim() {
        let err = ApiError::http_status(502, "Bad Gateway");
        assert_eq!(err.message, "HTTP 502");
        assert_eq!(err.details.as_deref(), Some("Bad Gateway"));
    }

    #[test]
    fn test_session_expired_keeps_cause_status() {
        let cause = ApiError::http_status(400, r#"{"message":"Invalid refresh token"}"#);
        let err = ApiError::session_expired(&cause);
        assert_eq!(err.kind, ApiErrorKind::SessionExpired);
        assert_eq!(err.status, Some(400));
        assert!(err.is_auth_failure());
        assert!(err.message.contains("Invalid refresh token"));
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let err = ApiError::validation(vec![
            FieldError {
                field: "name",
                message: "Name is required".to_string(),
            },
            FieldError {
                field: "password",
                message: "Password must be at least 6 characters".to_string(),
            },
        ]);
        assert_eq!(
            err.message,
            "name: Name is required; password: Password must be at least 6 characters"
        );
    }
}
