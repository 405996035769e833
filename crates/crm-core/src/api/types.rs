//! Wire types for the `/auth` endpoints.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, FieldError};
use crate::session::{Role, User};

/// Same pattern the registration forms use.
static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").ok());

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Payload of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// New account created by an administrator.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl RegisterRequest {
    /// Applies the form rules before anything is sent.
    ///
    /// # Errors
    /// Returns a `Validation` error listing every failed field.
    pub fn validate(&self) -> Result<(), ApiError> {
        into_result(validate_account(&self.name, &self.email, &self.password))
    }
}

/// First administrator, created while no admin exists.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl BootstrapRequest {
    /// Applies the form rules before anything is sent.
    ///
    /// # Errors
    /// Returns a `Validation` error listing every failed field.
    pub fn validate(&self) -> Result<(), ApiError> {
        into_result(validate_account(&self.name, &self.email, &self.password))
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapStatus {
    #[serde(default)]
    pub can_bootstrap: bool,
}

fn validate_account(name: &str, email: &str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push(FieldError {
            field: "name",
            message: "Name is required".to_string(),
        });
    }

    if email.trim().is_empty() {
        errors.push(FieldError {
            field: "email",
            message: "Email is required".to_string(),
        });
    } else if !is_valid_email(email) {
        errors.push(FieldError {
            field: "email",
            message: "Invalid email address".to_string(),
        });
    }

    if password.is_empty() {
        errors.push(FieldError {
            field: "password",
            message: "Password is required".to_string(),
        });
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError {
            field: "password",
            message: format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        });
    }

    errors
}

fn into_result(errors: Vec<FieldError>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(errors))
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiErrorKind;

    #[test]
    fn test_login_response_with_optional_refresh() {
        let body = r#"{"accessToken":"A1","user":{"id":"u1","name":"Ann","role":"admin"}}"#;
        let parsed: LoginResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.access_token, "A1");
        assert!(parsed.refresh_token.is_none());
        assert_eq!(parsed.user.name, "Ann");
    }

    #[test]
    fn test_refresh_request_uses_camel_case() {
        let json = serde_json::to_value(RefreshRequest {
            refresh_token: "R1",
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"refreshToken": "R1"}));
    }

    #[test]
    fn test_register_request_serializes_role_lowercase() {
        let json = serde_json::to_value(RegisterRequest {
            name: "Bo".to_string(),
            email: "bo@example.com".to_string(),
            password: "secret".to_string(),
            role: Role::Agent,
        })
        .unwrap();
        assert_eq!(json["role"], "agent");
    }

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("First.Last+crm@Example.CO"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("not-an-email"));
    }

    #[test]
    fn test_bootstrap_validation_collects_every_field() {
        let err = BootstrapRequest {
            name: "  ".to_string(),
            email: "nope".to_string(),
            password: "12345".to_string(),
        }
        .validate()
        .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Validation);
        let fields: Vec<_> = err.fields.iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["name", "email", "password"]);
    }

    #[test]
    fn test_email_is_validated_as_sent() {
        let err = RegisterRequest {
            name: "Bo".to_string(),
            email: " bo@example.com ".to_string(),
            password: "secret".to_string(),
            role: Role::Agent,
        }
        .validate()
        .unwrap_err();

        assert_eq!(err.fields.len(), 1);
        assert_eq!(err.fields[0].field, "email");
        assert_eq!(err.fields[0].message, "Invalid email address");
    }

    #[test]
    fn test_register_validation_accepts_valid_form() {
        let request = RegisterRequest {
            name: "Bo".to_string(),
            email: "bo@example.com".to_string(),
            password: "secret".to_string(),
            role: Role::Agent,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_bootstrap_status_defaults_to_false() {
        let status: BootstrapStatus = serde_json::from_str("{}").unwrap();
        assert!(!status.can_bootstrap);
    }
}
