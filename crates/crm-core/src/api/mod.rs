//! Access to the CRM REST API.

mod client;
mod error;
mod types;

pub use client::{
    ApiClient, ApiRequest, ApiResponse, BOOTSTRAP_CHECK_PATH, BOOTSTRAP_PATH, LOGIN_PATH,
    LOGOUT_PATH, REFRESH_PATH, REGISTER_PATH,
};
pub use error::{ApiError, ApiErrorKind, ApiResult, FieldError};
pub use reqwest::Method;
pub use types::{
    BootstrapRequest, BootstrapStatus, LoginRequest, LoginResponse, LogoutRequest,
    RefreshRequest, RefreshResponse, RegisterRequest, is_valid_email,
};
