use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the session layer
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the identity provider client and the session layer
#[derive(Error, Debug)]
pub enum Error {
    /// The identity provider could not be reached or answered unexpectedly
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The identity provider answered with an error status
    #[error("Identity provider rejected {operation} ({status}): {detail}")]
    ProviderRejected {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    /// A token or its claims could not be decoded
    #[error("Token invalid: {0}")]
    TokenInvalid(String),

    /// Renewing the access token failed
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The login callback did not match a pending login
    #[error("Login callback rejected: {0}")]
    CallbackRejected(String),

    /// A provider call did not complete in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Stable code for programmatic handling
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ProviderUnavailable(_) | Error::Http(_) => ErrorCode::ProviderUnavailable,
            Error::ProviderRejected { .. } => ErrorCode::ProviderRejected,
            Error::TokenInvalid(_) | Error::Serialization(_) => ErrorCode::AuthTokenInvalid,
            Error::RefreshFailed(_) => ErrorCode::AuthRefreshFailed,
            Error::CallbackRejected(_) => ErrorCode::AuthCallbackRejected,
            Error::Timeout(_) => ErrorCode::NetworkTimeout,
            Error::Config(_) | Error::Url(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// Category used to pick a handling strategy
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ProviderUnavailable(_) | Error::Http(_) => ErrorCategory::Network,
            Error::ProviderRejected { .. }
            | Error::TokenInvalid(_)
            | Error::RefreshFailed(_)
            | Error::CallbackRejected(_) => ErrorCategory::Authentication,
            Error::Timeout(_) => ErrorCategory::Timeout,
            Error::Config(_) | Error::Url(_) => ErrorCategory::Configuration,
            Error::Serialization(_) => ErrorCategory::Serialization,
        }
    }
}

/// Error codes for the different failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ProviderUnavailable,
    ProviderRejected,
    AuthTokenInvalid,
    AuthRefreshFailed,
    AuthCallbackRejected,
    NetworkTimeout,
    ConfigInvalid,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code_str = match self {
            ErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorCode::ProviderRejected => "PROVIDER_REJECTED",
            ErrorCode::AuthTokenInvalid => "AUTH_TOKEN_INVALID",
            ErrorCode::AuthRefreshFailed => "AUTH_REFRESH_FAILED",
            ErrorCode::AuthCallbackRejected => "AUTH_CALLBACK_REJECTED",
            ErrorCode::NetworkTimeout => "NETWORK_TIMEOUT",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
        };
        write!(f, "{}", code_str)
    }
}

/// Broad error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Authentication,
    Configuration,
    Timeout,
    Serialization,
}
