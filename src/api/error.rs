use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::providers::Redirect;

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action.";
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred";

/// Failure of a backend request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The backend rejected the credentials, or they could not be renewed.
    /// The caller must follow `redirect` to log in again.
    #[error("Session expired. Please login again.")]
    SessionExpired { redirect: Redirect },

    /// Authenticated but not allowed; the session is left alone
    #[error("You do not have permission to perform this action.")]
    Forbidden,

    /// Any other non-success status
    #[error("{message} ({status})")]
    Status {
        status: u16,
        message: String,
        error: Option<String>,
    },

    /// The request never produced a response
    #[error("Request failed: {0}")]
    Transport(String),

    /// A success response whose body is not valid JSON
    #[error("Invalid response body: {0}")]
    Decode(String),
}

/// Serialized form handed to views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiError {
    /// HTTP status the error corresponds to; transport failures report 500
    pub fn status(&self) -> u16 {
        match self {
            ApiError::SessionExpired { .. } => 401,
            ApiError::Forbidden => 403,
            ApiError::Status { status, .. } => *status,
            ApiError::Transport(_) | ApiError::Decode(_) => 500,
        }
    }

    /// Transport failures and server errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::SessionExpired { .. } | ApiError::Forbidden | ApiError::Decode(_) => false,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (message, error) = match self {
            ApiError::SessionExpired { .. } => (SESSION_EXPIRED_MESSAGE.to_string(), None),
            ApiError::Forbidden => (FORBIDDEN_MESSAGE.to_string(), None),
            ApiError::Status { message, error, .. } => (message.clone(), error.clone()),
            ApiError::Transport(detail) | ApiError::Decode(detail) => {
                (UNEXPECTED_MESSAGE.to_string(), Some(detail.clone()))
            }
        };
        ErrorBody {
            status: self.status(),
            message,
            error,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}
