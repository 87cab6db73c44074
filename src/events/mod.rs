use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod streams;
pub use streams::{EventStream, EventStreamStats, Subscriber};

pub const EVENT_CHANNEL_CAPACITY: usize = 64;
pub const EVENT_BUFFER_SIZE: usize = 16;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The user asked to log out
    UserRequested,
    /// The background refresh could not renew the token
    RefreshFailed,
}

/// Session lifecycle notifications.
///
/// Views subscribe to these to re-run the route guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The startup check resolved
    Initialized { authenticated: bool },
    /// A new access token was stored
    TokenRefreshed { expires_at: Option<DateTime<Utc>> },
    /// The session was reset to anonymous; `target` is the provider's
    /// logout URL the consumer must navigate to
    LoggedOut { reason: LogoutReason, target: String },
    /// Interactive login was requested; `target` is the provider URL
    LoginRequested { target: String },
}

impl SessionEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Initialized { .. } => "initialized",
            SessionEvent::TokenRefreshed { .. } => "token_refreshed",
            SessionEvent::LoggedOut { .. } => "logged_out",
            SessionEvent::LoginRequested { .. } => "login_requested",
        }
    }
}
