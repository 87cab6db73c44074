use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::token::TokenClaims;
use crate::error::Result;

pub mod keycloak;

/// Navigation the caller must perform; login and logout never navigate by
/// themselves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "redirect")]
pub struct Redirect {
    /// Absolute URL to navigate to
    pub target: String,
}

impl Redirect {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// Result of a silent single-sign-on check
#[derive(Debug, Clone, PartialEq)]
pub enum SilentCheck {
    /// The provider holds a live session
    Authenticated { token: String, claims: TokenClaims },
    /// No session exists
    Anonymous,
}

/// Result of a token renewal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    /// False when the token was still valid beyond the threshold
    pub refreshed: bool,
}

/// Client for an external identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Check for an existing session without user interaction
    async fn init_silent(&self) -> Result<SilentCheck>;

    /// Where to send the user for interactive login
    async fn login(&self) -> Redirect;

    /// Drop the provider-side session and return the logout navigation
    async fn logout(&self) -> Redirect;

    /// Whether the current token expires within `threshold_secs`
    async fn is_token_expiring(&self, threshold_secs: i64) -> bool;

    /// Renew the token if it expires within `threshold_secs`
    async fn refresh_token(&self, threshold_secs: i64) -> Result<RefreshOutcome>;

    /// Current bearer credential
    async fn token(&self) -> Option<String>;

    /// Claims of the current bearer credential
    async fn claims(&self) -> Option<TokenClaims>;
}
