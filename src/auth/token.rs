use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Realm-level role grants carried in an access token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Decoded claims of an access token.
///
/// Only the claims the session layer reads are typed; everything else is
/// kept in `extra` so consumers can still reach it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user identifier)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Expiry, seconds since the UNIX epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued-at, seconds since the UNIX epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RealmAccess>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl TokenClaims {
    /// Decode the payload segment of a JWT without verifying its signature.
    ///
    /// The backend verifies every bearer token it receives; the session layer
    /// only reads claims for display and role gating.
    pub fn decode(token: &str) -> Result<Self> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_)) if !payload.is_empty() => payload,
            _ => return Err(Error::TokenInvalid("expected three JWT segments".into())),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::TokenInvalid(format!("invalid payload encoding: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| Error::TokenInvalid(format!("invalid payload: {}", e)))
    }

    /// Realm roles granted to the subject, in token order
    pub fn roles(&self) -> Vec<String> {
        self.realm_access
            .as_ref()
            .map(|access| access.roles.clone())
            .unwrap_or_default()
    }

    /// When the token expires (if the claim is present)
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }
}

/// Token set held by an identity-provider client
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    /// Bearer credential sent to the backend
    pub access_token: String,

    /// Used to renew the access token without user interaction
    pub refresh_token: Option<String>,

    /// Passed back to the provider as a logout hint
    pub id_token: Option<String>,

    /// Claims decoded from the access token
    pub claims: TokenClaims,

    /// Local clock minus the provider clock, in seconds, observed when the
    /// token was received
    pub time_skew: i64,
}

impl TokenSet {
    /// Build a token set from freshly issued tokens, recording clock skew
    pub fn issue(
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let claims = TokenClaims::decode(&access_token)?;
        let time_skew = claims.iat.map_or(0, |iat| now.timestamp() - iat);

        Ok(Self {
            access_token,
            refresh_token,
            id_token,
            claims,
            time_skew,
        })
    }

    /// Seconds of validity left, corrected for clock skew
    pub fn seconds_until_expiration(&self, now: DateTime<Utc>) -> Option<i64> {
        self.claims
            .exp
            .map(|exp| exp - now.timestamp() + self.time_skew)
    }

    /// Check if the token expires within `threshold_secs`.
    ///
    /// A token without an `exp` claim never expires on its own.
    pub fn expires_soon(&self, threshold_secs: i64, now: DateTime<Utc>) -> bool {
        self.seconds_until_expiration(now)
            .map_or(false, |remaining| remaining - threshold_secs < 0)
    }
}
