use serde::{Deserialize, Serialize};

use crate::auth::token::TokenClaims;

/// Identity details derived from the token claims
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Realm roles; order is irrelevant for role checks
    pub roles: Vec<String>,
}

impl UserInfo {
    /// Derive the user view from decoded claims
    pub fn from_claims(claims: &TokenClaims) -> Self {
        Self {
            id: claims.sub.clone(),
            username: claims.preferred_username.clone(),
            email: claims.email.clone(),
            name: claims.name.clone(),
            roles: claims.roles(),
        }
    }

    /// Name to greet the user with: display name, then username, then "User"
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| self.username.as_deref().filter(|name| !name.is_empty()))
            .unwrap_or("User")
    }

    /// Single upper-case letter for an avatar badge
    pub fn avatar_initial(&self) -> String {
        self.display_name()
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "U".to_string())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|held| held == role)
    }
}

/// Process-wide authentication state.
///
/// Only the session manager mutates the live instance; everyone else works on
/// snapshots. Fields are private so the invariants below hold by construction:
/// `loading == !initialized`, and `is_authenticated` implies a token, claims
/// and user info are present.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    is_authenticated: bool,
    token: Option<String>,
    token_claims: Option<TokenClaims>,
    user_info: Option<UserInfo>,
    initialized: bool,
    loading: bool,
}

impl Session {
    /// State at application start, before the provider check resolves
    pub fn initial() -> Self {
        Self {
            is_authenticated: false,
            token: None,
            token_claims: None,
            user_info: None,
            initialized: false,
            loading: true,
        }
    }

    /// Startup check finished without an active session
    pub fn anonymous() -> Self {
        Self {
            initialized: true,
            loading: false,
            ..Self::initial()
        }
    }

    /// Startup check finished with an active session
    pub fn authenticated(token: String, claims: TokenClaims) -> Self {
        let user_info = UserInfo::from_claims(&claims);
        Self {
            is_authenticated: true,
            token: Some(token),
            token_claims: Some(claims),
            user_info: Some(user_info),
            initialized: true,
            loading: false,
        }
    }

    /// Swap in a renewed token; the derived user info is left untouched
    pub(crate) fn replace_token(&mut self, token: String, claims: TokenClaims) {
        if !self.is_authenticated {
            return;
        }
        self.token = Some(token);
        self.token_claims = Some(claims);
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn token_claims(&self) -> Option<&TokenClaims> {
        self.token_claims.as_ref()
    }

    pub fn user_info(&self) -> Option<&UserInfo> {
        self.user_info.as_ref()
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    /// True iff `role` is held by the current user. Never fails: an
    /// anonymous session simply holds no roles.
    pub fn has_role(&self, role: &str) -> bool {
        self.user_info
            .as_ref()
            .map_or(false, |info| info.has_role(role))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initial()
    }
}
