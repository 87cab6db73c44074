use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::auth::providers::{IdentityProvider, Redirect, RefreshOutcome, SilentCheck};
use crate::auth::token::{TokenClaims, TokenSet};
use crate::config::KeycloakConfig;
use crate::error::{Error, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const INVALID_GRANT: &str = "invalid_grant";

// Response type for token requests
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

// Error body returned by the token endpoint
#[derive(Debug, Clone, Default, Deserialize)]
struct OAuthErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

// Login started by `login()` and not yet completed by the callback
#[derive(Debug, Clone)]
struct PendingLogin {
    state: String,
    code_verifier: String,
}

#[derive(Debug, Clone)]
struct Endpoints {
    authorization: Url,
    token: Url,
    end_session: Url,
}

/// Keycloak realm client using the authorization-code flow with PKCE
pub struct KeycloakProvider {
    config: KeycloakConfig,
    http: Client,
    endpoints: Endpoints,
    tokens: RwLock<Option<TokenSet>>,
    pending_login: RwLock<Option<PendingLogin>>,
    remembered_refresh: RwLock<Option<String>>,
    // Held for the whole of a refresh so concurrent callers share one grant
    refresh_lock: Mutex<()>,
}

impl KeycloakProvider {
    /// Create a provider for the configured realm
    pub fn new(config: KeycloakConfig) -> Result<Self> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let endpoints = Endpoints {
            authorization: config.authorization_endpoint()?,
            token: config.token_endpoint()?,
            end_session: config.end_session_endpoint()?,
        };

        Ok(Self {
            config,
            http,
            endpoints,
            tokens: RwLock::new(None),
            pending_login: RwLock::new(None),
            remembered_refresh: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Seed a refresh token from a previous run so the silent check can
    /// restore the session
    pub fn with_refresh_token(self, refresh_token: impl Into<String>) -> Self {
        Self {
            remembered_refresh: RwLock::new(Some(refresh_token.into())),
            ..self
        }
    }

    /// Refresh token of the current session, for persisting across runs
    pub async fn current_refresh_token(&self) -> Option<String> {
        let tokens = self.tokens.read().await;
        match tokens.as_ref() {
            Some(set) => set.refresh_token.clone(),
            None => self.remembered_refresh.read().await.clone(),
        }
    }

    /// Handle the redirect back from the login page.
    ///
    /// `state` must match the pending login; the authorization code is then
    /// exchanged for tokens.
    pub async fn complete_login(&self, code: &str, state: &str) -> Result<TokenClaims> {
        let pending = {
            let mut pending = self.pending_login.write().await;
            match pending.take() {
                Some(login) if login.state == state => login,
                Some(login) => {
                    // A mismatched callback does not consume the pending login
                    *pending = Some(login);
                    warn!("Login callback state does not match the pending login");
                    return Err(Error::CallbackRejected("state mismatch".into()));
                }
                None => {
                    return Err(Error::CallbackRejected("no login in progress".into()));
                }
            }
        };

        debug!("Exchanging authorization code");
        let response = self
            .http
            .post(self.endpoints.token.clone())
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_verifier", pending.code_verifier.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        let body: TokenResponse = ensure_success("code exchange", response).await?.json().await?;
        let set = self.store_tokens(body).await?;
        info!(subject = ?set.claims.sub, "Login completed");
        Ok(set.claims)
    }

    async fn store_tokens(&self, body: TokenResponse) -> Result<TokenSet> {
        let set = TokenSet::issue(body.access_token, body.refresh_token, body.id_token, Utc::now())?;
        *self.tokens.write().await = Some(set.clone());
        *self.remembered_refresh.write().await = None;
        Ok(set)
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse> {
        debug!("Requesting refresh grant");
        let response = self
            .http
            .post(self.endpoints.token.clone())
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(e.to_string()))?;

        Ok(ensure_success("refresh grant", response).await?.json().await?)
    }

    fn authorization_url(&self, pending: &PendingLogin, nonce: &str) -> String {
        let mut url = self.endpoints.authorization.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", &pending.state)
            .append_pair("nonce", nonce)
            .append_pair("code_challenge", &code_challenge(&pending.code_verifier))
            .append_pair("code_challenge_method", "S256");
        url.into()
    }
}

#[async_trait]
impl IdentityProvider for KeycloakProvider {
    fn name(&self) -> &str {
        "keycloak"
    }

    async fn init_silent(&self) -> Result<SilentCheck> {
        if let Some(set) = self.tokens.read().await.as_ref() {
            debug!("Provider already holds tokens");
            return Ok(SilentCheck::Authenticated {
                token: set.access_token.clone(),
                claims: set.claims.clone(),
            });
        }

        let Some(refresh_token) = self.remembered_refresh.read().await.clone() else {
            debug!("No stored refresh token, session is anonymous");
            return Ok(SilentCheck::Anonymous);
        };

        match self.refresh_grant(&refresh_token).await {
            Ok(body) => {
                let set = self.store_tokens(body).await?;
                info!(subject = ?set.claims.sub, "Restored session from refresh token");
                Ok(SilentCheck::Authenticated {
                    token: set.access_token,
                    claims: set.claims,
                })
            }
            Err(Error::ProviderRejected { status, detail, .. })
                if (status == 400 || status == 401) && detail.contains(INVALID_GRANT) =>
            {
                info!("Stored refresh token is no longer valid");
                *self.remembered_refresh.write().await = None;
                Ok(SilentCheck::Anonymous)
            }
            Err(e) => {
                error!(error = %e, "Silent session check failed");
                Err(e)
            }
        }
    }

    async fn login(&self) -> Redirect {
        let pending = PendingLogin {
            state: Uuid::new_v4().to_string(),
            code_verifier: code_verifier(),
        };
        let nonce = Uuid::new_v4().to_string();
        let target = self.authorization_url(&pending, &nonce);

        *self.pending_login.write().await = Some(pending);
        debug!("Prepared login redirect");
        Redirect::to(target)
    }

    async fn logout(&self) -> Redirect {
        let id_token = self.tokens.write().await.take().and_then(|set| set.id_token);
        *self.remembered_refresh.write().await = None;
        *self.pending_login.write().await = None;

        let mut url = self.endpoints.end_session.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("post_logout_redirect_uri", &self.config.post_logout_redirect_uri)
                .append_pair("client_id", &self.config.client_id);
            if let Some(hint) = id_token.as_deref() {
                query.append_pair("id_token_hint", hint);
            }
        }

        info!("Cleared provider tokens");
        Redirect::to(url)
    }

    async fn is_token_expiring(&self, threshold_secs: i64) -> bool {
        match self.tokens.read().await.as_ref() {
            Some(set) => set.expires_soon(threshold_secs, Utc::now()),
            None => true,
        }
    }

    async fn refresh_token(&self, threshold_secs: i64) -> Result<RefreshOutcome> {
        // A caller queued behind a grant sees the renewed token here
        let _refreshing = self.refresh_lock.lock().await;
        let refresh_token = {
            let tokens = self.tokens.read().await;
            match tokens.as_ref() {
                Some(set) if !set.expires_soon(threshold_secs, Utc::now()) => {
                    return Ok(RefreshOutcome { refreshed: false });
                }
                Some(set) => set.refresh_token.clone(),
                None => None,
            }
        };

        let refresh_token =
            refresh_token.ok_or_else(|| Error::RefreshFailed("no refresh token held".into()))?;

        let body = self
            .refresh_grant(&refresh_token)
            .await
            .map_err(|e| Error::RefreshFailed(e.to_string()))?;
        let set = self.store_tokens(body).await?;
        debug!(expires_at = ?set.claims.expiration(), "Access token renewed");
        Ok(RefreshOutcome { refreshed: true })
    }

    async fn token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|set| set.access_token.clone())
    }

    async fn claims(&self) -> Option<TokenClaims> {
        self.tokens.read().await.as_ref().map(|set| set.claims.clone())
    }
}

// Convert a non-success response into `ProviderRejected`
async fn ensure_success(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: OAuthErrorResponse = serde_json::from_str(&text).unwrap_or_default();
    let detail = match (body.error.is_empty(), body.error_description) {
        (false, Some(description)) => format!("{}: {}", body.error, description),
        (false, None) => body.error,
        (true, _) => text,
    };

    if status.is_server_error() {
        warn!(operation, status = status.as_u16(), "Identity provider server error");
    }

    Err(Error::ProviderRejected {
        operation,
        status: status.as_u16(),
        detail,
    })
}

fn code_verifier() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
