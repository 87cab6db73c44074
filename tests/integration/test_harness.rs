//! Shared fixtures: unsigned JWTs, a mocked Keycloak realm and a fixed
//! identity provider for REST client tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};

use analyzer_session::auth::{RefreshOutcome, SilentCheck, TokenClaims};
use analyzer_session::{
    ApiConfig, AppConfig, IdentityProvider, KeycloakConfig, Redirect, Result, SessionSettings,
};

pub const REALM: &str = "web-analyzer";
pub const CLIENT_ID: &str = "web-analyzer-frontend";
pub const TOKEN_PATH: &str = "/realms/web-analyzer/protocol/openid-connect/token";

/// Unsigned JWT carrying `claims`
pub fn make_jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

/// Access token for `username`, issued now and valid for `lifetime_secs`
pub fn access_token(username: &str, roles: &[&str], lifetime_secs: i64) -> String {
    let now = Utc::now().timestamp();
    make_jwt(&json!({
        "sub": format!("id-{}", username),
        "preferred_username": username,
        "email": format!("{}@example.com", username),
        "name": "Jane Doe",
        "iat": now,
        "exp": now + lifetime_secs,
        "realm_access": { "roles": roles },
    }))
}

/// Token endpoint response body
pub fn token_response(access_token: &str, refresh_token: &str) -> String {
    json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "id_token": "id-token-value",
        "token_type": "Bearer",
        "expires_in": 300,
    })
    .to_string()
}

pub fn keycloak_config(server: &ServerGuard) -> KeycloakConfig {
    KeycloakConfig::new(server.url(), REALM, CLIENT_ID).with_redirect_uri("http://localhost:3000/")
}

/// Configuration pointing both the realm and the backend at mock servers
pub fn app_config(keycloak: &ServerGuard, api: &ServerGuard) -> AppConfig {
    AppConfig {
        keycloak: keycloak_config(keycloak),
        api: api_config(&format!("{}/api", api.url())),
        session: SessionSettings {
            refresh_interval_secs: 60,
            min_validity_secs: 70,
            init_timeout_secs: 5,
        },
    }
}

/// Backend settings with immediate retries
pub fn api_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        retry_delay_ms: 0,
        ..ApiConfig::new(base_url)
    }
}

/// Mock a refresh grant presenting `refresh_token`
pub async fn mock_refresh_grant(
    server: &mut ServerGuard,
    refresh_token: &str,
    status: usize,
    body: String,
) -> Mock {
    server
        .mock("POST", TOKEN_PATH)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("client_id".into(), CLIENT_ID.into()),
            Matcher::UrlEncoded("refresh_token".into(), refresh_token.into()),
        ]))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

/// Provider with a fixed answer, counting login requests
pub struct FixedProvider {
    token: Mutex<Option<String>>,
    refresh_fails: bool,
    pub login_calls: AtomicUsize,
}

impl FixedProvider {
    pub fn signed_in(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
            refresh_fails: false,
            login_calls: AtomicUsize::new(0),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            token: Mutex::new(None),
            refresh_fails: false,
            login_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_failing_refresh(mut self) -> Self {
        self.refresh_fails = true;
        self
    }

    pub fn logins(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn init_silent(&self) -> Result<SilentCheck> {
        Ok(match self.token.lock().unwrap().clone() {
            Some(token) => SilentCheck::Authenticated {
                token,
                claims: TokenClaims::default(),
            },
            None => SilentCheck::Anonymous,
        })
    }

    async fn login(&self) -> Redirect {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Redirect::to("https://idp.test/auth")
    }

    async fn logout(&self) -> Redirect {
        *self.token.lock().unwrap() = None;
        Redirect::to("https://idp.test/logout")
    }

    async fn is_token_expiring(&self, _threshold_secs: i64) -> bool {
        self.refresh_fails
    }

    async fn refresh_token(&self, _threshold_secs: i64) -> Result<RefreshOutcome> {
        if self.refresh_fails {
            return Err(analyzer_session::Error::RefreshFailed("revoked".into()));
        }
        Ok(RefreshOutcome { refreshed: false })
    }

    async fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    async fn claims(&self) -> Option<TokenClaims> {
        self.token
            .lock()
            .unwrap()
            .as_ref()
            .map(|_| TokenClaims::default())
    }
}
