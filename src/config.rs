use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

// Default configuration values
const DEFAULT_KEYCLOAK_URL: &str = "http://host.docker.internal:8080";
const DEFAULT_KEYCLOAK_REALM: &str = "web-analyzer";
const DEFAULT_KEYCLOAK_CLIENT_ID: &str = "web-analyzer-frontend";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/";
const DEFAULT_API_BASE_URL: &str = "http://localhost:9090/api";
const DEFAULT_API_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_REQUEST_MIN_VALIDITY_SECONDS: i64 = 30;
const DEFAULT_QUERY_RETRIES: usize = 1;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_MIN_VALIDITY_SECONDS: i64 = 70;
const DEFAULT_INIT_TIMEOUT_SECONDS: u64 = 10;

/// Top-level configuration for the session layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Identity provider
    #[serde(default)]
    pub keycloak: KeycloakConfig,
    /// Backend REST API
    #[serde(default)]
    pub api: ApiConfig,
    /// Session lifecycle timings
    #[serde(default)]
    pub session: SessionSettings,
}

impl AppConfig {
    /// Load configuration from the environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => info!(path = %path.display(), "Loaded environment file"),
            Err(e) => debug!(error = %e, "No environment file loaded"),
        }

        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Check that every URL parses and timings are usable
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.keycloak.url)
            .map_err(|e| Error::Config(format!("KEYCLOAK_URL: {}", e)))?;
        Url::parse(&self.keycloak.redirect_uri)
            .map_err(|e| Error::Config(format!("KEYCLOAK_REDIRECT_URI: {}", e)))?;
        Url::parse(&self.keycloak.post_logout_redirect_uri)
            .map_err(|e| Error::Config(format!("KEYCLOAK_POST_LOGOUT_REDIRECT_URI: {}", e)))?;
        Url::parse(&self.api.base_url)
            .map_err(|e| Error::Config(format!("API_BASE_URL: {}", e)))?;

        if self.keycloak.realm.is_empty() || self.keycloak.client_id.is_empty() {
            return Err(Error::Config(
                "KEYCLOAK_REALM and KEYCLOAK_CLIENT_ID must not be empty".into(),
            ));
        }
        if self.session.refresh_interval_secs == 0 {
            return Err(Error::Config(
                "SESSION_REFRESH_INTERVAL_SECS must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Keycloak realm and client registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeycloakConfig {
    /// Base URL of the Keycloak server
    #[serde(default = "default_keycloak_url")]
    pub url: String,
    #[serde(default = "default_keycloak_realm")]
    pub realm: String,
    /// Public client used by the front-end
    #[serde(default = "default_keycloak_client_id")]
    pub client_id: String,
    /// Where the provider sends the user back after login
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Where the provider sends the user after logout
    #[serde(default = "default_post_logout_redirect_uri")]
    pub post_logout_redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl KeycloakConfig {
    pub fn new(url: impl Into<String>, realm: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Override the login redirect URI; the logout redirect follows it
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self.post_logout_redirect_uri = self.redirect_uri.clone();
        self
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        let base = self.url.trim_end_matches('/');
        Url::parse(&format!(
            "{}/realms/{}/protocol/openid-connect/{}",
            base, self.realm, name
        ))
        .map_err(Into::into)
    }

    pub fn authorization_endpoint(&self) -> Result<Url> {
        self.endpoint("auth")
    }

    pub fn token_endpoint(&self) -> Result<Url> {
        self.endpoint("token")
    }

    pub fn end_session_endpoint(&self) -> Result<Url> {
        self.endpoint("logout")
    }
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        let redirect_uri = default_redirect_uri();
        Self {
            url: default_keycloak_url(),
            realm: default_keycloak_realm(),
            client_id: default_keycloak_client_id(),
            post_logout_redirect_uri: std::env::var("KEYCLOAK_POST_LOGOUT_REDIRECT_URI")
                .unwrap_or_else(|_| redirect_uri.clone()),
            redirect_uri,
            scopes: default_scopes(),
        }
    }
}

/// Backend REST API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    /// Refresh the token before a request if it expires within this window
    #[serde(default = "default_request_min_validity")]
    pub request_min_validity_secs: i64,
    /// Extra attempts for read queries
    #[serde(default = "default_query_retries")]
    pub query_retries: usize,
    /// Delay before the first retry, doubling afterwards
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_secs: default_api_timeout(),
            request_min_validity_secs: default_request_min_validity(),
            query_retries: default_query_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// Session lifecycle timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Period of the background refresh loop
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Renew the token when it expires within this window
    #[serde(default = "default_min_validity")]
    pub min_validity_secs: i64,
    /// Give up on the startup check after this long
    #[serde(default = "default_init_timeout")]
    pub init_timeout_secs: u64,
}

impl SessionSettings {
    /// Refresh loop period; never shorter than one second
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            min_validity_secs: default_min_validity(),
            init_timeout_secs: default_init_timeout(),
        }
    }
}

// Default functions
fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|val| !val.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(fallback)
}

fn default_keycloak_url() -> String {
    env_or("KEYCLOAK_URL", DEFAULT_KEYCLOAK_URL)
}

fn default_keycloak_realm() -> String {
    env_or("KEYCLOAK_REALM", DEFAULT_KEYCLOAK_REALM)
}

fn default_keycloak_client_id() -> String {
    env_or("KEYCLOAK_CLIENT_ID", DEFAULT_KEYCLOAK_CLIENT_ID)
}

fn default_redirect_uri() -> String {
    env_or("KEYCLOAK_REDIRECT_URI", DEFAULT_REDIRECT_URI)
}

fn default_post_logout_redirect_uri() -> String {
    env_or("KEYCLOAK_POST_LOGOUT_REDIRECT_URI", &default_redirect_uri())
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string()]
}

fn default_api_base_url() -> String {
    env_or("API_BASE_URL", DEFAULT_API_BASE_URL)
}

fn default_api_timeout() -> u64 {
    env_parse_or("API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECONDS)
}

fn default_request_min_validity() -> i64 {
    DEFAULT_REQUEST_MIN_VALIDITY_SECONDS
}

fn default_query_retries() -> usize {
    env_parse_or("API_QUERY_RETRIES", DEFAULT_QUERY_RETRIES)
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_refresh_interval() -> u64 {
    env_parse_or("SESSION_REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECONDS)
}

fn default_min_validity() -> i64 {
    env_parse_or("SESSION_MIN_VALIDITY_SECS", DEFAULT_MIN_VALIDITY_SECONDS)
}

fn default_init_timeout() -> u64 {
    env_parse_or("SESSION_INIT_TIMEOUT_SECS", DEFAULT_INIT_TIMEOUT_SECONDS)
}
