//! Backend REST client.
//!
//! Every request consults the session manager: a bearer token is attached
//! when signed in, a 401 sends the user back to login, and read queries get
//! one retry on transport or server errors.

use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::auth::service::{SessionManager, TokenForRequest};
use crate::common::retry::{exponential_backoff, with_retry_if};
use crate::config::ApiConfig;
use crate::error::{Error, Result};

pub mod error;

pub use error::{ApiError, ErrorBody};

/// Default page size for history queries
pub const DEFAULT_LIMIT: u32 = 10;

const MAX_RETRY_DELAY_MS: u64 = 30_000;

// Error payload the backend sends with non-success responses
#[derive(Debug, Default, Deserialize)]
struct BackendError {
    message: Option<String>,
    error: Option<String>,
}

/// REST client for the analysis backend
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    config: ApiConfig,
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(config: ApiConfig, session: Arc<SessionManager>) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "API base URL cannot hold paths: {}",
                config.base_url
            )));
        }

        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            base_url,
            config,
            session,
        })
    }

    /// Submit a URL for analysis
    pub async fn analyze_url(&self, url: &str) -> std::result::Result<Value, ApiError> {
        let body = json!({ "url": url });
        self.execute(Method::POST, &["analyze"], &[], Some(&body)).await
    }

    /// Fetch one analysis report
    pub async fn get_analysis(&self, id: &str) -> std::result::Result<Value, ApiError> {
        self.query(&["analysis", id], &[]).await
    }

    /// Most recent analyses across all users
    pub async fn get_recent_analyses(&self, limit: u32) -> std::result::Result<Value, ApiError> {
        self.query(&["analyses"], &[("limit", limit.to_string())]).await
    }

    /// Analyses submitted by the signed-in user
    pub async fn get_user_analyses(&self, limit: u32) -> std::result::Result<Value, ApiError> {
        self.query(&["user", "analyses"], &[("limit", limit.to_string())])
            .await
    }

    // Read query with the retry policy applied
    async fn query(
        &self,
        segments: &[&str],
        params: &[(&str, String)],
    ) -> std::result::Result<Value, ApiError> {
        let context = format!("GET /{}", segments.join("/"));
        with_retry_if(
            || self.execute(Method::GET, segments, params, None),
            self.config.query_retries + 1,
            &context,
            exponential_backoff(self.config.retry_delay_ms, Some(MAX_RETRY_DELAY_MS)),
            ApiError::is_retryable,
        )
        .await
    }

    async fn execute(
        &self,
        method: Method,
        segments: &[&str],
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> std::result::Result<Value, ApiError> {
        let url = self.endpoint(segments, params)?;
        let mut request = self.http.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let request = self.authorize(request).await?;

        debug!(%method, path = %segments.join("/"), "Sending API request");
        let response = request.send().await?;
        self.handle_response(response).await
    }

    async fn authorize(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<RequestBuilder, ApiError> {
        match self
            .session
            .request_token(self.config.request_min_validity_secs)
            .await
        {
            TokenForRequest::Anonymous => Ok(request),
            TokenForRequest::Bearer(token) => Ok(request.bearer_auth(token)),
            TokenForRequest::LoginRequired(redirect) => {
                Err(ApiError::SessionExpired { redirect })
            }
        }
    }

    async fn handle_response(&self, response: Response) -> std::result::Result<Value, ApiError> {
        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| ApiError::Decode(e.to_string()));
        }

        match status.as_u16() {
            401 => {
                warn!("Backend rejected credentials, requesting login");
                let redirect = self.session.login().await;
                Err(ApiError::SessionExpired { redirect })
            }
            403 => {
                debug!("Backend denied access");
                Err(ApiError::Forbidden)
            }
            code => {
                let text = response.text().await.unwrap_or_default();
                let payload: BackendError = serde_json::from_str(&text).unwrap_or_default();
                warn!(status = code, "API request failed");
                Err(ApiError::Status {
                    status: code,
                    message: payload
                        .message
                        .unwrap_or_else(|| error::UNEXPECTED_MESSAGE.to_string()),
                    error: payload
                        .error
                        .or_else(|| Some(format!("Request failed with status code {}", code))),
                })
            }
        }
    }

    fn endpoint(
        &self,
        segments: &[&str],
        params: &[(&str, String)],
    ) -> std::result::Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport("base URL cannot hold paths".into()))?
            .pop_if_empty()
            .extend(segments);
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(key, value)| (*key, value.as_str())));
        }
        Ok(url)
    }
}
