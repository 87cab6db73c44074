use std::sync::Arc;

use tracing::info;

pub mod api;
pub mod auth;
pub mod common;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;


pub use api::{ApiClient, ApiError};
pub use auth::{
    IdentityProvider, KeycloakProvider, Redirect, Session, SessionManager, TokenForRequest,
    UserInfo,
};
pub use config::{ApiConfig, AppConfig, KeycloakConfig, SessionSettings};
pub use error::{Error, ErrorCategory, ErrorCode, Result};
pub use events::{LogoutReason, SessionEvent};
pub use guard::{evaluate, GuardOutcome, GuardState, Location, Navigation, RouteGuard, RouteTable};

/// Session layer wired together: provider, session manager, REST client and
/// route table
pub struct AppState {
    pub config: AppConfig,
    pub session: Arc<SessionManager>,
    pub api: ApiClient,
    pub routes: RouteTable,
}

impl AppState {
    /// Wire the layer around an arbitrary identity provider
    pub fn new(config: AppConfig, provider: Arc<dyn IdentityProvider>) -> Result<Self> {
        let session = Arc::new(SessionManager::new(provider, config.session.clone()));
        let api = ApiClient::new(config.api.clone(), Arc::clone(&session))?;

        Ok(Self {
            config,
            session,
            api,
            routes: RouteTable::web_analyzer(),
        })
    }

    /// Wire the layer around the configured Keycloak realm, optionally
    /// seeding a refresh token from a previous run
    pub fn with_keycloak(config: AppConfig, refresh_token: Option<String>) -> Result<Self> {
        let mut provider = KeycloakProvider::new(config.keycloak.clone())?;
        if let Some(refresh_token) = refresh_token {
            provider = provider.with_refresh_token(refresh_token);
        }
        Self::new(config, Arc::new(provider))
    }

    /// Run the startup session check
    pub async fn start(&self) -> Session {
        let session = self.session.initialize().await;
        info!(
            authenticated = session.is_authenticated(),
            "Session layer started"
        );
        session
    }

    /// Resolve a navigation to `path` against the current session
    pub async fn navigate(&self, path: &str) -> Navigation {
        let session = self.session.session().await;
        self.routes.navigate(&session, &Location::parse(path))
    }

    /// Stop background work
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
        let stats = self.session.event_stats().await;
        info!(
            events_published = stats.events_published,
            events_unobserved = stats.events_unobserved,
            "Session layer stopped"
        );
    }
}
