use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::session::Session;
use crate::guard::{GuardOutcome, Location, NavigationRedirect, RouteGuard};

/// Views of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteId {
    Home,
    Login,
    Logout,
    Unauthorized,
    History,
    Analysis,
    Admin,
}

/// A path pattern bound to a view, optionally behind a guard.
///
/// Pattern segments starting with `:` capture a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: RouteId,
    pub pattern: String,
    pub guard: Option<RouteGuard>,
}

impl Route {
    pub fn public(id: RouteId, pattern: impl Into<String>) -> Self {
        Self {
            id,
            pattern: pattern.into(),
            guard: None,
        }
    }

    pub fn protected(id: RouteId, pattern: impl Into<String>, guard: RouteGuard) -> Self {
        Self {
            id,
            pattern: pattern.into(),
            guard: Some(guard),
        }
    }

    /// Match `pathname`, returning captured parameters
    pub fn matches(&self, pathname: &str) -> Option<HashMap<String, String>> {
        let mut pattern = segments(&self.pattern);
        let mut path = segments(pathname);
        let mut params = HashMap::new();

        loop {
            match (pattern.next(), path.next()) {
                (None, None) => return Some(params),
                (Some(expected), Some(actual)) => {
                    if let Some(name) = expected.strip_prefix(':') {
                        params.insert(name.to_string(), actual.to_string());
                    } else if expected != actual {
                        return None;
                    }
                }
                _ => return None,
            }
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Result of resolving a navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Navigation {
    Render {
        route: RouteId,
        params: HashMap<String, String>,
    },
    Pending,
    Redirect(NavigationRedirect),
    NotFound,
}

/// Ordered route declarations; the first match wins
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes of the web analyzer front-end
    pub fn web_analyzer() -> Self {
        Self::new()
            .route(Route::public(RouteId::Home, "/"))
            .route(Route::public(RouteId::Login, "/login"))
            .route(Route::public(RouteId::Logout, "/logout"))
            .route(Route::public(RouteId::Unauthorized, "/unauthorized"))
            .route(Route::protected(
                RouteId::History,
                "/history",
                RouteGuard::authenticated(),
            ))
            .route(Route::protected(
                RouteId::Analysis,
                "/analysis/:id",
                RouteGuard::authenticated(),
            ))
            .route(Route::protected(
                RouteId::Admin,
                "/admin",
                RouteGuard::any_role(["admin"]),
            ))
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Resolve a navigation against the current session
    pub fn navigate(&self, session: &Session, location: &Location) -> Navigation {
        let matched = self
            .routes
            .iter()
            .find_map(|route| route.matches(&location.pathname).map(|params| (route, params)));

        let Some((route, params)) = matched else {
            debug!(path = %location.pathname, "No route matched");
            return Navigation::NotFound;
        };

        let outcome = match &route.guard {
            Some(guard) => guard.evaluate(session, location),
            None => GuardOutcome::Allow,
        };

        match outcome {
            GuardOutcome::Allow => Navigation::Render {
                route: route.id,
                params,
            },
            GuardOutcome::Pending => Navigation::Pending,
            GuardOutcome::Redirect(redirect) => Navigation::Redirect(redirect),
        }
    }
}
