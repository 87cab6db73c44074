//! Route protection.
//!
//! The guard holds no state of its own: every decision is a projection of a
//! `Session` snapshot, so it is re-run whenever the session changes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::session::Session;

pub mod pages;
pub mod routes;

pub use pages::{
    login_page_action, login_return_target, logout_page_action, LoginPageAction, LogoutPageAction,
};
pub use routes::{Navigation, Route, RouteId, RouteTable};

/// Entry point for interactive login
pub const LOGIN_ROUTE: &str = "/login";
/// Shown when the user lacks a required role
pub const UNAUTHORIZED_ROUTE: &str = "/unauthorized";

/// Location being navigated to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub hash: String,
}

impl Location {
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            ..Self::default()
        }
    }

    /// Split a path such as `/history?page=2#top` into its parts
    pub fn parse(path: &str) -> Self {
        let (rest, hash) = match path.find('#') {
            Some(idx) => (&path[..idx], &path[idx..]),
            None => (path, ""),
        };
        let (pathname, search) = match rest.find('?') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        let pathname = if pathname.is_empty() { "/" } else { pathname };

        Self {
            pathname: pathname.to_string(),
            search: search.to_string(),
            hash: hash.to_string(),
        }
    }
}

/// State carried along a redirect
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
    /// Originally requested location, for returning after login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Location>,
}

/// Redirect emitted by the guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationRedirect {
    pub path: String,
    #[serde(default)]
    pub state: NavigationState,
    /// Replace the current history entry instead of pushing
    pub replace: bool,
}

impl NavigationRedirect {
    fn to_login(from: &Location) -> Self {
        Self {
            path: LOGIN_ROUTE.to_string(),
            state: NavigationState {
                from: Some(from.clone()),
            },
            replace: true,
        }
    }

    fn to_unauthorized() -> Self {
        Self {
            path: UNAUTHORIZED_ROUTE.to_string(),
            state: NavigationState::default(),
            replace: true,
        }
    }
}

/// Decision for one protected-route render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuardOutcome {
    /// Startup check still running; show a waiting indicator
    Pending,
    /// Navigate elsewhere instead of rendering
    Redirect(NavigationRedirect),
    /// Render the protected content
    Allow,
}

/// Guard state derived from a session and a role requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Pending,
    Unauthenticated,
    Unauthorized,
    Authorized,
}

impl GuardState {
    /// Project the session onto the guard's states.
    ///
    /// Roles use OR semantics: any one held role grants access, and an empty
    /// requirement admits every authenticated user.
    pub fn of<R: AsRef<str>>(session: &Session, required_roles: &[R]) -> Self {
        if session.loading() {
            GuardState::Pending
        } else if !session.is_authenticated() {
            GuardState::Unauthenticated
        } else if required_roles.is_empty()
            || required_roles
                .iter()
                .any(|role| session.has_role(role.as_ref()))
        {
            GuardState::Authorized
        } else {
            GuardState::Unauthorized
        }
    }
}

/// Decide whether to render a protected route at `location`
pub fn evaluate<R: AsRef<str>>(
    session: &Session,
    required_roles: &[R],
    location: &Location,
) -> GuardOutcome {
    let state = GuardState::of(session, required_roles);
    let outcome = match state {
        GuardState::Pending => GuardOutcome::Pending,
        GuardState::Unauthenticated => {
            GuardOutcome::Redirect(NavigationRedirect::to_login(location))
        }
        GuardState::Unauthorized => GuardOutcome::Redirect(NavigationRedirect::to_unauthorized()),
        GuardState::Authorized => GuardOutcome::Allow,
    };

    debug!(path = %location.pathname, ?state, "Route guard evaluated");
    outcome
}

/// Guard bound to a fixed role requirement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteGuard {
    required_roles: Vec<String>,
}

impl RouteGuard {
    /// Guard admitting any authenticated user
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Guard admitting users holding at least one of `roles`
    pub fn any_role<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn required_roles(&self) -> &[String] {
        &self.required_roles
    }

    pub fn state(&self, session: &Session) -> GuardState {
        GuardState::of(session, self.required_roles.as_slice())
    }

    pub fn evaluate(&self, session: &Session, location: &Location) -> GuardOutcome {
        evaluate(session, self.required_roles.as_slice(), location)
    }
}
