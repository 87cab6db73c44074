use serde::{Deserialize, Serialize};

use crate::auth::session::Session;
use crate::guard::NavigationState;

/// Where to go after a successful login: the location the guard turned the
/// user away from, or the home page
pub fn login_return_target(state: Option<&NavigationState>) -> &str {
    state
        .and_then(|state| state.from.as_ref())
        .map(|from| from.pathname.as_str())
        .filter(|path| !path.is_empty())
        .unwrap_or("/")
}

/// What the login page should do for the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "path", rename_all = "snake_case")]
pub enum LoginPageAction {
    /// Startup check still running
    Pending,
    /// Already signed in; replace the login page with `path`
    ReturnTo(String),
    /// Offer the sign-in button
    ShowLogin,
}

pub fn login_page_action(session: &Session, state: Option<&NavigationState>) -> LoginPageAction {
    if session.loading() {
        LoginPageAction::Pending
    } else if session.is_authenticated() {
        LoginPageAction::ReturnTo(login_return_target(state).to_string())
    } else {
        LoginPageAction::ShowLogin
    }
}

/// What the logout page should do for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutPageAction {
    /// Startup check still running
    Pending,
    /// Signed in; call `SessionManager::logout` and follow its redirect
    Logout,
    /// Nothing to end
    Done,
}

pub fn logout_page_action(session: &Session) -> LogoutPageAction {
    if session.loading() {
        LogoutPageAction::Pending
    } else if session.is_authenticated() {
        LogoutPageAction::Logout
    } else {
        LogoutPageAction::Done
    }
}
