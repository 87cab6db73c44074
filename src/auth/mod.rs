pub mod providers;
pub mod service;
pub mod session;
pub mod token;

pub use providers::keycloak::KeycloakProvider;
pub use providers::{IdentityProvider, Redirect, RefreshOutcome, SilentCheck};
pub use service::{RefreshHandle, SessionManager, TokenForRequest};
pub use session::{Session, UserInfo};
pub use token::{RealmAccess, TokenClaims, TokenSet};
