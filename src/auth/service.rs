use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::auth::providers::{IdentityProvider, Redirect, RefreshOutcome, SilentCheck};
use crate::auth::session::Session;
use crate::config::SessionSettings;
use crate::error::Error;
use crate::events::{
    EventStream, EventStreamStats, LogoutReason, SessionEvent, Subscriber, EVENT_BUFFER_SIZE,
    EVENT_CHANNEL_CAPACITY,
};

/// Credential to attach to an outbound backend request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenForRequest {
    /// No session; send the request without credentials
    Anonymous,
    /// Send `Authorization: Bearer <token>`
    Bearer(String),
    /// Renewal failed; the caller must follow the login redirect
    LoginRequired(Redirect),
}

/// Live session plus the reset counter guarding against stale writes
struct SessionState {
    session: Session,
    epoch: u64,
}

/// State shared between the manager and its refresh loop
struct SessionCore {
    provider: Arc<dyn IdentityProvider>,
    state: RwLock<SessionState>,
    events: EventStream<SessionEvent>,
    settings: SessionSettings,
}

impl SessionCore {
    async fn epoch(&self) -> u64 {
        self.state.read().await.epoch
    }

    /// Copy the provider's renewed token into the session.
    ///
    /// Returns false when the session was reset after `epoch` or the provider
    /// no longer holds a token.
    async fn apply_refresh(&self, epoch: u64) -> bool {
        let (Some(token), Some(claims)) = (self.provider.token().await, self.provider.claims().await)
        else {
            warn!("Provider reported a refresh but holds no token");
            return false;
        };

        let expires_at = claims.expiration();
        {
            let mut state = self.state.write().await;
            if state.epoch != epoch {
                debug!(epoch, current = state.epoch, "Discarding refresh for a reset session");
                return false;
            }
            if state.session.token() == Some(token.as_str()) {
                trace!("Refresh returned the current token");
                return true;
            }
            state.session.replace_token(token, claims);
        }

        info!(?expires_at, "Session token refreshed");
        self.events
            .publish(SessionEvent::TokenRefreshed { expires_at })
            .await;
        true
    }

    /// Reset to anonymous after an unrecoverable refresh failure.
    ///
    /// Does nothing if the session was already reset after `epoch`, so the
    /// provider logout runs at most once per session.
    async fn force_logout(&self, epoch: u64, reason: LogoutReason) -> Option<Redirect> {
        {
            let mut state = self.state.write().await;
            if state.epoch != epoch {
                debug!(epoch, current = state.epoch, "Session already reset");
                return None;
            }
            state.epoch += 1;
            state.session = Session::anonymous();
        }

        let redirect = self.provider.logout().await;
        warn!(?reason, "Session forcibly logged out");
        self.events
            .publish(SessionEvent::LoggedOut {
                reason,
                target: redirect.target.clone(),
            })
            .await;
        Some(redirect)
    }
}

/// Owns the single authentication session, the identity-provider client and
/// the token refresh loop
pub struct SessionManager {
    core: Arc<SessionCore>,
    init: OnceCell<()>,
    refresh_task: Mutex<Option<RefreshHandle>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, settings: SessionSettings) -> Self {
        Self {
            core: Arc::new(SessionCore {
                provider,
                state: RwLock::new(SessionState {
                    session: Session::initial(),
                    epoch: 0,
                }),
                events: EventStream::new(EVENT_CHANNEL_CAPACITY, EVENT_BUFFER_SIZE),
                settings,
            }),
            init: OnceCell::new(),
            refresh_task: Mutex::new(None),
        }
    }

    /// Run the silent startup check.
    ///
    /// Always completes with `initialized` set: provider errors and timeouts
    /// fold into the anonymous session. Only the first call talks to the
    /// provider; later calls return the current snapshot.
    pub async fn initialize(&self) -> Session {
        self.init.get_or_init(|| self.run_initialize()).await;
        self.session().await
    }

    async fn run_initialize(&self) {
        let provider = self.core.provider.name().to_string();
        let limit = self.core.settings.init_timeout();
        debug!(%provider, ?limit, "Checking for an existing session");

        let check = match timeout(limit, self.core.provider.init_silent()).await {
            Ok(Ok(check)) => check,
            Ok(Err(e)) => {
                error!(%provider, error = %e, code = %e.code(), "Silent session check failed");
                SilentCheck::Anonymous
            }
            Err(_) => {
                let e = Error::Timeout(limit);
                error!(%provider, error = %e, "Silent session check timed out");
                SilentCheck::Anonymous
            }
        };

        let authenticated = match check {
            SilentCheck::Authenticated { token, claims } => {
                let user = claims.preferred_username.clone();
                let epoch = {
                    let mut state = self.core.state.write().await;
                    state.session = Session::authenticated(token, claims);
                    state.epoch
                };
                info!(%provider, ?user, "Session authenticated");
                self.start_refresh_loop(epoch).await;
                true
            }
            SilentCheck::Anonymous => {
                self.core.state.write().await.session = Session::anonymous();
                info!(%provider, "No active session");
                false
            }
        };

        self.core
            .events
            .publish(SessionEvent::Initialized { authenticated })
            .await;
    }

    async fn start_refresh_loop(&self, epoch: u64) {
        let handle = RefreshHandle::spawn(Arc::clone(&self.core), epoch);
        if let Some(previous) = self.refresh_task.lock().await.replace(handle) {
            previous.cancel().await;
        }
    }

    /// Snapshot of the current session
    pub async fn session(&self) -> Session {
        self.core.state.read().await.session.clone()
    }

    /// True iff the current user holds `role`
    pub async fn has_role(&self, role: &str) -> bool {
        self.core.state.read().await.session.has_role(role)
    }

    /// Redirect for interactive login. The session is not touched; it is
    /// re-evaluated when the user comes back.
    pub async fn login(&self) -> Redirect {
        let redirect = self.core.provider.login().await;
        debug!("Login requested");
        self.core
            .events
            .publish(SessionEvent::LoginRequested {
                target: redirect.target.clone(),
            })
            .await;
        redirect
    }

    /// End the session: stop the refresh loop, reset to anonymous and return
    /// the provider's logout redirect
    pub async fn logout(&self) -> Redirect {
        let handle = self.refresh_task.lock().await.take();
        {
            let mut state = self.core.state.write().await;
            state.epoch += 1;
            state.session = Session::anonymous();
        }
        if let Some(handle) = handle {
            handle.cancel().await;
        }

        let redirect = self.core.provider.logout().await;
        info!("User logged out");
        self.core
            .events
            .publish(SessionEvent::LoggedOut {
                reason: LogoutReason::UserRequested,
                target: redirect.target.clone(),
            })
            .await;
        redirect
    }

    /// Bearer token for a backend request, renewed first if it expires
    /// within `min_validity_secs`
    pub async fn request_token(&self, min_validity_secs: i64) -> TokenForRequest {
        let epoch = {
            let state = self.core.state.read().await;
            if !state.session.is_authenticated() {
                return TokenForRequest::Anonymous;
            }
            state.epoch
        };

        match self.core.provider.refresh_token(min_validity_secs).await {
            Ok(RefreshOutcome { refreshed: true }) => {
                self.core.apply_refresh(epoch).await;
            }
            Ok(RefreshOutcome { refreshed: false }) => {}
            Err(e) => {
                warn!(error = %e, "Token renewal before request failed");
                return TokenForRequest::LoginRequired(self.login().await);
            }
        }

        match self.core.state.read().await.session.token() {
            Some(token) => TokenForRequest::Bearer(token.to_string()),
            None => TokenForRequest::Anonymous,
        }
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> Subscriber<SessionEvent> {
        self.core.events.subscribe()
    }

    /// Counters of published and unobserved session events
    pub async fn event_stats(&self) -> EventStreamStats {
        self.core.events.stats().await
    }

    /// True while a refresh loop is running
    pub async fn is_refreshing(&self) -> bool {
        self.refresh_task
            .lock()
            .await
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stop background work; call when the owning context is torn down
    pub async fn shutdown(&self) {
        if let Some(handle) = self.refresh_task.lock().await.take() {
            handle.cancel().await;
            info!("Session manager shut down");
        }
    }
}

/// Cancellable handle to the background refresh loop.
///
/// Dropping the handle aborts the loop.
pub struct RefreshHandle {
    shutdown: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    fn spawn(core: Arc<SessionCore>, epoch: u64) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(run_refresh_loop(core, epoch, shutdown_rx));
        Self {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Stop the loop and wait for it to exit
    pub async fn cancel(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The loop may already have exited on its own
            let _ = shutdown.send(()).await;
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Refresh loop ended abnormally");
            }
        }
        debug!("Refresh loop cancelled");
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_refresh_loop(core: Arc<SessionCore>, epoch: u64, mut shutdown: mpsc::Receiver<()>) {
    let period = core.settings.refresh_interval();
    let min_validity = core.settings.min_validity_secs;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(?period, min_validity, "Refresh loop started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        if core.epoch().await != epoch {
            break;
        }

        let outcome = tokio::select! {
            _ = shutdown.recv() => break,
            outcome = core.provider.refresh_token(min_validity) => outcome,
        };

        match outcome {
            Ok(RefreshOutcome { refreshed: true }) => {
                if !core.apply_refresh(epoch).await {
                    if core.epoch().await == epoch {
                        core.force_logout(epoch, LogoutReason::RefreshFailed).await;
                    }
                    break;
                }
            }
            Ok(RefreshOutcome { refreshed: false }) => {
                trace!("Token still valid");
            }
            Err(e) => {
                warn!(error = %e, code = %e.code(), "Token refresh failed");
                core.force_logout(epoch, LogoutReason::RefreshFailed).await;
                break;
            }
        }
    }

    debug!("Refresh loop stopped");
}
