//! The single authority over the current session.
//!
//! `SessionController` creates sessions (login, hydrate), refreshes them
//! (on behalf of the token transport) and destroys them (logout, refresh
//! failure, inactivity). Every mutation goes through here: the in-memory
//! state, the persisted record and the transport's token slot are always
//! updated together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use reqwest::Client;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::{AuthOperation, SessionError};
use super::session::{SessionData, SessionSnapshot, User};
use super::store::SessionStore;
use super::validation;
use crate::api::{
    ApiError, AuthService, HttpAuthService, RefreshCallback, RefreshFailure, TokenSlot,
    TokenTransport, UserResponse,
};
use crate::config::Config;
use crate::inactivity::{ExpiryCallback, InactivityMonitor, InactivityState, MonitorSnapshot};

struct SessionState {
    data: Option<SessionData>,
    /// Bumped on every login and teardown. A refresh that started under an
    /// older generation must not touch the current session.
    generation: u64,
}

struct ControllerInner {
    service: Arc<dyn AuthService>,
    store: Arc<dyn SessionStore>,
    state: RwLock<SessionState>,
    tokens: TokenSlot,
    transport: TokenTransport,
    monitor: InactivityMonitor,
    snapshot: watch::Sender<SessionSnapshot>,
    loading: AtomicUsize,
}

/// Session lifecycle owner.
/// Clone is cheap - all clones share one session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    /// Build a controller talking to the configured auth service over HTTP
    pub fn from_config(config: &Config, store: Arc<dyn SessionStore>) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        let service = Arc::new(HttpAuthService::with_client(
            client.clone(),
            config.api_base_url.clone(),
        ));
        Ok(Self::with_client(config, client, service, store))
    }

    pub fn new(
        config: &Config,
        service: Arc<dyn AuthService>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(config, client, service, store))
    }

    /// Build with an existing HTTP client for the token transport
    pub fn with_client(
        config: &Config,
        client: Client,
        service: Arc<dyn AuthService>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ControllerInner>| {
            let tokens = TokenSlot::new();
            let transport = TokenTransport::new(
                client,
                config.api_base_url.clone(),
                Arc::new(tokens.clone()),
                Arc::new(SessionRefresher {
                    inner: weak.clone(),
                }),
            );
            let monitor = InactivityMonitor::new(
                config.inactivity_timeout_secs,
                config.inactivity_warning_secs,
                expiry_callback(weak.clone()),
            );
            let (snapshot, _) = watch::channel(SessionSnapshot::default());

            ControllerInner {
                service,
                store,
                state: RwLock::new(SessionState {
                    data: None,
                    generation: 0,
                }),
                tokens,
                transport,
                monitor,
                snapshot,
                loading: AtomicUsize::new(0),
            }
        });
        Self { inner }
    }

    // ===== Lifecycle =====

    /// Authenticate and establish a session. Not retried on failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        validation::validate_login(email, password)?;
        let _loading = self.inner.begin_loading();

        let response = self
            .inner
            .service
            .login(email, password)
            .await
            .map_err(|e| {
                let err = SessionError::from_api(AuthOperation::Login, e);
                warn!(error = %err, "Login failed");
                err
            })?;

        let data = SessionData::new(response.user, response.access_token, response.refresh_token);
        let user = data.user.clone();
        self.inner.establish(data);
        info!(user_id = %user.id, "Logged in");
        Ok(user)
    }

    /// Create an account. Never establishes a session; call `login` afterward.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        validation::validate_registration(name, email, password)?;
        let _loading = self.inner.begin_loading();

        let user = self
            .inner
            .service
            .register(name.trim(), email, password)
            .await
            .map_err(|e| {
                let err = SessionError::from_api(AuthOperation::Register, e);
                warn!(error = %err, "Registration failed");
                err
            })?;

        info!(user_id = %user.id, "Registered");
        Ok(user)
    }

    /// End the session. Local teardown always happens; the server call is
    /// best-effort.
    pub async fn logout(&self) {
        let _loading = self.inner.begin_loading();

        let tokens = self
            .inner
            .read_state()
            .data
            .as_ref()
            .map(|d| (d.access_token.clone(), d.refresh_token.clone()));

        // Tear down first so an in-flight refresh cannot resurrect the session
        self.inner.teardown("logout");

        match tokens {
            Some((access, refresh)) => {
                if let Err(e) = self
                    .inner
                    .service
                    .logout(Some(&access), refresh.as_deref())
                    .await
                {
                    warn!(error = %e, "Server logout failed, local session cleared anyway");
                }
                info!("Logged out");
            }
            None => debug!("Logout with no active session"),
        }
    }

    /// Restore a persisted session at startup. The token is not validated;
    /// an expired one is discovered on the first 401.
    pub async fn hydrate(&self) -> bool {
        if self.is_authenticated() {
            return true;
        }

        let data = match self.inner.store.load() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted session");
                None
            }
        };

        match data {
            Some(data) => {
                debug!(user_id = %data.user.id, "Session restored from store");
                self.inner.establish(data);
                true
            }
            None => {
                debug!("No persisted session");
                false
            }
        }
    }

    /// Force a token refresh, sharing any refresh already in flight
    pub async fn refresh(&self) -> Result<(), SessionError> {
        self.inner
            .transport
            .refresh_access_token()
            .await
            .map(|_| ())
            .map_err(SessionError::from)
    }

    /// Re-fetch the current user's identity (`GET /auth/me`)
    pub async fn reload_user(&self) -> Result<User, SessionError> {
        let generation = {
            let state = self.inner.read_state();
            if state.data.is_none() {
                return Err(SessionError::NotAuthenticated);
            }
            state.generation
        };

        let response: UserResponse = self
            .inner
            .transport
            .get("/auth/me")
            .await
            .map_err(|e| SessionError::from_api(AuthOperation::ReloadUser, e))?;

        let mut state = self.inner.write_state();
        if state.generation != generation {
            return Err(SessionError::NotAuthenticated);
        }
        if let Some(data) = state.data.as_mut() {
            data.user = response.user.clone();
            self.inner.persist(data);
        }
        drop(state);
        self.inner.publish();
        Ok(response.user)
    }

    /// Ask the server to email a password reset link
    pub async fn forgot_password(&self, email: &str) -> Result<String, SessionError> {
        validation::validate_email(email)?;
        self.inner
            .service
            .forgot_password(email)
            .await
            .map_err(|e| SessionError::from_api(AuthOperation::ForgotPassword, e))
    }

    // ===== Inactivity =====

    /// Tracked user interaction (key press, click, scroll, ...)
    pub fn record_activity(&self) {
        self.inner.monitor.activity();
    }

    /// "Stay logged in" from the inactivity warning
    pub fn stay_logged_in(&self) -> bool {
        self.inner.monitor.stay_logged_in()
    }

    pub fn inactivity(&self) -> MonitorSnapshot {
        self.inner.monitor.snapshot()
    }

    pub fn subscribe_inactivity(&self) -> watch::Receiver<MonitorSnapshot> {
        self.inner.monitor.subscribe()
    }

    // ===== Accessors =====

    /// Transport for authenticated API calls, sharing this session's token
    /// and refresh coordination
    pub fn transport(&self) -> TokenTransport {
        self.inner.transport.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.read_state().data.as_ref().map(|d| d.user.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.read_state().data.as_ref().map(|d| d.access_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read_state().data.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::SeqCst) > 0
    }

    /// Session age in minutes (for display)
    pub fn session_age_minutes(&self) -> Option<i64> {
        self.inner.read_state().data.as_ref().map(|d| d.age_minutes())
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Wait until no session operation is in flight, including a logout
    /// started by the inactivity monitor
    pub async fn settled(&self) {
        let mut snapshots = self.subscribe();
        while snapshots.borrow_and_update().loading {
            if snapshots.changed().await.is_err() {
                return;
            }
        }
    }
}

impl ControllerInner {
    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, data: &SessionData) {
        if let Err(e) = self.store.save(data) {
            warn!(error = %e, "Failed to save session");
        }
    }

    fn publish(&self) {
        let user = self.read_state().data.as_ref().map(|d| d.user.clone());
        self.snapshot.send_replace(SessionSnapshot {
            user,
            loading: self.loading.load(Ordering::SeqCst) > 0,
        });
    }

    fn begin_loading(&self) -> LoadingGuard<'_> {
        self.loading.fetch_add(1, Ordering::SeqCst);
        self.publish();
        LoadingGuard { inner: self }
    }

    /// Install a new session everywhere: memory, store, token slot, monitor
    fn establish(&self, data: SessionData) {
        {
            let mut state = self.write_state();
            state.generation += 1;
            self.tokens.set(Some(data.access_token.clone()));
            self.persist(&data);
            state.data = Some(data);
        }
        self.monitor.start();
        self.publish();
    }

    /// Destroy the session locally
    fn teardown(&self, reason: &str) {
        self.teardown_if(|_| true, reason);
    }

    /// Tear down only if the session is still the one from `generation`
    fn teardown_if_current(&self, generation: u64, reason: &str) -> bool {
        self.teardown_if(|state| state.generation == generation, reason)
    }

    fn teardown_if<F>(&self, should: F, reason: &str) -> bool
    where
        F: FnOnce(&SessionState) -> bool,
    {
        {
            let mut state = self.write_state();
            if !should(&state) {
                return false;
            }
            state.generation += 1;
            state.data = None;
            self.tokens.clear();
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear persisted session");
            }
        }
        self.monitor.stop();
        self.publish();
        debug!(reason, "Session torn down");
        true
    }

    async fn refresh_session(&self) -> Result<String, RefreshFailure> {
        let (generation, refresh_token) = {
            let state = self.read_state();
            let data = state.data.as_ref().ok_or(RefreshFailure::NoSession)?;
            (state.generation, data.refresh_token.clone())
        };

        debug!(generation, "Refreshing access token");
        match self.service.refresh(refresh_token.as_deref()).await {
            Ok(response) => {
                let mut state = self.write_state();
                if state.generation != generation {
                    info!("Discarding refresh result for a session that has ended");
                    return Err(RefreshFailure::Superseded);
                }
                let data = state.data.as_mut().ok_or(RefreshFailure::Superseded)?;
                data.apply_refresh(response.access_token.clone(), response.refresh_token);
                self.tokens.set(Some(response.access_token.clone()));
                self.persist(data);
                debug!("Access token refreshed");
                Ok(response.access_token)
            }
            Err(e) => {
                let detail = e.to_string();
                match SessionError::from_api(AuthOperation::Refresh, e) {
                    SessionError::RefreshFailed => {
                        warn!(error = %detail, "Refresh token rejected, ending session");
                        if !self.teardown_if_current(generation, "refresh failed") {
                            return Err(RefreshFailure::Superseded);
                        }
                        Err(RefreshFailure::Rejected(detail))
                    }
                    SessionError::NetworkError(message) => {
                        warn!(error = %detail, "Auth service unreachable during refresh, keeping session");
                        Err(RefreshFailure::Unreachable(message))
                    }
                    other => {
                        warn!(error = %detail, "Token refresh failed, keeping session");
                        Err(RefreshFailure::Unavailable(other.to_string()))
                    }
                }
            }
        }
    }
}

struct LoadingGuard<'a> {
    inner: &'a ControllerInner,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.inner.loading.fetch_sub(1, Ordering::SeqCst);
        self.inner.publish();
    }
}

/// Hands the transport a way to refresh without owning the controller
struct SessionRefresher {
    inner: Weak<ControllerInner>,
}

#[async_trait]
impl RefreshCallback for SessionRefresher {
    async fn refresh(&self) -> Result<String, RefreshFailure> {
        let inner = self.inner.upgrade().ok_or(RefreshFailure::NoSession)?;
        inner.refresh_session().await
    }
}

fn expiry_callback(inner: Weak<ControllerInner>) -> ExpiryCallback {
    Arc::new(move || {
        let inner = inner.clone();
        async move {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            // A new login may have restarted the monitor since expiry fired
            if inner.monitor.state() != InactivityState::Expired {
                return;
            }
            SessionController { inner }.logout().await;
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{LoginResponse, RefreshResponse};
    use crate::auth::store::MemorySessionStore;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted auth service; records which endpoints were hit
    #[derive(Default)]
    struct StubService {
        calls: Mutex<Vec<&'static str>>,
        fail_logout: bool,
        logout_delay: Option<Duration>,
        refresh_delay: Option<Duration>,
        refresh_status: Option<reqwest::StatusCode>,
    }

    impl StubService {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().expect("calls lock").push(call);
        }
    }

    #[async_trait]
    impl AuthService for StubService {
        async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
            self.record("login");
            if password != "123456" {
                return Err(ApiError::from_status(
                    reqwest::StatusCode::UNAUTHORIZED,
                    r#"{"message":"Invalid email or password"}"#,
                ));
            }
            Ok(LoginResponse {
                user: User::new(1, email),
                access_token: "A".into(),
                refresh_token: Some("R".into()),
            })
        }

        async fn register(&self, name: &str, email: &str, _: &str) -> Result<User, ApiError> {
            self.record("register");
            Ok(User::new(2, email).with_name(name))
        }

        async fn logout(&self, _: Option<&str>, _: Option<&str>) -> Result<(), ApiError> {
            if let Some(delay) = self.logout_delay {
                tokio::time::sleep(delay).await;
            }
            self.record("logout");
            if self.fail_logout {
                return Err(ApiError::ServerError("down".into()));
            }
            Ok(())
        }

        async fn refresh(&self, _: Option<&str>) -> Result<RefreshResponse, ApiError> {
            self.record("refresh");
            if let Some(delay) = self.refresh_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(status) = self.refresh_status {
                return Err(ApiError::from_status(status, r#"{"message":"refresh failed"}"#));
            }
            Ok(RefreshResponse {
                access_token: "B".into(),
                refresh_token: None,
            })
        }

        async fn forgot_password(&self, _: &str) -> Result<String, ApiError> {
            self.record("forgot_password");
            Ok("Reset link sent".into())
        }
    }

    fn controller(service: StubService, config: Config) -> (SessionController, Arc<StubService>, Arc<MemorySessionStore>) {
        let service = Arc::new(service);
        let store = Arc::new(MemorySessionStore::new());
        let ctrl = SessionController::new(&config, service.clone(), store.clone())
            .expect("controller");
        (ctrl, service, store)
    }

    #[tokio::test]
    async fn test_login_installs_session_everywhere() {
        let (ctrl, _, store) = controller(StubService::default(), Config::default());
        let user = ctrl.login("test@example.com", "123456").await.expect("login");

        assert_eq!(user, User::new(1, "test@example.com"));
        assert_eq!(ctrl.user(), Some(user));
        assert_eq!(ctrl.transport().current_token().as_deref(), Some("A"));
        assert!(store.raw().is_some());
        assert_eq!(ctrl.inactivity().state, InactivityState::Active);
        assert!(!ctrl.is_loading());
    }

    #[tokio::test]
    async fn test_invalid_input_skips_network() {
        let (ctrl, service, _) = controller(StubService::default(), Config::default());
        let err = ctrl.login("not-an-email", "123456").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput(_)));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_login_leaves_session_unset() {
        let (ctrl, _, store) = controller(StubService::default(), Config::default());
        let err = ctrl.login("test@example.com", "wrong-pass").await.unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidCredentials("Invalid email or password".into())
        );
        assert!(ctrl.user().is_none());
        assert!(ctrl.transport().current_token().is_none());
        assert!(store.raw().is_none());
    }

    #[tokio::test]
    async fn test_register_does_not_log_in() {
        let (ctrl, service, _) = controller(StubService::default(), Config::default());
        let user = ctrl
            .register("Jane Smith", "jane@example.com", "123456")
            .await
            .expect("register");
        assert_eq!(user.display_name(), "Jane Smith");
        assert!(!ctrl.is_authenticated());
        assert_eq!(service.calls(), vec!["register"]);
    }

    #[tokio::test]
    async fn test_logout_tears_down_even_when_server_fails() {
        let service = StubService {
            fail_logout: true,
            ..Default::default()
        };
        let (ctrl, service, store) = controller(service, Config::default());
        ctrl.login("test@example.com", "123456").await.expect("login");

        ctrl.logout().await;

        assert_eq!(service.calls(), vec!["login", "logout"]);
        assert!(ctrl.user().is_none());
        assert!(ctrl.transport().current_token().is_none());
        assert!(store.raw().is_none());
        assert_eq!(ctrl.inactivity().state, InactivityState::Idle);
    }

    #[tokio::test]
    async fn test_logout_without_session_skips_server() {
        let (ctrl, service, _) = controller(StubService::default(), Config::default());
        ctrl.logout().await;
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_hydrate_restores_token_on_fresh_instance() {
        let service = Arc::new(StubService::default());
        let store = Arc::new(MemorySessionStore::new());
        let config = Config::default();

        let first = SessionController::new(&config, service.clone(), store.clone()).expect("ctrl");
        first.login("test@example.com", "123456").await.expect("login");

        let second = SessionController::new(&config, service, store).expect("ctrl");
        assert!(second.transport().current_token().is_none());
        assert!(second.hydrate().await);
        assert_eq!(second.transport().current_token().as_deref(), Some("A"));
        assert_eq!(second.user(), Some(User::new(1, "test@example.com")));
        assert_eq!(second.inactivity().state, InactivityState::Active);
    }

    #[tokio::test]
    async fn test_hydrate_with_empty_store() {
        let (ctrl, _, _) = controller(StubService::default(), Config::default());
        assert!(!ctrl.hydrate().await);
        assert_eq!(ctrl.inactivity().state, InactivityState::Idle);
    }

    #[tokio::test]
    async fn test_manual_refresh_swaps_token() {
        let (ctrl, _, store) = controller(StubService::default(), Config::default());
        ctrl.login("test@example.com", "123456").await.expect("login");

        ctrl.refresh().await.expect("refresh");

        assert_eq!(ctrl.access_token().as_deref(), Some("B"));
        assert_eq!(ctrl.transport().current_token().as_deref(), Some("B"));
        let raw = store.raw().expect("persisted");
        assert!(raw.contains("\"accessToken\": \"B\""));
        assert!(raw.contains("\"refreshToken\": \"R\""));
    }

    #[tokio::test]
    async fn test_refresh_without_session() {
        let (ctrl, service, _) = controller(StubService::default(), Config::default());
        assert_eq!(ctrl.refresh().await, Err(SessionError::NotAuthenticated));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_refresh_ends_session() {
        let service = StubService {
            refresh_status: Some(reqwest::StatusCode::UNAUTHORIZED),
            ..Default::default()
        };
        let (ctrl, _, store) = controller(service, Config::default());
        ctrl.login("test@example.com", "123456").await.expect("login");

        assert_eq!(ctrl.refresh().await, Err(SessionError::RefreshFailed));
        assert!(!ctrl.is_authenticated());
        assert!(store.raw().is_none());
    }

    #[tokio::test]
    async fn test_server_failure_during_refresh_keeps_session() {
        let service = StubService {
            refresh_status: Some(reqwest::StatusCode::SERVICE_UNAVAILABLE),
            ..Default::default()
        };
        let (ctrl, _, store) = controller(service, Config::default());
        ctrl.login("test@example.com", "123456").await.expect("login");

        assert_eq!(
            ctrl.refresh().await,
            Err(SessionError::Unknown("refresh failed".into()))
        );
        assert!(ctrl.is_authenticated());
        assert_eq!(ctrl.transport().current_token().as_deref(), Some("A"));
        assert!(store.raw().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_after_logout_is_discarded() {
        let service = StubService {
            refresh_delay: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let (ctrl, _, store) = controller(service, Config::default());
        ctrl.login("test@example.com", "123456").await.expect("login");

        let refreshing = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move { ctrl.refresh().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        ctrl.logout().await;

        let result = refreshing.await.expect("join");
        assert_eq!(result, Err(SessionError::RefreshFailed));
        assert!(ctrl.user().is_none());
        assert!(ctrl.transport().current_token().is_none());
        assert!(store.raw().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_forces_logout() {
        let config = Config {
            inactivity_timeout_secs: 10,
            inactivity_warning_secs: 3,
            ..Config::default()
        };
        let (ctrl, service, store) = controller(StubService::default(), config);
        ctrl.login("test@example.com", "123456").await.expect("login");

        tokio::time::sleep(Duration::from_millis(7_500)).await;
        let snapshot = ctrl.inactivity();
        assert_eq!(snapshot.state, InactivityState::Warning);
        assert!(snapshot.warning_visible);

        tokio::time::sleep(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;

        assert!(ctrl.user().is_none());
        assert!(store.raw().is_none());
        assert_eq!(ctrl.inactivity().state, InactivityState::Idle);
        assert_eq!(service.calls(), vec!["login", "logout"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_waits_for_expiry_logout() {
        let config = Config {
            inactivity_timeout_secs: 2,
            inactivity_warning_secs: 1,
            ..Config::default()
        };
        let service = StubService {
            logout_delay: Some(Duration::from_secs(3)),
            ..Default::default()
        };
        let (ctrl, service, store) = controller(service, config);
        ctrl.login("test@example.com", "123456").await.expect("login");

        let mut inactivity = ctrl.subscribe_inactivity();
        while inactivity.borrow_and_update().state != InactivityState::Idle {
            inactivity.changed().await.expect("monitor alive");
        }
        // Local teardown is done but the server call is still running
        assert!(store.raw().is_none());
        assert!(ctrl.is_loading());
        assert_eq!(service.calls(), vec!["login"]);

        ctrl.settled().await;
        assert!(!ctrl.is_loading());
        assert_eq!(service.calls(), vec!["login", "logout"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stay_logged_in_keeps_session() {
        let config = Config {
            inactivity_timeout_secs: 10,
            inactivity_warning_secs: 3,
            ..Config::default()
        };
        let (ctrl, _, _) = controller(StubService::default(), config);
        ctrl.login("test@example.com", "123456").await.expect("login");

        tokio::time::sleep(Duration::from_millis(8_500)).await;
        assert_eq!(ctrl.inactivity().state, InactivityState::Warning);

        assert!(ctrl.stay_logged_in());
        assert_eq!(ctrl.inactivity().state, InactivityState::Active);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(ctrl.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_during_warning_keeps_session() {
        let config = Config {
            inactivity_timeout_secs: 10,
            inactivity_warning_secs: 3,
            ..Config::default()
        };
        let (ctrl, service, _) = controller(StubService::default(), config);
        ctrl.login("test@example.com", "123456").await.expect("login");

        tokio::time::sleep(Duration::from_millis(8_500)).await;
        assert_eq!(ctrl.inactivity().state, InactivityState::Warning);

        ctrl.record_activity();
        let snapshot = ctrl.inactivity();
        assert_eq!(snapshot.state, InactivityState::Active);
        assert_eq!(snapshot.remaining_secs, 10);
        assert!(!snapshot.warning_visible);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(ctrl.is_authenticated());
        assert_eq!(service.calls(), vec!["login"]);
    }

    #[tokio::test]
    async fn test_snapshot_tracks_user() {
        let (ctrl, _, _) = controller(StubService::default(), Config::default());
        let mut rx = ctrl.subscribe();
        assert_eq!(*rx.borrow_and_update(), SessionSnapshot::default());

        ctrl.login("test@example.com", "123456").await.expect("login");
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.user, Some(User::new(1, "test@example.com")));
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_forgot_password_validates_email() {
        let (ctrl, service, _) = controller(StubService::default(), Config::default());
        assert!(ctrl.forgot_password("nope").await.is_err());
        assert_eq!(
            ctrl.forgot_password("test@example.com").await.as_deref(),
            Ok("Reset link sent")
        );
        assert_eq!(service.calls(), vec!["forgot_password"]);
    }
}
