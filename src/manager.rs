//! The session manager.
//!
//! [`SessionManager`] is an explicit, injectable object: it owns the session
//! store, the transport, the renewal timer and the auth-state channel. Clones
//! share all of it; the renewal timer is cancelled when the last clone is
//! dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, watch};

use crate::client::AuthorizedClient;
use crate::config::{RenewalOptions, TetherConfig};
use crate::events::{EventRegistry, Listener, SessionEvent};
use crate::normalize::normalize_user;
use crate::renewal::{RenewalOutcome, RenewalScheduler, RenewalState, SkipReason};
use crate::session::{CookieChannel, MemoryStorage, Session, SessionStorage, SessionStore};
use crate::sync::{AuthWatcher, PageVisibility, SyncTrigger};
use crate::transport::{AuthTransport, TransportError};
use crate::{SecretString, SessionError};

pub struct SessionManager<T: AuthTransport> {
    inner: Arc<Inner<T>>,
    scheduler: Arc<RenewalScheduler>,
}

impl<T: AuthTransport> Clone for SessionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

struct Inner<T> {
    config: TetherConfig,
    transport: T,
    store: SessionStore,
    events: EventRegistry,
    /// Serializes token exchanges so two callers never spend the same
    /// refresh token.
    renewal_lock: Mutex<()>,
    visible: AtomicBool,
    auth_tx: watch::Sender<bool>,
}

enum ExchangeCause {
    Scheduled,
    /// A request carrying this token was answered with 401.
    Rejected(Option<SecretString>),
}

/// Builder for [`SessionManager`].
///
/// Both storages default to [`MemoryStorage`].
pub struct SessionManagerBuilder<T: AuthTransport> {
    config: TetherConfig,
    transport: T,
    durable: Option<Arc<dyn SessionStorage>>,
    mirror: Option<Arc<dyn SessionStorage>>,
    events: EventRegistry,
}

impl<T: AuthTransport> SessionManagerBuilder<T> {
    /// The storage that survives restarts and is shared between views.
    #[must_use]
    pub fn durable(mut self, storage: impl SessionStorage + 'static) -> Self {
        self.durable = Some(Arc::new(storage));
        self
    }

    /// The view-scoped copy kept for older readers.
    #[must_use]
    pub fn mirror(mut self, storage: impl SessionStorage + 'static) -> Self {
        self.mirror = Some(Arc::new(storage));
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: impl Listener) -> Self {
        self.events.listen(listener);
        self
    }

    /// Validates the configuration and loads any persisted session.
    ///
    /// Renewal is not started; call [`SessionManager::restore`] to resume a
    /// persisted session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] for an invalid configuration.
    pub fn build(self) -> Result<SessionManager<T>, SessionError> {
        self.config.validate()?;

        let durable: Arc<dyn SessionStorage> = match self.durable {
            Some(storage) => storage,
            None => Arc::new(MemoryStorage::new()),
        };
        let mirror: Arc<dyn SessionStorage> = match self.mirror {
            Some(storage) => storage,
            None => Arc::new(MemoryStorage::new()),
        };
        let mut store = SessionStore::new(self.config.storage_key.clone(), durable, mirror);

        if self.config.cookies.enabled {
            if let Some(jar) = self.transport.cookie_jar() {
                let cookies =
                    CookieChannel::new(jar, &self.config.api_base_url, self.config.cookies.clone())?;
                store = store.with_cookies(cookies);
            }
        }

        let session = store.load();
        let (auth_tx, _) = watch::channel(session.is_authenticated());

        Ok(SessionManager {
            inner: Arc::new(Inner {
                config: self.config,
                transport: self.transport,
                store,
                events: self.events,
                renewal_lock: Mutex::new(()),
                visible: AtomicBool::new(true),
                auth_tx,
            }),
            scheduler: Arc::new(RenewalScheduler::new()),
        })
    }
}

impl<T: AuthTransport> SessionManager<T> {
    pub fn builder(config: TetherConfig, transport: T) -> SessionManagerBuilder<T> {
        SessionManagerBuilder {
            config,
            transport,
            durable: None,
            mirror: None,
            events: EventRegistry::new(),
        }
    }

    /// A manager with in-memory storages and no listeners.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] for an invalid configuration.
    pub fn new(config: TetherConfig, transport: T) -> Result<Self, SessionError> {
        Self::builder(config, transport).build()
    }

    pub fn config(&self) -> &TetherConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    /// An HTTP client that authorizes every request with this session.
    pub fn client(&self) -> AuthorizedClient<T> {
        AuthorizedClient::new(self.clone())
    }

    /// Logs in and starts background renewal.
    ///
    /// On failure every copy of the session is cleared so no half-written
    /// state survives.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidCredentials`] when the backend rejects the
    ///   login (4xx), with its `detail`/`message` text
    /// - [`SessionError::Transport`] for network failures and 5xx responses
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "session_login", skip_all, err)
    )]
    pub async fn login(
        &self,
        email: &str,
        password: impl Into<SecretString>,
    ) -> Result<Session, SessionError> {
        let password = password.into();

        match self.inner.transport.login(email, &password).await {
            Ok(response) => {
                let profile = normalize_user(&response.user);
                let session =
                    Session::from_login(profile, response.access_token, response.refresh_token);
                self.inner.store.replace(&session);
                self.inner.publish(&session).await;

                log::info!(
                    target: "tether",
                    "msg=\"login success\" user_id={:?}",
                    session.user_id
                );
                self.inner
                    .events
                    .dispatch(SessionEvent::LoginSuccess {
                        user_id: session.user_id,
                        email: email.to_owned(),
                        at: Utc::now(),
                    })
                    .await;

                self.start_renewal(self.inner.config.renewal.clone());
                Ok(session)
            }
            Err(err) => {
                self.stop_renewal();
                self.inner.store.clear();
                self.inner.publish(&Session::default()).await;

                let error = match err {
                    TransportError::Status { status, message } if (400..500).contains(&status) => {
                        SessionError::InvalidCredentials(
                            message.unwrap_or_else(|| "Invalid email or password".to_owned()),
                        )
                    }
                    other => SessionError::Transport(other),
                };

                log::warn!(
                    target: "tether",
                    "msg=\"login failed\" error=\"{}\"",
                    error
                );
                self.inner
                    .events
                    .dispatch(SessionEvent::LoginFailed {
                        email: email.to_owned(),
                        reason: error.to_string(),
                        at: Utc::now(),
                    })
                    .await;

                Err(error)
            }
        }
    }

    /// Stops renewal and clears the session everywhere.
    pub async fn logout(&self) {
        self.stop_renewal();
        let user_id = self.inner.store.current().user_id;
        self.inner.store.clear();
        self.inner.publish(&Session::default()).await;

        log::info!(target: "tether", "msg=\"logout\" user_id={:?}", user_id);
        self.inner
            .events
            .dispatch(SessionEvent::LoggedOut {
                user_id,
                at: Utc::now(),
            })
            .await;
        self.inner
            .events
            .dispatch(SessionEvent::SessionCleared { at: Utc::now() })
            .await;
    }

    /// Picks up a persisted session (e.g. after a restart) and resumes
    /// renewal if it holds a refresh token.
    ///
    /// Returns whether the restored session is authenticated.
    pub async fn restore(&self) -> bool {
        let session = self.inner.store.load();
        let authenticated = self.inner.publish(&session).await;
        if session.refresh_token().is_some() {
            self.start_renewal(self.inner.config.renewal.clone());
        }
        authenticated
    }

    /// Exchanges the refresh token now.
    pub async fn renew(&self) -> RenewalOutcome {
        self.inner.exchange(ExchangeCause::Scheduled).await
    }

    /// Refresh triggered by a 401 on a request that carried `used`.
    ///
    /// Skips the exchange when another caller already replaced that token.
    pub(crate) async fn refresh_after_unauthorized(
        &self,
        used: Option<&SecretString>,
    ) -> RenewalOutcome {
        self.inner
            .exchange(ExchangeCause::Rejected(used.cloned()))
            .await
    }

    /// Starts (or restarts) the renewal timer.
    pub fn start_renewal(&self, options: RenewalOptions) {
        let inner = Arc::clone(&self.inner);
        let skip_when_hidden = options.skip_when_hidden;
        self.scheduler.start(&options, move || {
            let inner = Arc::clone(&inner);
            async move {
                inner.tick(skip_when_hidden).await;
            }
        });
    }

    /// Cancels the renewal timer. Safe to call when it is not running.
    pub fn stop_renewal(&self) {
        self.scheduler.stop();
    }

    pub fn renewal_state(&self) -> RenewalState {
        self.scheduler.state()
    }

    /// The current access token, as attached to outgoing requests.
    pub fn access_token(&self) -> Option<SecretString> {
        self.inner.store.current().access_token().cloned()
    }

    /// The session as this process last loaded or wrote it.
    pub fn session(&self) -> Session {
        self.inner.store.current()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.store.current().is_authenticated()
    }

    pub fn set_visibility(&self, visibility: PageVisibility) {
        self.inner
            .visible
            .store(visibility == PageVisibility::Visible, Ordering::SeqCst);
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible.load(Ordering::SeqCst)
    }

    /// Reacts to an external trigger; returns the re-derived auth flag.
    pub async fn handle_trigger(&self, trigger: SyncTrigger) -> bool {
        self.inner.handle_trigger(trigger).await
    }

    /// Receives auth-flag changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.auth_tx.subscribe()
    }

    /// Spawns a task that handles every trigger sent on `triggers`.
    ///
    /// Drop the returned watcher to deregister.
    pub fn watch(&self, mut triggers: mpsc::Receiver<SyncTrigger>) -> AuthWatcher {
        let inner = Arc::clone(&self.inner);
        AuthWatcher::new(tokio::spawn(async move {
            while let Some(trigger) = triggers.recv().await {
                inner.handle_trigger(trigger).await;
            }
        }))
    }
}

impl<T: AuthTransport> Inner<T> {
    async fn tick(&self, skip_when_hidden: bool) -> RenewalOutcome {
        if skip_when_hidden && !self.visible.load(Ordering::SeqCst) {
            log::debug!(target: "tether::renewal", "msg=\"tick skipped\" reason=\"hidden\"");
            return RenewalOutcome::Skipped(SkipReason::Hidden);
        }
        self.exchange(ExchangeCause::Scheduled).await
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "token_exchange", skip_all)
    )]
    async fn exchange(&self, cause: ExchangeCause) -> RenewalOutcome {
        let guard = self.renewal_lock.lock().await;
        let epoch = self.store.epoch();
        // re-read: another view may have rotated the refresh token
        let session = self.store.load();

        if let ExchangeCause::Rejected(used) = &cause {
            let current = session.access_token();
            if used.as_ref() != current {
                // another caller already exchanged since this request was sent
                return match current {
                    Some(_) => RenewalOutcome::Coalesced,
                    None => RenewalOutcome::Skipped(SkipReason::TokenDropped),
                };
            }
        }

        let Some(refresh_token) = session.refresh_token().cloned() else {
            log::debug!(target: "tether::renewal", "msg=\"tick skipped\" reason=\"no refresh token\"");
            return RenewalOutcome::Skipped(SkipReason::NoRefreshToken);
        };

        let (outcome, written) = match self.transport.refresh(&refresh_token).await {
            Ok(response) => {
                let rotated = response.refresh_token.is_some();
                let written = self.store.update_if(epoch, |s| {
                    s.access_token = Some(response.access_token);
                    if let Some(token) = response.refresh_token {
                        s.refresh_token = Some(token);
                    }
                });
                match written {
                    Some(session) => (RenewalOutcome::Renewed { rotated }, Some(session)),
                    None => (RenewalOutcome::Discarded, None),
                }
            }
            Err(err) => match self.store.update_if(epoch, |s| s.access_token = None) {
                Some(session) => (RenewalOutcome::Failed(err), Some(session)),
                None => (RenewalOutcome::Discarded, None),
            },
        };
        drop(guard);

        let Some(session) = written else {
            log::debug!(
                target: "tether::renewal",
                "msg=\"renewal result discarded\" reason=\"session cleared\""
            );
            return outcome;
        };
        self.publish(&session).await;

        match &outcome {
            RenewalOutcome::Renewed { rotated } => {
                log::info!(
                    target: "tether::renewal",
                    "msg=\"token renewed\" user_id={:?} rotated={}",
                    session.user_id,
                    rotated
                );
                self.events
                    .dispatch(SessionEvent::TokenRenewed {
                        user_id: session.user_id,
                        rotated: *rotated,
                        at: Utc::now(),
                    })
                    .await;
            }
            RenewalOutcome::Failed(err) => {
                log::warn!(
                    target: "tether::renewal",
                    "msg=\"token renewal failed, access token dropped\" user_id={:?} error=\"{}\"",
                    session.user_id,
                    err
                );
                self.events
                    .dispatch(SessionEvent::RenewalFailed {
                        user_id: session.user_id,
                        reason: err.to_string(),
                        at: Utc::now(),
                    })
                    .await;
            }
            _ => {}
        }
        outcome
    }

    async fn handle_trigger(&self, trigger: SyncTrigger) -> bool {
        if let SyncTrigger::Visibility(visibility) = &trigger {
            self.visible
                .store(*visibility == PageVisibility::Visible, Ordering::SeqCst);
        }
        if !trigger.needs_reload(self.store.key()) {
            return *self.auth_tx.borrow();
        }
        let session = self.store.load();
        self.publish(&session).await
    }

    /// Publishes the auth flag derived from `session`; returns it.
    async fn publish(&self, session: &Session) -> bool {
        let authenticated = session.is_authenticated();
        let changed = self.auth_tx.send_if_modified(|current| {
            if *current == authenticated {
                return false;
            }
            *current = authenticated;
            true
        });
        if changed {
            log::debug!(
                target: "tether",
                "msg=\"auth state changed\" authenticated={}",
                authenticated
            );
            self.events
                .dispatch(SessionEvent::AuthStateChanged {
                    authenticated,
                    at: Utc::now(),
                })
                .await;
        }
        authenticated
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::session::FileStorage;
    use crate::transport::MockTransport;

    fn config() -> TetherConfig {
        TetherConfig {
            renewal: RenewalOptions::every(Duration::from_secs(1)),
            ..TetherConfig::new("https://hr.example.com/api")
        }
    }

    fn admin_session() -> Session {
        Session {
            user_id: Some(7),
            role: Some("ADMIN".to_owned()),
            access_token: Some("a1".into()),
            refresh_token: Some("r1".into()),
            ..Default::default()
        }
    }

    fn manager_with_session(transport: MockTransport) -> SessionManager<MockTransport> {
        let manager = SessionManager::new(config(), transport).unwrap();
        manager.store().save(&admin_session());
        manager
    }

    fn token(session: &Session) -> Option<&str> {
        session.access_token().map(SecretString::expose_secret)
    }

    fn refresh(session: &Session) -> Option<&str> {
        session.refresh_token().map(SecretString::expose_secret)
    }

    struct Recorder(Arc<StdMutex<Vec<&'static str>>>);

    #[async_trait]
    impl Listener for Recorder {
        async fn handle(&self, event: &SessionEvent) {
            self.0.lock().unwrap().push(event.name());
        }
    }

    #[tokio::test]
    async fn test_save_then_load_identical_fields() {
        let manager = SessionManager::new(config(), MockTransport::new()).unwrap();
        manager.store().save(&admin_session());

        let loaded = manager.store().load();
        assert_eq!(loaded.user_id, Some(7));
        assert_eq!(loaded.role.as_deref(), Some("ADMIN"));
        assert_eq!(token(&loaded), Some("a1"));
        assert_eq!(refresh(&loaded), Some("r1"));
    }

    #[tokio::test]
    async fn test_login_stores_normalized_session() {
        let transport = MockTransport::new().with_user(
            "ada@example.com",
            "hunter2",
            json!({ "id": 7, "name": "Ada Lovelace", "role": "Admin", "team": "Platform" }),
        );
        let manager = SessionManager::new(config(), transport).unwrap();

        let session = manager.login("ada@example.com", "hunter2").await.unwrap();

        assert_eq!(session.user_id, Some(7));
        assert_eq!(session.full_name.as_deref(), Some("Ada Lovelace"));
        assert!(session.has_any_role(&["ADMIN"]));
        assert_eq!(session.extra["team"], "Platform");
        assert!(manager.is_authenticated());
        assert_eq!(manager.store().load(), session);
        assert_eq!(manager.renewal_state(), RenewalState::Running);
    }

    #[tokio::test]
    async fn test_login_failure_clears_session() {
        let transport = MockTransport::new().with_user("ada@example.com", "hunter2", json!({ "id": 7 }));
        let manager = manager_with_session(transport);
        assert!(manager.is_authenticated());

        let err = manager.login("ada@example.com", "wrong").await.unwrap_err();

        assert_eq!(
            err,
            SessionError::InvalidCredentials("Incorrect email or password".to_owned())
        );
        assert_eq!(manager.store().load(), Session::default());
        assert!(!manager.is_authenticated());
        assert_eq!(manager.renewal_state(), RenewalState::Stopped);
    }

    #[tokio::test]
    async fn test_login_network_failure_is_transport_error() {
        struct Offline;

        #[async_trait]
        impl AuthTransport for Offline {
            async fn login(
                &self,
                _email: &str,
                _password: &SecretString,
            ) -> Result<crate::LoginResponse, TransportError> {
                Err(TransportError::Network("connection refused".to_owned()))
            }

            async fn refresh(
                &self,
                _refresh_token: &SecretString,
            ) -> Result<crate::RefreshResponse, TransportError> {
                Err(TransportError::Network("connection refused".to_owned()))
            }

            async fn execute(
                &self,
                _request: &crate::ApiRequest,
                _bearer: Option<&SecretString>,
            ) -> Result<crate::ApiResponse, TransportError> {
                Err(TransportError::Network("connection refused".to_owned()))
            }
        }

        let manager = SessionManager::new(config(), Offline).unwrap();
        let err = manager.login("ada@example.com", "hunter2").await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_tick_stores_rotated_pair() {
        let transport = MockTransport::new();
        transport.respond_to_refresh("a2", Some("r2"));
        let manager = manager_with_session(transport.clone());

        manager.start_renewal(RenewalOptions::every(Duration::from_millis(1000)).immediately());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stored = manager.store().load();
        assert_eq!(token(&stored), Some("a2"));
        assert_eq!(refresh(&stored), Some("r2"));
        assert_eq!(transport.refresh_calls(), 1);
        assert_eq!(transport.seen_refresh_tokens(), vec!["r1"]);
    }

    #[tokio::test]
    async fn test_refresh_without_rotation_keeps_refresh_token() {
        let transport = MockTransport::new();
        transport.respond_to_refresh("a2", None);
        let manager = manager_with_session(transport);

        assert_eq!(manager.renew().await, RenewalOutcome::Renewed { rotated: false });

        let stored = manager.store().load();
        assert_eq!(token(&stored), Some("a2"));
        assert_eq!(refresh(&stored), Some("r1"));
    }

    #[tokio::test]
    async fn test_failed_refresh_drops_only_access_token() {
        let transport = MockTransport::new();
        transport.fail_refresh(TransportError::Status {
            status: 401,
            message: None,
        });
        let manager = manager_with_session(transport.clone());

        let outcome = manager.renew().await;
        assert!(matches!(outcome, RenewalOutcome::Failed(_)));

        let stored = manager.store().load();
        assert!(stored.access_token().is_none());
        assert_eq!(refresh(&stored), Some("r1"));
        assert!(!manager.is_authenticated());

        // a later successful tick restores a valid token
        transport.respond_to_refresh("a3", None);
        assert_eq!(manager.renew().await, RenewalOutcome::Renewed { rotated: false });
        assert_eq!(token(&manager.store().load()), Some("a3"));
        assert!(manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_stop_scheduler() {
        let transport = MockTransport::new();
        transport.fail_refresh(TransportError::Network("timeout".to_owned()));
        let manager = manager_with_session(transport.clone());

        manager.start_renewal(RenewalOptions::every(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(transport.refresh_calls(), 2);
        assert_eq!(manager.renewal_state(), RenewalState::Running);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_noop() {
        let transport = MockTransport::new();
        let manager = SessionManager::new(config(), transport.clone()).unwrap();
        manager.store().save(&Session {
            user_id: Some(7),
            access_token: Some("a1".into()),
            ..Default::default()
        });

        assert_eq!(
            manager.renew().await,
            RenewalOutcome::Skipped(SkipReason::NoRefreshToken)
        );
        assert_eq!(transport.refresh_calls(), 0);
        assert_eq!(token(&manager.store().load()), Some("a1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_fires_once_per_interval() {
        let transport = MockTransport::new();
        let manager = manager_with_session(transport.clone());

        manager.start_renewal(RenewalOptions::every(Duration::from_secs(1)));
        manager.start_renewal(RenewalOptions::every(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(transport.refresh_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_fires_no_further_renewals() {
        let transport = MockTransport::new();
        let manager = manager_with_session(transport.clone());

        manager.start_renewal(RenewalOptions::every(Duration::from_secs(1)));
        manager.stop_renewal();
        assert_eq!(manager.renewal_state(), RenewalState::Stopped);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.refresh_calls(), 0);

        // stopping again is fine
        manager.stop_renewal();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_page_skips_ticks() {
        let transport = MockTransport::new();
        let manager = manager_with_session(transport.clone());
        manager.set_visibility(PageVisibility::Hidden);

        manager.start_renewal(RenewalOptions::every(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(transport.refresh_calls(), 0);
        assert_eq!(manager.renewal_state(), RenewalState::Running);

        manager.set_visibility(PageVisibility::Visible);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_while_hidden_when_configured() {
        let transport = MockTransport::new();
        let manager = manager_with_session(transport.clone());
        manager.set_visibility(PageVisibility::Hidden);

        manager.start_renewal(RenewalOptions::every(Duration::from_secs(1)).while_hidden());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(transport.refresh_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_during_exchange_discards_result() {
        let transport = MockTransport::new();
        transport.set_refresh_delay(Duration::from_millis(100));
        let manager = manager_with_session(transport.clone());

        let renewing = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.renew().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.logout().await;

        assert_eq!(renewing.await.unwrap(), RenewalOutcome::Discarded);
        assert_eq!(manager.store().load(), Session::default());
        assert_eq!(manager.renewal_state(), RenewalState::Stopped);
    }

    async fn login_during_exchange(transport: MockTransport) -> (SessionManager<MockTransport>, RenewalOutcome) {
        let transport = transport.with_user("grace@example.com", "hopper", json!({ "id": 8 }));
        transport.set_refresh_delay(Duration::from_millis(100));
        let manager = manager_with_session(transport);

        let renewing = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.renew().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.login("grace@example.com", "hopper").await.unwrap();

        let outcome = renewing.await.unwrap();
        (manager, outcome)
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_during_exchange_keeps_new_tokens() {
        let transport = MockTransport::new();
        transport.respond_to_refresh("stale-a", Some("stale-r"));

        let (manager, outcome) = login_during_exchange(transport).await;

        assert_eq!(outcome, RenewalOutcome::Discarded);
        let stored = manager.store().load();
        assert_eq!(stored.user_id, Some(8));
        assert_eq!(token(&stored), Some("a1"));
        assert_eq!(refresh(&stored), Some("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_during_failed_exchange_stays_authenticated() {
        let transport = MockTransport::new();
        transport.fail_refresh(TransportError::Network("timeout".to_owned()));

        let (manager, outcome) = login_during_exchange(transport).await;

        assert_eq!(outcome, RenewalOutcome::Discarded);
        let stored = manager.store().load();
        assert_eq!(stored.user_id, Some(8));
        assert_eq!(token(&stored), Some("a1"));
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_concurrent_renewals_are_serialized() {
        let transport = MockTransport::new();
        transport.set_refresh_delay(Duration::from_millis(20));
        let manager = manager_with_session(transport.clone());

        let (first, second) = tokio::join!(manager.renew(), manager.renew());

        assert_eq!(first, RenewalOutcome::Renewed { rotated: true });
        assert_eq!(second, RenewalOutcome::Renewed { rotated: true });
        // the second exchange used the token the first one rotated in
        assert_eq!(transport.seen_refresh_tokens(), vec!["r1", "r2"]);
        assert_eq!(token(&manager.session()), Some("a3"));
    }

    #[tokio::test]
    async fn test_auth_state_channel() {
        let transport = MockTransport::new().with_user("ada@example.com", "hunter2", json!({ "id": 7 }));
        let manager = SessionManager::new(config(), transport).unwrap();
        let mut rx = manager.subscribe();
        assert!(!*rx.borrow());

        manager.login("ada@example.com", "hunter2").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        manager.logout().await;
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_events_dispatched() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let transport = MockTransport::new().with_user("ada@example.com", "hunter2", json!({ "id": 7 }));
        let manager = SessionManager::builder(config(), transport)
            .listener(Recorder(Arc::clone(&seen)))
            .build()
            .unwrap();

        manager.login("ada@example.com", "hunter2").await.unwrap();
        manager.renew().await;
        manager.logout().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "session.auth_state.changed",
                "session.login.success",
                "session.token.renewed",
                "session.auth_state.changed",
                "session.logout",
                "session.cleared",
            ]
        );
    }

    #[tokio::test]
    async fn test_other_view_changes_picked_up_on_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new().with_user("ada@example.com", "hunter2", json!({ "id": 7 }));

        let first = SessionManager::builder(config(), transport.clone())
            .durable(FileStorage::new(dir.path()).unwrap())
            .build()
            .unwrap();
        let second = SessionManager::builder(config(), transport)
            .durable(FileStorage::new(dir.path()).unwrap())
            .build()
            .unwrap();

        first.login("ada@example.com", "hunter2").await.unwrap();
        assert!(!second.is_authenticated());

        let key = Some("userData".to_owned());
        assert!(second.handle_trigger(SyncTrigger::Storage { key }).await);
        assert!(second.is_authenticated());

        first.logout().await;
        assert!(second.is_authenticated());
        assert!(!second.handle_trigger(SyncTrigger::Focus).await);
        assert!(!second.is_authenticated());
    }

    #[tokio::test]
    async fn test_hidden_trigger_only_records_visibility() {
        let manager = manager_with_session(MockTransport::new());
        manager.store().clear();

        // no reload on hide: the cached flag is returned as is
        let before = *manager.subscribe().borrow();
        let flag = manager
            .handle_trigger(SyncTrigger::Visibility(PageVisibility::Hidden))
            .await;
        assert_eq!(flag, before);
        assert!(!manager.is_visible());

        assert!(!manager
            .handle_trigger(SyncTrigger::Visibility(PageVisibility::Visible))
            .await);
        assert!(manager.is_visible());
    }

    #[tokio::test]
    async fn test_watcher_consumes_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SessionStore::new(
            "userData",
            Arc::new(FileStorage::new(dir.path()).unwrap()),
            Arc::new(MemoryStorage::new()),
        );
        let manager = SessionManager::builder(config(), MockTransport::new())
            .durable(FileStorage::new(dir.path()).unwrap())
            .build()
            .unwrap();
        let mut auth = manager.subscribe();

        let (tx, rx) = mpsc::channel(8);
        let watcher = manager.watch(rx);
        assert!(watcher.is_running());

        writer.save(&admin_session());
        tx.send(SyncTrigger::Storage { key: None }).await.unwrap();
        auth.changed().await.unwrap();
        assert!(*auth.borrow_and_update());

        watcher.stop();
        writer.clear();
        assert!(manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_resumes_renewal() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        {
            let previous = SessionManager::builder(config(), transport.clone())
                .durable(FileStorage::new(dir.path()).unwrap())
                .build()
                .unwrap();
            previous.store().save(&admin_session());
        }

        let manager = SessionManager::builder(config(), transport.clone())
            .durable(FileStorage::new(dir.path()).unwrap())
            .build()
            .unwrap();
        assert!(manager.is_authenticated());
        assert_eq!(manager.renewal_state(), RenewalState::Stopped);

        assert!(manager.restore().await);
        assert_eq!(manager.renewal_state(), RenewalState::Running);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_manager_cancels_renewal() {
        let transport = MockTransport::new();
        let manager = manager_with_session(transport.clone());
        manager.start_renewal(RenewalOptions::every(Duration::from_secs(1)));
        drop(manager);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.refresh_calls(), 0);
    }
}
