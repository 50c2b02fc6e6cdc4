//! The session store: one authoritative copy plus its mirrors.
//!
//! Every write goes through [`SessionStore::persist`], which updates the
//! in-memory cache, the durable storage, the view-scoped mirror and the
//! cookie channel in one step. Reads never fail: corrupt data yields an empty
//! session and an unreachable storage falls back to the cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use super::cookie::CookieChannel;
use super::memory_store::MemoryStorage;
use super::storage::SessionStorage;
use super::Session;
use crate::SessionError;
use crate::config::DEFAULT_STORAGE_KEY;

pub struct SessionStore {
    key: String,
    durable: Arc<dyn SessionStorage>,
    mirror: Arc<dyn SessionStorage>,
    cookies: Option<CookieChannel>,
    cache: RwLock<Session>,
    epoch: AtomicU64,
}

impl SessionStore {
    /// Creates a store over a durable storage and a view-scoped mirror.
    ///
    /// The cache starts empty; call [`load`](Self::load) to pick up a
    /// previously persisted session.
    pub fn new(
        key: impl Into<String>,
        durable: Arc<dyn SessionStorage>,
        mirror: Arc<dyn SessionStorage>,
    ) -> Self {
        Self {
            key: key.into(),
            durable,
            mirror,
            cookies: None,
            cache: RwLock::new(Session::default()),
            epoch: AtomicU64::new(0),
        }
    }

    /// A store whose both copies live in memory.
    pub fn in_memory() -> Self {
        Self::new(
            DEFAULT_STORAGE_KEY,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
        )
    }

    /// Mirrors tokens into cookies on every write.
    #[must_use]
    pub fn with_cookies(mut self, cookies: CookieChannel) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Re-reads the persisted session and refreshes the cache.
    ///
    /// The durable copy is authoritative; the mirror is only consulted when
    /// the durable storage cannot be read. After a successful durable read
    /// the mirror is brought back in line with it.
    pub fn load(&self) -> Session {
        let mut cache = self.cache_write();

        let raw = match self.durable.get(&self.key) {
            Ok(raw) => {
                self.resync_mirror(raw.as_deref());
                raw
            }
            Err(e) => {
                log::warn!(
                    target: "tether::store",
                    "msg=\"durable storage unavailable, reading mirror\" error=\"{e}\""
                );
                match self.mirror.get(&self.key) {
                    Ok(raw) => raw,
                    Err(e) => {
                        log::warn!(
                            target: "tether::store",
                            "msg=\"storage unavailable, using in-memory session\" error=\"{e}\""
                        );
                        return cache.clone();
                    }
                }
            }
        };

        let session = raw.as_deref().map(parse_session).unwrap_or_default();
        *cache = session.clone();
        session
    }

    /// Replaces the stored session.
    pub fn save(&self, session: &Session) {
        let mut cache = self.cache_write();
        *cache = session.clone();
        self.persist(&cache);
    }

    /// Starts a new session: replaces the stored one and bumps the epoch, so
    /// results of exchanges begun for the previous session are refused.
    pub fn replace(&self, session: &Session) {
        let mut cache = self.cache_write();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *cache = session.clone();
        self.persist(&cache);
    }

    /// Removes the session from every copy and bumps the epoch.
    pub fn clear(&self) {
        let mut cache = self.cache_write();
        *cache = Session::default();
        self.epoch.fetch_add(1, Ordering::SeqCst);

        for (name, storage) in self.storages() {
            if let Err(e) = storage.remove(&self.key) {
                log::warn!(
                    target: "tether::store",
                    "msg=\"failed to clear session\" storage=\"{name}\" error=\"{e}\""
                );
            }
        }
        if let Some(cookies) = &self.cookies {
            cookies.expire_all();
        }
    }

    /// The cached session, as last loaded or written by this process.
    pub fn current(&self) -> Session {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Incremented on every [`clear`](Self::clear) and [`replace`](Self::replace).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Applies `f` to the cached session and persists the result, unless the
    /// store was cleared since `epoch` was observed.
    ///
    /// Returns the written session, or `None` when the write was refused.
    pub fn update_if<F>(&self, epoch: u64, f: F) -> Option<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut cache = self.cache_write();
        if self.epoch() != epoch {
            return None;
        }
        f(&mut cache);
        self.persist(&cache);
        Some(cache.clone())
    }

    /// Writes `session` to both storages and the cookie channel.
    fn persist(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(raw) => {
                for (name, storage) in self.storages() {
                    if let Err(e) = storage.set(&self.key, &raw) {
                        log::warn!(
                            target: "tether::store",
                            "msg=\"failed to persist session\" storage=\"{name}\" error=\"{e}\""
                        );
                    }
                }
            }
            Err(e) => {
                log::error!(
                    target: "tether::store",
                    "msg=\"failed to serialize session\" error=\"{}\"",
                    SessionError::Serialization(e.to_string())
                );
            }
        }

        if let Some(cookies) = &self.cookies {
            match session.access_token() {
                Some(token) => cookies.set_access_token(token),
                None => cookies.expire_access_token(),
            }
            if let Some(token) = session.refresh_token() {
                cookies.set_refresh_token(token);
            }
        }
    }

    fn resync_mirror(&self, raw: Option<&str>) {
        let result = match raw {
            Some(raw) => match self.mirror.get(&self.key) {
                Ok(Some(existing)) if existing == raw => Ok(()),
                _ => self.mirror.set(&self.key, raw),
            },
            None => self.mirror.remove(&self.key),
        };
        if let Err(e) = result {
            log::debug!(
                target: "tether::store",
                "msg=\"mirror resync failed\" error=\"{e}\""
            );
        }
    }

    fn storages(&self) -> [(&'static str, &Arc<dyn SessionStorage>); 2] {
        [("durable", &self.durable), ("mirror", &self.mirror)]
    }

    fn cache_write(&self) -> RwLockWriteGuard<'_, Session> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_session(raw: &str) -> Session {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        log::warn!(
            target: "tether::store",
            "msg=\"malformed persisted session, treating as signed out\" error=\"{e}\""
        );
        Session::default()
    })
}
