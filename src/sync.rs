//! Keeping a view's auth flag in line with the shared session.
//!
//! Storage offers no notification for writes made by another view, so
//! re-reads are driven by triggers the host forwards: storage events, focus
//! and visibility changes. Each trigger re-derives "is authenticated" from
//! the persisted session and publishes it on the manager's watch channel.

use tokio::task::JoinHandle;

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageVisibility {
    Visible,
    Hidden,
}

/// An external event that may mean the session changed elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Another view wrote storage. `key` is `None` when the whole storage
    /// was cleared.
    Storage { key: Option<String> },
    /// The window regained focus.
    Focus,
    Visibility(PageVisibility),
}

impl SyncTrigger {
    /// Whether this trigger calls for re-reading the store.
    ///
    /// Hiding only records the state, and storage events for other keys are
    /// ignored.
    pub fn needs_reload(&self, storage_key: &str) -> bool {
        match self {
            SyncTrigger::Storage { key: Some(key) } => key == storage_key,
            SyncTrigger::Storage { key: None } | SyncTrigger::Focus => true,
            SyncTrigger::Visibility(visibility) => *visibility == PageVisibility::Visible,
        }
    }
}

/// A running trigger listener.
///
/// Created by [`SessionManager::watch`](crate::SessionManager::watch).
/// Dropping it deregisters the listener.
pub struct AuthWatcher {
    handle: JoinHandle<()>,
}

impl AuthWatcher {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// True until the trigger channel closes or the watcher is stopped.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for AuthWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
