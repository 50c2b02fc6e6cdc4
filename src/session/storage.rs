//! Key/value storage trait.

use crate::SessionError;

/// A string key/value store the session is persisted into.
///
/// Implementations provide different lifetimes:
/// - [`MemoryStorage`](super::MemoryStorage): scoped to one process/view
/// - [`FileStorage`](super::FileStorage): durable across restarts, shared by
///   every view pointed at the same directory
///
/// Methods are synchronous so a session write completes in full before the
/// next request reads the token.
pub trait SessionStorage: Send + Sync {
    /// Reads the raw value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}
