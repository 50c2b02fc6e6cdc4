//! In-memory, view-scoped storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::storage::SessionStorage;
use crate::SessionError;

/// Storage scoped to a single view.
///
/// Stores values in a `HashMap` protected by a `RwLock`. Clones share the
/// same map.
///
/// # Note
///
/// Values are lost when the process exits. Pair it with a
/// [`FileStorage`](super::FileStorage) for a session that survives restarts.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let values = self
            .values
            .read()
            .map_err(|_| SessionError::Storage("Lock poisoned".to_owned()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.values
            .write()
            .map_err(|_| SessionError::Storage("Lock poisoned".to_owned()))?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.values
            .write()
            .map_err(|_| SessionError::Storage("Lock poisoned".to_owned()))?
            .remove(key);
        Ok(())
    }
}
