//! Durable file-backed storage.
//!
//! Stores each key as a JSON document in a directory.

use std::path::PathBuf;

use super::storage::SessionStorage;
use crate::SessionError;

/// File-based storage.
///
/// Each key is stored as a file named `{key}.json` in the configured
/// directory. Several managers pointed at the same directory share one
/// durable session, the way browser tabs share `localStorage`.
///
/// # Example
///
/// ```rust,ignore
/// use tether::FileStorage;
///
/// let durable = FileStorage::new("/var/lib/portal/session")?;
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    /// Creates the storage, creating the directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = directory.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            SessionError::Storage(format!("Failed to create storage directory: {e}"))
        })?;
        Ok(Self { directory: dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, SessionError> {
        // keys become file names; reject anything that could escape the directory
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SessionError::Storage(format!("Invalid storage key: {key:?}")));
        }
        Ok(self.directory.join(format!("{key}.json")))
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| SessionError::Storage(format!("Failed to read {}: {e}", path.display())))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let path = self.path_for(key)?;
        // write-then-rename so a concurrent reader never sees a half-written file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .map_err(|e| SessionError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            SessionError::Storage(format!("Failed to replace {}: {e}", path.display()))
        })
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let path = self.path_for(key)?;
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| {
                SessionError::Storage(format!("Failed to delete {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        storage.set("userData", "{\"user_id\":7}").unwrap();
        assert_eq!(
            storage.get("userData").unwrap().as_deref(),
            Some("{\"user_id\":7}")
        );
        assert!(dir.path().join("userData.json").exists());
    }

    #[test]
    fn test_get_missing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(storage.get("userData").unwrap().is_none());
    }

    #[test]
    fn test_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        storage.set("userData", "first").unwrap();
        storage.set("userData", "second").unwrap();
        assert_eq!(storage.get("userData").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        storage.set("userData", "{}").unwrap();
        storage.remove("userData").unwrap();
        assert!(storage.get("userData").unwrap().is_none());
        storage.remove("userData").unwrap();
    }

    #[test]
    fn test_path_traversal_prevention() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        assert!(storage.get("../etc/passwd").is_err());
        assert!(storage.set("nested/key", "x").is_err());
        assert!(storage.remove("").is_err());
    }

    #[test]
    fn test_two_handles_share_directory() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileStorage::new(dir.path()).unwrap();
        let second = FileStorage::new(dir.path()).unwrap();

        first.set("userData", "shared").unwrap();
        assert_eq!(second.get("userData").unwrap().as_deref(), Some("shared"));
    }
}
