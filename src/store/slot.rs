//! Named key-value slots backing the record store.

use super::StoreError;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;

/// A durable string slot addressed by name.
pub trait KeyValueSlot {
    /// Returns `Ok(None)` when nothing has been stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value stored under `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Copy the value under `from` to `to`. Returns `false` when `from` is empty.
    fn copy(&mut self, from: &str, to: &str) -> Result<bool, StoreError> {
        match self.get(from)? {
            Some(value) => {
                self.set(to, &value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Slots stored as `<key>.json` files in a data directory.
#[derive(Debug, Clone)]
pub struct FileSlots {
    dir: PathBuf,
}

impl FileSlots {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueSlot for FileSlots {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);

        if !path.exists() {
            debug!("No stored value at {}", path.display());
            return Ok(None);
        }

        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| StoreError::Io { path, source })
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;

        // Readers never observe a half-written file.
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(value.as_bytes()).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}

/// In-process slots, used by tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemorySlots {
    values: std::collections::HashMap<String, String>,
    /// When set, every write fails.
    pub read_only: bool,
}

#[cfg(test)]
impl MemorySlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let mut slots = Self::new();
        slots.values.insert(key.to_string(), value.to_string());
        slots
    }
}

#[cfg(test)]
impl KeyValueSlot for MemorySlots {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::Io {
                path: PathBuf::from(key),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_slots_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut slots = FileSlots::new(dir.path().join("data"));

        assert!(slots.get("responses").unwrap().is_none());

        slots.set("responses", "[1,2]").unwrap();
        assert_eq!(slots.get("responses").unwrap().as_deref(), Some("[1,2]"));

        slots.set("responses", "[]").unwrap();
        assert_eq!(slots.get("responses").unwrap().as_deref(), Some("[]"));
        assert!(slots.path_for("responses").ends_with("responses.json"));
    }

    #[test]
    fn test_copy_leaves_source_untouched() {
        let dir = TempDir::new().unwrap();
        let mut slots = FileSlots::new(dir.path());

        assert!(!slots.copy("missing", "missing.bak").unwrap());
        assert!(!slots.path_for("missing.bak").exists());

        slots.set("responses", "{broken").unwrap();
        assert!(slots.copy("responses", "responses.bak").unwrap());
        assert_eq!(slots.get("responses.bak").unwrap().as_deref(), Some("{broken"));
        assert_eq!(slots.get("responses").unwrap().as_deref(), Some("{broken"));
    }

    #[test]
    fn test_memory_slots_read_only() {
        let mut slots = MemorySlots::with_value("k", "v");
        slots.read_only = true;
        assert!(slots.set("k", "w").is_err());
        assert_eq!(slots.get("k").unwrap().as_deref(), Some("v"));
    }
}
