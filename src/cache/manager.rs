//! File-backed key-value store
//!
//! Stores each key as `<key>.json` in a cache directory, creating the
//! directory on first write.

use directories::ProjectDirs;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{KeyValueStore, StoreError};

/// Stores values as JSON files on disk
///
/// Uses `~/.cache/lockweather/` on Linux, or the equivalent XDG path on
/// other platforms.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where value files are stored
    cache_dir: PathBuf,
}

impl FileStore {
    /// Creates a new FileStore using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "lockweather")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self { cache_dir })
    }

    /// Creates a new FileStore with a custom directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to the file for the given key
    fn value_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.value_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_dir()?;

        // Unique temp file per write, renamed over the value file
        let mut tmp = NamedTempFile::new_in(&self.cache_dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(self.value_path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.value_path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_set_creates_file_in_cache_directory() {
        let (store, temp_dir) = create_test_store();

        store.set("latitude", "49.28").expect("Write should succeed");

        let expected_path = temp_dir.path().join("latitude.json");
        assert!(expected_path.exists(), "Value file should exist");
        assert_eq!(fs::read_to_string(&expected_path).unwrap(), "49.28");
        let leftovers = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "No temp files should remain");
    }

    #[test]
    fn test_concurrent_writes_to_same_key_all_succeed() {
        let (store, temp_dir) = create_test_store();
        let store = std::sync::Arc::new(store);

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for round in 0..20 {
                        store.set("location", &format!("\"writer {} round {}\"", i, round))?;
                    }
                    Ok::<_, StoreError>(())
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap().expect("Every write should succeed");
        }

        let value = store.get("location").unwrap().unwrap();
        assert!(value.starts_with("\"writer "));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_remove_deletes_value_and_ignores_missing() {
        let (store, _temp_dir) = create_test_store();
        store.set("latitude", "49.28").unwrap();

        store.remove("latitude").expect("Remove should succeed");
        store.remove("latitude").expect("Removing twice should succeed");

        assert!(store.get("latitude").unwrap().is_none());
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();

        let result = store.get("nonexistent_key").expect("Read should succeed");

        assert!(result.is_none(), "Should return None for missing key");
    }

    #[test]
    fn test_set_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache").join("dir");
        let store = FileStore::with_dir(nested_path.clone());

        store.set("nested_key", "{}").expect("Write should succeed");

        assert!(nested_path.exists(), "Nested directory should be created");
        assert!(nested_path.join("nested_key.json").exists(), "Value file should exist");
    }

    #[test]
    fn test_overwrite_existing_value() {
        let (store, _temp_dir) = create_test_store();

        store.set("location", "\"first\"").expect("First write should succeed");
        store.set("location", "\"second\"").expect("Second write should succeed");

        assert_eq!(store.get("location").unwrap().as_deref(), Some("\"second\""));
    }

    #[test]
    fn test_values_survive_new_store_instance() {
        let (store, temp_dir) = create_test_store();
        store.set("longitude", "-74").unwrap();

        let reopened = FileStore::with_dir(temp_dir.path().to_path_buf());

        assert_eq!(reopened.get("longitude").unwrap().as_deref(), Some("-74"));
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileStore::new() {
            let path_str = store.dir().to_string_lossy();
            assert!(
                path_str.contains("lockweather"),
                "Cache path should contain project name"
            );
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }
}
