//! Persistent key-value storage for the timeline
//!
//! The scheduler only talks to [`PersistedCache`], which stores typed values
//! (last coordinate, place label, last successful forecast) on top of any
//! [`KeyValueStore`]. [`FileStore`] keeps one JSON file per key in an
//! XDG-compliant cache directory; [`MemoryStore`] is process-local.

mod manager;
mod memory;
mod persisted;

pub use manager::FileStore;
pub use memory::MemoryStore;
pub use persisted::{CachedEntry, PersistedCache};

use thiserror::Error;

/// Errors raised by a key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize stored value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A string-keyed store of serialized values.
///
/// Last writer wins; no transactional guarantees.
pub trait KeyValueStore: Send + Sync {
    /// Returns the raw value for `key`, or `None` if it was never written
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replaces the raw value for `key`
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deletes `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
