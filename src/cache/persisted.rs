use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use super::{KeyValueStore, StoreError};
use crate::data::{Coordinate, ForecastEntry};

const LATITUDE_KEY: &str = "latitude";
const LONGITUDE_KEY: &str = "longitude";
const PLACE_KEY: &str = "location";
const LAST_ENTRY_KEY: &str = "last_entry";

/// The last successfully fetched forecast and when it was stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    /// The cached forecast
    pub entry: ForecastEntry,
    /// When the forecast was cached
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    /// How old the entry is at `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.cached_at
    }
}

/// Typed access to the values that survive between refresh cycles
#[derive(Clone)]
pub struct PersistedCache {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for PersistedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedCache").finish_non_exhaustive()
    }
}

impl PersistedCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Reads and decodes a value, treating unreadable data as absent
    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "failed to read persisted value");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "ignoring undecodable persisted value");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value)?;
        self.store.set(key, &json)
    }

    /// Last persisted coordinate, if both halves are present and in range
    pub fn coordinate(&self) -> Option<Coordinate> {
        let latitude: f64 = self.read(LATITUDE_KEY)?;
        let longitude: f64 = self.read(LONGITUDE_KEY)?;
        Coordinate::new(latitude, longitude).ok()
    }

    /// Stores both halves; if the longitude write fails the previous
    /// latitude is put back so a mismatched pair is never read
    pub fn set_coordinate(&self, coordinate: Coordinate) -> Result<(), StoreError> {
        let previous = self.store.get(LATITUDE_KEY)?;
        self.write(LATITUDE_KEY, &coordinate.latitude)?;

        if let Err(e) = self.write(LONGITUDE_KEY, &coordinate.longitude) {
            let restored = match previous {
                Some(raw) => self.store.set(LATITUDE_KEY, &raw),
                None => self.store.remove(LATITUDE_KEY),
            };
            if let Err(restore) = restored {
                warn!(error = %restore, "persisted coordinate left half-written");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Last reverse-geocoded place label
    pub fn place(&self) -> Option<String> {
        self.read(PLACE_KEY)
    }

    pub fn set_place(&self, place: &str) -> Result<(), StoreError> {
        self.write(PLACE_KEY, place)
    }

    /// The last successful forecast, if one was ever stored
    pub fn last_entry(&self) -> Option<CachedEntry> {
        self.read(LAST_ENTRY_KEY)
    }

    /// Replaces the cached forecast
    pub fn store_entry(
        &self,
        entry: &ForecastEntry,
        cached_at: DateTime<Utc>,
    ) -> Result<CachedEntry, StoreError> {
        let cached = CachedEntry {
            entry: entry.clone(),
            cached_at,
        };
        self.write(LAST_ENTRY_KEY, &cached)?;
        Ok(cached)
    }
}
