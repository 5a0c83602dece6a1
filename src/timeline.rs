//! Timeline scheduling
//!
//! Each call to [`TimelineScheduler::refresh`] runs one cycle:
//! resolve a coordinate, start a best-effort reverse geocode, fetch the
//! forecast, fall back to the cached forecast on failure, and emit a single
//! [`TimelineEntry`] together with the time of the next refresh.
//!
//! No failure escapes a cycle. Missing or stale data is replaced by sentinel
//! entries according to the age of the cached forecast:
//!
//! | cache age        | emitted                                      |
//! |------------------|----------------------------------------------|
//! | none             | "entry missing" placeholder                  |
//! | up to 3h         | cached forecast unchanged                    |
//! | over 3h, to 6h   | cached days, current line "data outdated"    |
//! | over 6h          | "update failed" placeholder                  |

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CachedEntry, PersistedCache};
use crate::data::{
    Coordinate, CurrentConditions, ForecastEntry, ForecastSource, LocationSource,
    ReverseGeocoder, TemperatureUnit, DATA_OUTDATED, DEFAULT_COORDINATE, ENTRY_MISSING,
    UPDATE_FAILED,
};

/// Default spacing between refresh cycles
pub const DEFAULT_REFRESH_MINUTES: i64 = 30;

/// Longest accepted spacing between refresh cycles (one week)
pub const MAX_REFRESH_MINUTES: i64 = 7 * 24 * 60;

/// Cache age after which the current conditions are no longer shown
const OUTDATED_AFTER_HOURS: i64 = 3;

/// Cache age after which nothing from the cache is shown
const DISCARD_AFTER_HOURS: i64 = 6;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What the scheduler is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Resolving,
    Fetching,
    Emitting,
}

/// How the emitted forecast relates to the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Fetched during this cycle
    Live,
    /// Cached forecast shown unchanged
    Cached,
    /// Cached days with the current conditions replaced
    Outdated,
    /// Cache too old to show
    UpdateFailed,
    /// Nothing cached yet
    Missing,
}

/// A single snapshot handed to the display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    /// When the entry was emitted
    pub date: DateTime<Utc>,
    pub status: EntryStatus,
    /// Coordinate used for this cycle
    pub coordinate: Coordinate,
    /// Place label known at emission time
    pub place: Option<String>,
    pub forecast: ForecastEntry,
}

/// The entry plus when the host should ask for the next one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub entry: TimelineEntry,
    pub next_refresh: DateTime<Utc>,
}

/// Settings for the refresh pipeline
#[derive(Debug, Clone)]
pub struct TimelineConfig {
    pub unit: TemperatureUnit,
    pub api_key: String,
    /// User-chosen location; used instead of the device when set
    pub custom_location: Option<Coordinate>,
    pub refresh_interval: Duration,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            unit: TemperatureUnit::default(),
            api_key: String::new(),
            custom_location: None,
            refresh_interval: Duration::minutes(DEFAULT_REFRESH_MINUTES),
        }
    }
}

/// Applies the staleness policy to whatever is cached after a failed fetch
pub fn fallback_entry(cached: Option<CachedEntry>, now: DateTime<Utc>) -> (EntryStatus, ForecastEntry) {
    let Some(cached) = cached else {
        return (
            EntryStatus::Missing,
            ForecastEntry::placeholder(now, ENTRY_MISSING),
        );
    };

    let age = cached.age(now);
    if age > Duration::hours(DISCARD_AFTER_HOURS) {
        (
            EntryStatus::UpdateFailed,
            ForecastEntry::placeholder(now, UPDATE_FAILED),
        )
    } else if age > Duration::hours(OUTDATED_AFTER_HOURS) {
        let mut entry = cached.entry;
        entry.current = CurrentConditions::sentinel(DATA_OUTDATED);
        (EntryStatus::Outdated, entry)
    } else {
        (EntryStatus::Cached, cached.entry)
    }
}

/// Runs refresh cycles against injected services
pub struct TimelineScheduler {
    config: TimelineConfig,
    forecast: Arc<dyn ForecastSource>,
    geocoder: Arc<dyn ReverseGeocoder>,
    location: Option<Arc<LocationSource>>,
    cache: PersistedCache,
    clock: Arc<dyn Clock>,
    state: Mutex<SchedulerState>,
    cycle: tokio::sync::Mutex<()>,
    enrichment: Mutex<Option<JoinHandle<()>>>,
}

impl TimelineScheduler {
    pub fn new(
        config: TimelineConfig,
        forecast: Arc<dyn ForecastSource>,
        geocoder: Arc<dyn ReverseGeocoder>,
        cache: PersistedCache,
    ) -> Self {
        Self {
            config,
            forecast,
            geocoder,
            location: None,
            cache,
            clock: Arc::new(SystemClock),
            state: Mutex::new(SchedulerState::Idle),
            cycle: tokio::sync::Mutex::new(()),
            enrichment: Mutex::new(None),
        }
    }

    /// Uses a device location source when no custom location is configured
    pub fn with_location_source(mut self, location: Arc<LocationSource>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SchedulerState) {
        debug!(?state, "scheduler state");
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Runs one refresh cycle. Overlapping calls run one after another.
    pub async fn refresh(&self) -> Timeline {
        let _cycle = self.cycle.lock().await;

        self.set_state(SchedulerState::Resolving);
        let coordinate = self.resolve_coordinate().await;
        // Read before enrichment starts; its result belongs to the next cycle
        let place = self.cache.place();
        self.spawn_enrichment(coordinate);

        self.set_state(SchedulerState::Fetching);
        let result = self
            .forecast
            .fetch(coordinate, self.config.unit, &self.config.api_key)
            .await;
        let now = self.clock.now();

        let (status, forecast) = match result {
            Ok(mut forecast) => {
                forecast.timestamp = now;
                match self.cache.store_entry(&forecast, now) {
                    Ok(_) => debug!(cached_at = %now, "forecast cached"),
                    Err(e) => warn!(error = %e, "failed to cache forecast"),
                }
                (EntryStatus::Live, forecast)
            }
            Err(e) => {
                warn!(error = %e, "forecast fetch failed, using cache");
                fallback_entry(self.cache.last_entry(), now)
            }
        };

        self.set_state(SchedulerState::Emitting);
        let entry = TimelineEntry {
            date: now,
            status,
            coordinate,
            place,
            forecast,
        };
        let next_refresh = self.next_refresh_after(now);
        info!(
            status = ?entry.status,
            %coordinate,
            next_refresh = %next_refresh,
            "timeline entry emitted"
        );

        self.set_state(SchedulerState::Idle);
        Timeline {
            entry,
            next_refresh,
        }
    }

    /// Time of the next cycle, falling back to the default spacing on overflow
    fn next_refresh_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.config.refresh_interval)
            .or_else(|| {
                warn!("refresh interval overflows the calendar, using default");
                now.checked_add_signed(Duration::minutes(DEFAULT_REFRESH_MINUTES))
            })
            .unwrap_or(now)
    }

    /// Picks the coordinate for this cycle: custom, device, persisted, default
    async fn resolve_coordinate(&self) -> Coordinate {
        if let Some(custom) = self.config.custom_location {
            return match Coordinate::new(custom.latitude, custom.longitude) {
                Ok(coordinate) => coordinate,
                Err(e) => {
                    warn!(error = %e, "custom location out of range, using default");
                    DEFAULT_COORDINATE
                }
            };
        }

        if let Some(source) = &self.location {
            match source.request_once().await {
                Ok(coordinate) => {
                    if let Err(e) = self.cache.set_coordinate(coordinate) {
                        warn!(error = %e, "failed to persist coordinate");
                    }
                    return coordinate;
                }
                Err(e) => warn!(error = %e, "location request failed"),
            }
        }

        self.cache.coordinate().unwrap_or_else(|| {
            debug!("no persisted coordinate, using default");
            DEFAULT_COORDINATE
        })
    }

    /// Starts a reverse geocode whose result is only seen by later cycles
    fn spawn_enrichment(&self, coordinate: Coordinate) {
        let geocoder = self.geocoder.clone();
        let cache = self.cache.clone();
        let handle = tokio::spawn(async move {
            match geocoder.resolve(coordinate).await {
                Ok(place) => {
                    debug!(%place, "place resolved");
                    if let Err(e) = cache.set_place(&place) {
                        warn!(error = %e, "failed to persist place");
                    }
                }
                // Keep whatever place was stored before
                Err(e) => debug!(error = %e, "reverse geocode skipped"),
            }
        });

        let previous = self
            .enrichment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            if !previous.is_finished() {
                debug!("previous reverse geocode still running");
            }
        }
    }

    /// Waits for the most recent reverse geocode, if any, to finish
    pub async fn wait_for_enrichment(&self) {
        let handle = self
            .enrichment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "reverse geocode task failed");
            }
        }
    }
}
