//! Core data models for the weather timeline
//!
//! This module contains the types shared by the location, geocoding and
//! forecast clients and by the timeline scheduler.

pub mod forecast;
pub mod geocode;
pub mod location;

pub use forecast::{ForecastError, ForecastSource, OpenWeatherClient};
pub use geocode::{format_place, GeocodeError, NominatimGeocoder, Placemark, ReverseGeocoder};
pub use location::{Authorization, IpLocationBackend, LocationBackend, LocationError, LocationSource};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of daily records shown by the widget
pub const DAILY_RECORDS: usize = 4;

/// Coordinate used when neither configuration, device nor cache provides one
pub const DEFAULT_COORDINATE: Coordinate = Coordinate {
    latitude: 40.5,
    longitude: -74.0,
};

/// Place label shown before any reverse geocode has succeeded
pub const DEFAULT_PLACE: &str = "Manhattan, New York, US";

/// Icon code used by placeholder records
pub const UNKNOWN_ICON: &str = "unknown";

/// Sentinel current-conditions text when no cached entry exists
pub const ENTRY_MISSING: &str = "entry missing";

/// Sentinel current-conditions text when the cache is too old to show
pub const UPDATE_FAILED: &str = "update failed";

/// Sentinel current-conditions text when only the daily data is still usable
pub const DATA_OUTDATED: &str = "data outdated";

/// Errors raised when constructing a coordinate
#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("Latitude {0} is outside [-90, 90]")]
    Latitude(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    Longitude(f64),
}

/// A point on the globe in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate, rejecting values outside the valid ranges (and NaN)
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Whether both components are within range
    pub fn is_valid(&self) -> bool {
        Self::new(self.latitude, self.longitude).is_ok()
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}, {:.2}", self.latitude, self.longitude)
    }
}

/// Temperature unit requested from the forecast API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    /// Fahrenheit
    #[default]
    Imperial,
    /// Celsius
    Metric,
    /// Kelvin
    Standard,
}

impl TemperatureUnit {
    /// Value of the `units` query parameter
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Imperial => "imperial",
            Self::Metric => "metric",
            Self::Standard => "standard",
        }
    }
}

/// Temperatures for the four parts of a day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PeriodTemperatures {
    pub morning: f64,
    pub day: f64,
    pub evening: f64,
    pub night: f64,
}

impl PeriodTemperatures {
    pub fn as_array(&self) -> [f64; 4] {
        [self.morning, self.day, self.evening, self.night]
    }
}

/// One day of forecast data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    /// Start of the forecast day
    pub date: DateTime<Utc>,
    pub periods: PeriodTemperatures,
    pub min: f64,
    pub max: f64,
    /// Provider icon code, e.g. "10d"
    pub icon: String,
    /// Probability of precipitation in [0, 1]
    pub precipitation: f64,
}

impl DailyForecast {
    /// Zeroed record used to fill placeholder entries
    pub fn placeholder() -> Self {
        Self {
            date: DateTime::<Utc>::UNIX_EPOCH,
            periods: PeriodTemperatures::default(),
            min: 0.0,
            max: 0.0,
            icon: UNKNOWN_ICON.to_string(),
            precipitation: 0.0,
        }
    }

    /// Three-letter weekday in the given UTC offset, e.g. "MON"
    pub fn weekday(&self, offset: FixedOffset) -> String {
        self.date
            .with_timezone(&offset)
            .format("%a")
            .to_string()
            .to_uppercase()
    }

    /// Display symbol for this day's icon
    pub fn symbol(&self) -> &'static str {
        icon_symbol(&self.icon)
    }
}

/// Current conditions at the time of the fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub description: String,
}

impl CurrentConditions {
    /// Conditions carrying a sentinel description instead of a live reading
    pub fn sentinel(description: &str) -> Self {
        Self {
            temperature: 0.0,
            description: description.to_string(),
        }
    }
}

/// Everything the widget needs from one forecast fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    /// When the forecast was fetched
    pub timestamp: DateTime<Utc>,
    /// IANA timezone name reported by the provider
    pub timezone: String,
    /// Offset of the forecast location from UTC, in seconds
    #[serde(default)]
    pub timezone_offset: i32,
    pub daily: Vec<DailyForecast>,
    pub current: CurrentConditions,
}

impl ForecastEntry {
    /// Entry with four zeroed days and a sentinel current line
    pub fn placeholder(timestamp: DateTime<Utc>, sentinel: &str) -> Self {
        Self {
            timestamp,
            timezone: String::new(),
            timezone_offset: 0,
            daily: vec![DailyForecast::placeholder(); DAILY_RECORDS],
            current: CurrentConditions::sentinel(sentinel),
        }
    }

    /// Lowest and highest period temperature across all days
    pub fn temperature_span(&self) -> Option<(f64, f64)> {
        self.daily
            .iter()
            .flat_map(|d| d.periods.as_array())
            .fold(None, |acc, t| match acc {
                None => Some((t, t)),
                Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            })
    }

    /// UTC offset of the forecast location, falling back to UTC if out of range
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.timezone_offset).unwrap_or_else(|| Utc.fix())
    }
}

/// Maps a provider icon code to a display symbol name
pub fn icon_symbol(code: &str) -> &'static str {
    match code {
        "01d" => "sun.max",
        "01n" => "moon",
        "02d" => "cloud.sun",
        "02n" => "cloud.moon",
        "03d" | "04d" => "cloud",
        "03n" | "04n" => "cloud.fill",
        "09d" => "cloud.rain",
        "09n" => "cloud.rain.fill",
        "10d" => "cloud.sun.rain",
        "10n" => "cloud.moon.rain",
        "11d" => "cloud.bolt",
        "11n" => "cloud.bolt.fill",
        "13d" | "13n" => "snowflake",
        "50d" => "cloud.fog",
        "50n" => "cloud.fog.fill",
        _ => "questionmark.circle",
    }
}
