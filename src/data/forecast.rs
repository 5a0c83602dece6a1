//! OpenWeatherMap forecast client
//!
//! Issues a single One Call request for current conditions plus the daily
//! forecast and maps the response into a [`ForecastEntry`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{
    Coordinate, CurrentConditions, DailyForecast, ForecastEntry, PeriodTemperatures,
    TemperatureUnit, DAILY_RECORDS, UNKNOWN_ICON,
};

/// Base URL for the OpenWeatherMap API
const OPEN_WEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Blocks of the One Call response the widget never shows
const EXCLUDED_BLOCKS: &str = "minutely,hourly,alerts";

/// Request timeout applied by the HTTP client
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur when fetching forecast data
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The request could not be built or was rejected (bad URL or API key)
    #[error("Invalid forecast request: {0}")]
    InvalidRequest(String),

    /// Transport failure, timeout or server-side error
    #[error("Forecast request failed: {0}")]
    Network(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode forecast response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ForecastError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Anything that can produce a forecast for a coordinate
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Fetches current conditions and up to four daily records
    async fn fetch(
        &self,
        coordinate: Coordinate,
        unit: TemperatureUnit,
        api_key: &str,
    ) -> Result<ForecastEntry, ForecastError>;
}

/// Client for the OpenWeatherMap One Call endpoint
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
}

impl Default for OpenWeatherClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenWeatherClient {
    /// Create a new OpenWeatherClient with default settings
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self::with_client(client)
    }

    /// Create a new OpenWeatherClient with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: OPEN_WEATHER_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (mock servers, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builds the One Call URL for a coordinate
    fn request_url(
        &self,
        coordinate: Coordinate,
        unit: TemperatureUnit,
        api_key: &str,
    ) -> Result<Url, ForecastError> {
        if api_key.trim().is_empty() {
            return Err(ForecastError::InvalidRequest("missing API key".to_string()));
        }

        let endpoint = format!("{}/onecall", self.base_url.trim_end_matches('/'));
        Url::parse_with_params(
            &endpoint,
            &[
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
                ("exclude", EXCLUDED_BLOCKS.to_string()),
                ("units", unit.as_query().to_string()),
                ("appid", api_key.to_string()),
            ],
        )
        .map_err(|e| ForecastError::InvalidRequest(format!("{}: {}", endpoint, e)))
    }

    /// Parse the One Call response into a ForecastEntry
    fn parse_response(&self, response: OneCallResponse) -> ForecastEntry {
        let daily = response
            .daily
            .into_iter()
            .take(DAILY_RECORDS)
            .map(parse_daily)
            .collect();

        let description = response
            .current
            .weather
            .into_iter()
            .next()
            .map(|w| w.description)
            .unwrap_or_else(|| "unknown".to_string());

        ForecastEntry {
            timestamp: Utc::now(),
            timezone: response.timezone,
            timezone_offset: response.timezone_offset,
            daily,
            current: CurrentConditions {
                temperature: response.current.temp,
                description,
            },
        }
    }
}

#[async_trait]
impl ForecastSource for OpenWeatherClient {
    async fn fetch(
        &self,
        coordinate: Coordinate,
        unit: TemperatureUnit,
        api_key: &str,
    ) -> Result<ForecastEntry, ForecastError> {
        let url = self.request_url(coordinate, unit, api_key)?;
        debug!(%coordinate, units = unit.as_query(), "requesting forecast");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let text = response.text().await?;
        let api_response: OneCallResponse = serde_json::from_str(&text)?;

        Ok(self.parse_response(api_response))
    }
}

/// Classifies a non-success HTTP status
fn status_error(status: StatusCode) -> ForecastError {
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND => ForecastError::InvalidRequest(format!("server returned {}", status)),
        _ => ForecastError::Network(format!("server returned {}", status)),
    }
}

fn parse_daily(daily: DailyWire) -> DailyForecast {
    let icon = daily
        .weather
        .into_iter()
        .next()
        .map(|w| w.icon)
        .filter(|icon| !icon.is_empty())
        .unwrap_or_else(|| UNKNOWN_ICON.to_string());

    DailyForecast {
        date: DateTime::from_timestamp(daily.dt, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        periods: PeriodTemperatures {
            morning: daily.temp.morn,
            day: daily.temp.day,
            evening: daily.temp.eve,
            night: daily.temp.night,
        },
        min: daily.temp.min,
        max: daily.temp.max,
        icon,
        precipitation: daily.pop.clamp(0.0, 1.0),
    }
}

/// One Call API response structure
#[derive(Debug, Deserialize)]
struct OneCallResponse {
    timezone: String,
    #[serde(default)]
    timezone_offset: i32,
    daily: Vec<DailyWire>,
    current: CurrentWire,
}

/// A single day from the `daily` array
#[derive(Debug, Deserialize)]
struct DailyWire {
    dt: i64,
    temp: TemperatureWire,
    #[serde(default)]
    weather: Vec<IconWire>,
    #[serde(default)]
    pop: f64,
}

#[derive(Debug, Deserialize)]
struct TemperatureWire {
    morn: f64,
    day: f64,
    eve: f64,
    night: f64,
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct IconWire {
    icon: String,
}

/// The `current` block
#[derive(Debug, Deserialize)]
struct CurrentWire {
    temp: f64,
    #[serde(default)]
    weather: Vec<DescriptionWire>,
}

#[derive(Debug, Deserialize)]
struct DescriptionWire {
    description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sample One Call response trimmed to the fields we read, plus noise
    const VALID_RESPONSE: &str = r#"{
        "lat": 40.5,
        "lon": -74.0,
        "timezone": "America/New_York",
        "timezone_offset": -14400,
        "current": {
            "dt": 1719680400,
            "temp": 72.4,
            "humidity": 60,
            "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}]
        },
        "daily": [
            {"dt": 1719676800, "temp": {"morn": 12, "day": 28, "eve": 22, "night": 17, "min": 11, "max": 29}, "weather": [{"icon": "09d"}], "pop": 0.6},
            {"dt": 1719763200, "temp": {"morn": 10, "day": 30, "eve": 20, "night": 15, "min": 9, "max": 31}, "weather": [{"icon": "10d"}], "pop": 0.4},
            {"dt": 1719849600, "temp": {"morn": 12, "day": 22, "eve": 24, "night": 21, "min": 12, "max": 25}, "weather": [{"icon": "01d"}], "pop": 0.0},
            {"dt": 1719936000, "temp": {"morn": 21, "day": 28, "eve": 18, "night": 9, "min": 8, "max": 28}, "weather": [{"icon": "03d"}], "pop": 0.2},
            {"dt": 1720022400, "temp": {"morn": 20, "day": 27, "eve": 19, "night": 12, "min": 11, "max": 27}, "weather": [{"icon": "04d"}], "pop": 0.1}
        ]
    }"#;

    fn coordinate() -> Coordinate {
        Coordinate::new(40.5, -74.0).unwrap()
    }

    #[test]
    fn test_parse_valid_response_truncates_to_four_days() {
        let response: OneCallResponse =
            serde_json::from_str(VALID_RESPONSE).expect("Failed to parse valid response");

        let entry = OpenWeatherClient::new().parse_response(response);

        assert_eq!(entry.daily.len(), DAILY_RECORDS);
        assert_eq!(entry.timezone, "America/New_York");
        assert_eq!(entry.timezone_offset, -14400);
        assert!((entry.current.temperature - 72.4).abs() < 0.01);
        assert_eq!(entry.current.description, "clear sky");

        let first = &entry.daily[0];
        assert_eq!(first.date.timestamp(), 1719676800);
        assert!((first.periods.morning - 12.0).abs() < 0.01);
        assert!((first.periods.night - 17.0).abs() < 0.01);
        assert!((first.max - 29.0).abs() < 0.01);
        assert_eq!(first.icon, "09d");
        assert!((first.precipitation - 0.6).abs() < 0.001);
    }

    #[test]
    fn test_parse_short_daily_array_is_kept() {
        let short = r#"{
            "timezone": "UTC",
            "current": {"temp": 1.0, "weather": []},
            "daily": [
                {"dt": 0, "temp": {"morn": 1, "day": 2, "eve": 3, "night": 4, "min": 1, "max": 4}, "weather": [], "pop": 1.7}
            ]
        }"#;
        let response: OneCallResponse = serde_json::from_str(short).expect("Failed to parse");

        let entry = OpenWeatherClient::new().parse_response(response);

        assert_eq!(entry.daily.len(), 1);
        assert_eq!(entry.daily[0].icon, UNKNOWN_ICON);
        assert!((entry.daily[0].precipitation - 1.0).abs() < f64::EPSILON);
        assert_eq!(entry.current.description, "unknown");
        assert_eq!(entry.timezone_offset, 0);
    }

    #[test]
    fn test_parse_malformed_json() {
        let result: Result<OneCallResponse, _> = serde_json::from_str("{ invalid json }");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_missing_current_block() {
        let missing = r#"{"timezone": "UTC", "daily": []}"#;
        let result: Result<OneCallResponse, _> = serde_json::from_str(missing);
        assert!(result.is_err());
    }

    #[test]
    fn test_request_url_contains_query_parameters() {
        let client = OpenWeatherClient::new().with_base_url("http://localhost:9999/data/2.5/");
        let url = client
            .request_url(coordinate(), TemperatureUnit::Metric, "secret")
            .expect("URL should build");

        assert_eq!(url.path(), "/data/2.5/onecall");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("lat".to_string(), "40.5".to_string())));
        assert!(query.contains(&("lon".to_string(), "-74".to_string())));
        assert!(query.contains(&("units".to_string(), "metric".to_string())));
        assert!(query.contains(&("appid".to_string(), "secret".to_string())));
        assert!(query.contains(&("exclude".to_string(), EXCLUDED_BLOCKS.to_string())));
    }

    #[test]
    fn test_request_url_rejects_empty_key() {
        let result = OpenWeatherClient::new().request_url(coordinate(), TemperatureUnit::Imperial, "  ");
        assert!(matches!(result, Err(ForecastError::InvalidRequest(_))));
    }

    #[test]
    fn test_request_url_rejects_bad_base() {
        let client = OpenWeatherClient::new().with_base_url("not a url");
        let result = client.request_url(coordinate(), TemperatureUnit::Imperial, "key");
        assert!(matches!(result, Err(ForecastError::InvalidRequest(_))));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED),
            ForecastError::InvalidRequest(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND),
            ForecastError::InvalidRequest(_)
        ));
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE),
            ForecastError::Network(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_without_key_does_not_touch_network() {
        // Unroutable base URL: only reachable if the key check is skipped
        let client = OpenWeatherClient::new().with_base_url("http://10.255.255.1");
        let result = client.fetch(coordinate(), TemperatureUnit::Imperial, "").await;
        assert!(matches!(result, Err(ForecastError::InvalidRequest(_))));
    }
}
