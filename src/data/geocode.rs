//! Reverse geocoding: convert a coordinate into a short place label.
//!
//! The label is built as "locality, region" and qualified with the country
//! only while it stays within [`MAX_PLACE_LEN`] characters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::Coordinate;

/// Public Nominatim instance (OpenStreetMap), no API key required
const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("lockweather/", env!("CARGO_PKG_VERSION"));

/// Longest label that may still carry the country suffix
pub const MAX_PLACE_LEN: usize = 24;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Reverse geocode failed: {0}")]
    Failed(String),

    #[error("No placemark found for {0}")]
    NoPlacemark(Coordinate),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Address parts returned by a geocoding service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placemark {
    pub locality: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

/// Builds the display label for a placemark.
///
/// Returns `None` when neither locality nor region is known.
pub fn format_place(placemark: &Placemark) -> Option<String> {
    let parts: Vec<&str> = [placemark.locality.as_deref(), placemark.region.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }

    let base = parts.join(", ");
    let qualified = placemark
        .country
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|country| format!("{}, {}", base, country));

    match qualified {
        Some(label) if label.chars().count() <= MAX_PLACE_LEN => Some(label),
        _ => Some(base),
    }
}

/// Resolves coordinates into place labels
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Looks up the address parts for a coordinate
    async fn placemark(&self, coordinate: Coordinate) -> Result<Placemark, GeocodeError>;

    /// Looks up a coordinate and formats it as a place label
    async fn resolve(&self, coordinate: Coordinate) -> Result<String, GeocodeError> {
        let placemark = self.placemark(coordinate).await?;
        format_place(&placemark).ok_or(GeocodeError::NoPlacemark(coordinate))
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    suburb: Option<String>,
    state: Option<String>,
    county: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

impl From<NominatimAddress> for Placemark {
    fn from(addr: NominatimAddress) -> Self {
        // Prefer city > town > village > municipality > suburb for the locality
        let locality = addr
            .city
            .or(addr.town)
            .or(addr.village)
            .or(addr.municipality)
            .or(addr.suburb);
        let region = addr.state.or(addr.county);
        let country = addr
            .country_code
            .map(|code| code.to_uppercase())
            .or(addr.country);

        Self {
            locality,
            region,
            country,
        }
    }
}

/// Reverse geocoder backed by Nominatim
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NominatimGeocoder {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: NOMINATIM_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn placemark(&self, coordinate: Coordinate) -> Result<Placemark, GeocodeError> {
        let endpoint = format!("{}/reverse", self.base_url.trim_end_matches('/'));
        let url = Url::parse_with_params(
            &endpoint,
            &[
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
                ("zoom", "10".to_string()),
            ],
        )
        .map_err(|e| GeocodeError::Failed(e.to_string()))?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GeocodeError::Failed(format!(
                "server returned {}",
                response.status()
            )));
        }

        let body: NominatimResponse = response.json().await?;
        let placemark: Placemark = body
            .address
            .map(Placemark::from)
            .ok_or(GeocodeError::NoPlacemark(coordinate))?;

        debug!(?placemark, "reverse geocoded");
        Ok(placemark)
    }
}
