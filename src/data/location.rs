//! Location acquisition
//!
//! [`LocationSource`] guards a [`LocationBackend`] with an authorization
//! check and allows only one backend request in flight at a time. The
//! bundled backend geolocates the host by its public IP address.

use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::Coordinate;

const IP_API_BASE_URL: &str = "http://ip-api.com";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum LocationError {
    /// The user has not granted (or has revoked) location access
    #[error("Location permission denied")]
    PermissionDenied,

    /// Location services are disabled or returned no usable fix
    #[error("Location unavailable: {0}")]
    Unavailable(String),

    /// The backend failed to answer
    #[error("Location request failed: {0}")]
    Failed(String),
}

/// Permission state for location access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authorization {
    #[default]
    NotDetermined,
    Denied,
    Authorized,
}

/// Something that can produce a single position fix
#[async_trait]
pub trait LocationBackend: Send + Sync {
    async fn locate(&self) -> Result<Coordinate, LocationError>;
}

/// Single-shot location requests on top of a backend
pub struct LocationSource {
    backend: Box<dyn LocationBackend>,
    authorization: RwLock<Authorization>,
    services_enabled: bool,
    in_flight: tokio::sync::Mutex<()>,
    last_known: Mutex<Option<Coordinate>>,
}

impl std::fmt::Debug for LocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationSource")
            .field("authorization", &self.authorization())
            .field("services_enabled", &self.services_enabled)
            .field("last_known", &self.last_known())
            .finish()
    }
}

impl LocationSource {
    /// Creates an enabled source with the given authorization
    pub fn new(backend: impl LocationBackend + 'static, authorization: Authorization) -> Self {
        Self {
            backend: Box::new(backend),
            authorization: RwLock::new(authorization),
            services_enabled: true,
            in_flight: tokio::sync::Mutex::new(()),
            last_known: Mutex::new(None),
        }
    }

    /// Marks location services as switched off
    pub fn with_services_enabled(mut self, enabled: bool) -> Self {
        self.services_enabled = enabled;
        self
    }

    pub fn authorization(&self) -> Authorization {
        *self
            .authorization
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates the permission state. Requests that already failed stay failed;
    /// callers must request again.
    pub fn set_authorization(&self, authorization: Authorization) {
        *self
            .authorization
            .write()
            .unwrap_or_else(PoisonError::into_inner) = authorization;
    }

    /// Last coordinate obtained by this source, if any
    pub fn last_known(&self) -> Option<Coordinate> {
        *self.last_known.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests one position fix.
    ///
    /// Concurrent callers are queued so that at most one backend request is
    /// outstanding.
    pub async fn request_once(&self) -> Result<Coordinate, LocationError> {
        if !self.services_enabled {
            return Err(LocationError::Unavailable(
                "location services are disabled".to_string(),
            ));
        }
        match self.authorization() {
            Authorization::Authorized => {}
            state => {
                debug!(?state, "location request refused");
                return Err(LocationError::PermissionDenied);
            }
        }

        let _guard = self.in_flight.lock().await;
        let coordinate = self.backend.locate().await?;
        if !coordinate.is_valid() {
            warn!(%coordinate, "backend returned an out-of-range coordinate");
            return Err(LocationError::Unavailable(format!(
                "invalid coordinate {}",
                coordinate
            )));
        }

        *self.last_known.lock().unwrap_or_else(PoisonError::into_inner) = Some(coordinate);
        Ok(coordinate)
    }
}

/// Response from ip-api.com
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
    message: Option<String>,
}

/// Approximate location from the public IP address
#[derive(Debug, Clone)]
pub struct IpLocationBackend {
    client: Client,
    base_url: String,
}

impl Default for IpLocationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IpLocationBackend {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: IP_API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LocationBackend for IpLocationBackend {
    async fn locate(&self) -> Result<Coordinate, LocationError> {
        let url = format!("{}/json/", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "status,message,lat,lon")])
            .send()
            .await
            .map_err(|e| LocationError::Failed(e.to_string()))?;

        let body: IpApiResponse = response
            .json()
            .await
            .map_err(|e| LocationError::Failed(e.to_string()))?;

        if body.status != "success" {
            return Err(LocationError::Unavailable(
                body.message.unwrap_or(body.status),
            ));
        }

        match (body.lat, body.lon) {
            (Some(lat), Some(lon)) => Ok(Coordinate {
                latitude: lat,
                longitude: lon,
            }),
            _ => Err(LocationError::Unavailable("response had no position".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Backend that records how many calls overlap
    struct SlowBackend {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
        fix: Coordinate,
    }

    #[async_trait]
    impl LocationBackend for SlowBackend {
        async fn locate(&self) -> Result<Coordinate, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(self.fix)
        }
    }

    fn slow_backend(fix: Coordinate) -> (SlowBackend, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let peak = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = SlowBackend {
            active: Arc::new(AtomicUsize::new(0)),
            peak: peak.clone(),
            calls: calls.clone(),
            fix,
        };
        (backend, peak, calls)
    }

    fn vancouver() -> Coordinate {
        Coordinate::new(49.28, -123.12).unwrap()
    }

    #[tokio::test]
    async fn test_authorized_request_returns_fix_and_records_last_known() {
        let (backend, _, _) = slow_backend(vancouver());
        let source = LocationSource::new(backend, Authorization::Authorized);

        assert!(source.last_known().is_none());
        let fix = source.request_once().await.expect("request should succeed");

        assert_eq!(fix, vancouver());
        assert_eq!(source.last_known(), Some(vancouver()));
    }

    #[tokio::test]
    async fn test_unauthorized_request_fails_without_backend_call() {
        for state in [Authorization::NotDetermined, Authorization::Denied] {
            let (backend, _, calls) = slow_backend(vancouver());
            let source = LocationSource::new(backend, state);

            let result = source.request_once().await;

            assert!(matches!(result, Err(LocationError::PermissionDenied)));
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_disabled_services_report_unavailable() {
        let (backend, _, calls) = slow_backend(vancouver());
        let source =
            LocationSource::new(backend, Authorization::Authorized).with_services_enabled(false);

        let result = source.request_once().await;

        assert!(matches!(result, Err(LocationError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_authorization_change_requires_new_request() {
        let (backend, _, calls) = slow_backend(vancouver());
        let source = LocationSource::new(backend, Authorization::Denied);

        assert!(source.request_once().await.is_err());
        source.set_authorization(Authorization::Authorized);

        // Nothing is resolved retroactively
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(source.last_known().is_none());

        assert_eq!(source.request_once().await.unwrap(), vancouver());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_serialised() {
        let (backend, peak, calls) = slow_backend(vancouver());
        let source = Arc::new(LocationSource::new(backend, Authorization::Authorized));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let source = source.clone();
                tokio::spawn(async move { source.request_once().await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_fix_is_rejected() {
        let bogus = Coordinate {
            latitude: 200.0,
            longitude: 0.0,
        };
        let (backend, _, _) = slow_backend(bogus);
        let source = LocationSource::new(backend, Authorization::Authorized);

        assert!(matches!(
            source.request_once().await,
            Err(LocationError::Unavailable(_))
        ));
        assert!(source.last_known().is_none());
    }

    #[test]
    fn test_ip_api_failure_response_parses() {
        let body: IpApiResponse =
            serde_json::from_str(r#"{"status": "fail", "message": "private range"}"#).unwrap();
        assert_eq!(body.status, "fail");
        assert_eq!(body.message.as_deref(), Some("private range"));
        assert!(body.lat.is_none());
    }
}
