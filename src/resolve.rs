//! Location resolver: district, LLG, and province for a coordinate.
//!
//! District and LLG come from point-in-polygon tests against the cached
//! boundary layers; the first containing feature in layer order wins.
//! Province is read from the matched features' attributes and only falls
//! back to the external reverse geocoder when neither layer supplied it.
//!
//! Every failure here degrades instead of propagating: a layer that fails
//! to load simply contributes nothing, and a geocoder error leaves the
//! province unset for the host to substitute its own label.

#[cfg(test)]
#[path = "resolve_test.rs"]
mod resolve_test;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::{DISTRICT_LAYER, LLG_LAYER};
use crate::error::ErrorCode;
use crate::geom::Coordinate;
use crate::layer::{LayerData, LayerSource, LayerStore};

// =============================================================================
// ERROR
// =============================================================================

/// Reverse-geocoding failures. Never fatal to a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocode request failed: {0}")]
    Request(String),
    #[error("geocode response error: status {status}")]
    Status { status: u16 },
    #[error("geocode response parse failed: {0}")]
    Parse(String),
    #[error("geocode timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl ErrorCode for GeocodeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_GEOCODE_REQUEST",
            Self::Status { .. } => "E_GEOCODE_STATUS",
            Self::Parse(_) => "E_GEOCODE_PARSE",
            Self::Timeout { .. } => "E_GEOCODE_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Timeout { .. } | Self::Status { status: 429 | 500..=599 })
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// Administrative units containing a coordinate. Any of them may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub district: Option<String>,
    pub province: Option<String>,
    pub llg: Option<String>,
}

/// Metadata derived from an authoritative boundary. Recomputed on every
/// boundary change and never stored apart from the boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationMetadata {
    pub district: Option<String>,
    pub province: Option<String>,
    pub llg: Option<String>,
    pub area_sq_km: f64,
}

impl LocationMetadata {
    #[must_use]
    pub fn new(location: Location, area_sq_km: f64) -> Self {
        Self { district: location.district, province: location.province, llg: location.llg, area_sq_km }
    }

    /// Province for display, or `fallback` when it could not be resolved.
    #[must_use]
    pub fn province_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.province.as_deref().unwrap_or(fallback)
    }
}

/// External province lookup keyed by longitude/latitude. Enables mocking in tests.
#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Province containing the position, `Ok(None)` when the service has no answer.
    ///
    /// # Errors
    ///
    /// Returns a [`GeocodeError`] on transport or decoding failure.
    async fn province(&self, lng: f64, lat: f64) -> Result<Option<String>, GeocodeError>;
}

// =============================================================================
// RESOLVER
// =============================================================================

pub struct LocationResolver {
    store: Arc<LayerStore>,
    geocoder: Arc<dyn ReverseGeocoder>,
    district_source: LayerSource,
    llg_source: LayerSource,
    timeout: Option<Duration>,
}

impl LocationResolver {
    #[must_use]
    pub fn new(
        store: Arc<LayerStore>,
        geocoder: Arc<dyn ReverseGeocoder>,
        district_source: LayerSource,
        llg_source: LayerSource,
    ) -> Self {
        Self { store, geocoder, district_source, llg_source, timeout: None }
    }

    /// Bound the geocoder call. `None` waits indefinitely.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the administrative units containing `at`.
    pub async fn resolve(&self, at: Coordinate) -> Location {
        let (districts, llgs) = tokio::join!(
            self.layer(DISTRICT_LAYER, &self.district_source),
            self.layer(LLG_LAYER, &self.llg_source)
        );

        let mut location = Location::default();
        if let Some(feature) = districts.as_deref().and_then(|d| d.containing(at)) {
            let props = feature.props();
            location.district = props.name().map(str::to_owned);
            location.province = props.province().map(str::to_owned);
        }
        if let Some(feature) = llgs.as_deref().and_then(|d| d.containing(at)) {
            let props = feature.props();
            location.llg = props.name().map(str::to_owned);
            if location.province.is_none() {
                location.province = props.province().map(str::to_owned);
            }
        }
        if location.province.is_none() {
            location.province = self.geocode(at).await;
        }

        debug!(
            lat = at.lat,
            lng = at.lng,
            district = ?location.district,
            llg = ?location.llg,
            province = ?location.province,
            "location resolved"
        );
        location
    }

    async fn layer(&self, name: &str, source: &LayerSource) -> Option<Arc<LayerData>> {
        match self.store.request(name, source).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(layer = name, error = %e, "boundary layer unavailable; resolving without it");
                None
            }
        }
    }

    async fn geocode(&self, at: Coordinate) -> Option<String> {
        let lookup = self.geocoder.province(at.lng, at.lat);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, lookup).await.unwrap_or_else(|_| {
                Err(GeocodeError::Timeout { ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX) })
            }),
            None => lookup.await,
        };
        match result {
            Ok(province) => province,
            Err(e) => {
                warn!(lat = at.lat, lng = at.lng, error = %e, code = e.error_code(), "reverse geocode failed");
                None
            }
        }
    }
}
