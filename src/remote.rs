//! Concrete collaborators backed by HTTP and the local filesystem.
//!
//! Thin wrappers only: each client does one request and hands the body to a
//! pure parsing function (`parse_layer`, `parse_province`,
//! `parse_conversion`) so decoding is testable without a network.

#[cfg(test)]
#[path = "remote_test.rs"]
mod remote_test;

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::ErrorCode;
use crate::layer::{FeatureCollection, LayerError, LayerLoader, LayerSource};
use crate::resolve::{GeocodeError, ReverseGeocoder};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("aoi-map/", env!("CARGO_PKG_VERSION"));
const GEOJSON_MIME_TYPES: &[&str] = &["application/geo+json", "application/json", "application/vnd.geo+json"];

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
#[error("http client build failed: {0}")]
pub struct ClientBuildError(String);

impl ErrorCode for ClientBuildError {
    fn error_code(&self) -> &'static str {
        "E_HTTP_CLIENT_BUILD"
    }
}

/// Upload conversion failures. Surfaced to the user as a notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("conversion request failed: {0}")]
    Request(String),
    #[error("conversion service returned status {status}")]
    Status { status: u16 },
    #[error("conversion response parse failed: {0}")]
    Parse(String),
    #[error("unsupported upload format: {mime}")]
    Unsupported { mime: String },
    #[error("uploaded file contains no features")]
    NoFeatures,
    #[error("conversion timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl ErrorCode for ConversionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_CONVERSION_REQUEST",
            Self::Status { .. } => "E_CONVERSION_STATUS",
            Self::Parse(_) => "E_CONVERSION_PARSE",
            Self::Unsupported { .. } => "E_CONVERSION_UNSUPPORTED",
            Self::NoFeatures => "E_CONVERSION_NO_FEATURES",
            Self::Timeout { .. } => "E_CONVERSION_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Timeout { .. } | Self::Status { status: 429 | 500..=599 })
    }
}

/// External service turning an uploaded file into GeoJSON features.
#[async_trait::async_trait]
pub trait GeometryConverter: Send + Sync {
    /// Convert `bytes` of media type `mime`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] if the format is unsupported, the
    /// service fails, or the result holds no features.
    async fn convert(&self, bytes: &[u8], mime: &str) -> Result<FeatureCollection, ConversionError>;
}

fn http_client(timeout: Option<Duration>) -> Result<reqwest::Client, ClientBuildError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS));
    if let Some(limit) = timeout {
        builder = builder.timeout(limit);
    }
    builder.build().map_err(|e| ClientBuildError(e.to_string()))
}

fn is_http(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

// =============================================================================
// LAYER LOADER
// =============================================================================

/// Loads GeoJSON layers from `http(s)://` URLs or local file paths.
pub struct GeoJsonLoader {
    http: reqwest::Client,
}

impl GeoJsonLoader {
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, ClientBuildError> {
        Ok(Self { http: http_client(None)? })
    }

    async fn fetch_http(&self, name: &str, url: &str) -> Result<Vec<u8>, LayerError> {
        let fetch_err = |message: String| LayerError::Fetch { layer: name.to_string(), message };
        let response = self.http.get(url).send().await.map_err(|e| fetch_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("status {}", status.as_u16())));
        }
        let body = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[async_trait::async_trait]
impl LayerLoader for GeoJsonLoader {
    async fn load(&self, name: &str, source: &LayerSource) -> Result<FeatureCollection, LayerError> {
        debug!(layer = name, %source, "fetching layer");
        let bytes = if is_http(&source.0) {
            self.fetch_http(name, &source.0).await?
        } else {
            tokio::fs::read(&source.0)
                .await
                .map_err(|e| LayerError::Fetch { layer: name.to_string(), message: e.to_string() })?
        };
        let collection = parse_layer(name, &bytes)?;
        info!(layer = name, features = collection.features.len(), bytes = bytes.len(), "layer fetched");
        Ok(collection)
    }
}

pub(crate) fn parse_layer(name: &str, bytes: &[u8]) -> Result<FeatureCollection, LayerError> {
    let parse_err = |e: serde_json::Error| LayerError::Parse { layer: name.to_string(), message: e.to_string() };
    let value: Value = serde_json::from_slice(bytes).map_err(parse_err)?;
    FeatureCollection::from_geojson(value).map_err(parse_err)
}

// =============================================================================
// REVERSE GEOCODER
// =============================================================================

/// Nominatim-compatible reverse geocoder.
pub struct HttpReverseGeocoder {
    http: reqwest::Client,
    url: String,
}

impl HttpReverseGeocoder {
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ClientBuildError> {
        Ok(Self { http: http_client(timeout)?, url: url.into() })
    }
}

#[async_trait::async_trait]
impl ReverseGeocoder for HttpReverseGeocoder {
    async fn province(&self, lng: f64, lat: f64) -> Result<Option<String>, GeocodeError> {
        let query = [
            ("format", "jsonv2".to_string()),
            ("lat", lat.to_string()),
            ("lon", lng.to_string()),
            ("zoom", "5".to_string()),
        ];
        let response = self
            .http
            .get(&self.url)
            .query(&query)
            .send()
            .await
            .map_err(|e| GeocodeError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(GeocodeError::Status { status });
        }
        let body: Value = response.json().await.map_err(|e| GeocodeError::Parse(e.to_string()))?;
        Ok(parse_province(&body))
    }
}

/// Province-level name from a reverse-geocode response, if any.
pub(crate) fn parse_province(body: &Value) -> Option<String> {
    let address = body.get("address")?;
    ["province", "state", "region"]
        .iter()
        .find_map(|k| address.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

// =============================================================================
// GEOMETRY CONVERTERS
// =============================================================================

/// Accepts GeoJSON uploads only, parsed in-process.
#[derive(Debug, Default)]
pub struct LocalGeoJsonConverter;

#[async_trait::async_trait]
impl GeometryConverter for LocalGeoJsonConverter {
    async fn convert(&self, bytes: &[u8], mime: &str) -> Result<FeatureCollection, ConversionError> {
        if !is_geojson(mime) {
            return Err(ConversionError::Unsupported { mime: mime.to_string() });
        }
        parse_conversion(bytes)
    }
}

/// Posts uploads to a conversion service that answers with GeoJSON.
pub struct HttpGeometryConverter {
    http: reqwest::Client,
    url: String,
}

impl HttpGeometryConverter {
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ClientBuildError> {
        Ok(Self { http: http_client(timeout)?, url: url.into() })
    }
}

#[async_trait::async_trait]
impl GeometryConverter for HttpGeometryConverter {
    async fn convert(&self, bytes: &[u8], mime: &str) -> Result<FeatureCollection, ConversionError> {
        if is_geojson(mime) {
            return parse_conversion(bytes);
        }
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ConversionError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            415 => return Err(ConversionError::Unsupported { mime: mime.to_string() }),
            _ => return Err(ConversionError::Status { status }),
        }
        let body = response.bytes().await.map_err(|e| ConversionError::Request(e.to_string()))?;
        parse_conversion(&body)
    }
}

fn is_geojson(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    GEOJSON_MIME_TYPES.contains(&essence.as_str())
}

pub(crate) fn parse_conversion(bytes: &[u8]) -> Result<FeatureCollection, ConversionError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| ConversionError::Parse(e.to_string()))?;
    let collection = FeatureCollection::from_geojson(value).map_err(|e| ConversionError::Parse(e.to_string()))?;
    if collection.features.is_empty() {
        return Err(ConversionError::NoFeatures);
    }
    Ok(collection)
}
