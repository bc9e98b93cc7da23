//! Session configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::layer::LayerSource;

pub const DEFAULT_DISTRICT_SOURCE: &str = "data/districts.geojson";
pub const DEFAULT_LLG_SOURCE: &str = "data/llgs.geojson";
pub const DEFAULT_GEOCODE_URL: &str = "https://nominatim.openstreetmap.org/reverse";
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FALLBACK_PROVINCE: &str = "Papua New Guinea";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Where the district boundary layer is loaded from (URL or file path).
    pub district_source: LayerSource,
    /// Where the LLG boundary layer is loaded from (URL or file path).
    pub llg_source: LayerSource,
    /// Reverse-geocoding endpoint for province fallback.
    pub geocode_url: String,
    /// Remote format-conversion endpoint; uploads are parsed locally as GeoJSON when absent.
    pub convert_url: Option<String>,
    /// Upper bound on geocode and conversion calls. `None` waits indefinitely.
    pub lookup_timeout: Option<Duration>,
    /// Display label for an unresolved province.
    pub fallback_province: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            district_source: LayerSource::new(DEFAULT_DISTRICT_SOURCE),
            llg_source: LayerSource::new(DEFAULT_LLG_SOURCE),
            geocode_url: DEFAULT_GEOCODE_URL.to_string(),
            convert_url: None,
            lookup_timeout: Some(Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS)),
            fallback_province: DEFAULT_FALLBACK_PROVINCE.to_string(),
        }
    }
}

impl SessionConfig {
    /// Build typed session config from environment variables.
    ///
    /// Optional:
    /// - `AOI_DISTRICT_SOURCE`: default `data/districts.geojson`
    /// - `AOI_LLG_SOURCE`: default `data/llgs.geojson`
    /// - `AOI_GEOCODE_URL`: default Nominatim reverse endpoint
    /// - `AOI_CONVERT_URL`: unset means local GeoJSON-only conversion
    /// - `AOI_LOOKUP_TIMEOUT_MS`: default 10000, `0` disables
    /// - `AOI_FALLBACK_PROVINCE`: default `Papua New Guinea`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let timeout_ms = parse_or(lookup("AOI_LOOKUP_TIMEOUT_MS"), DEFAULT_LOOKUP_TIMEOUT_MS);
        Self {
            district_source: lookup("AOI_DISTRICT_SOURCE").map_or(defaults.district_source, LayerSource::new),
            llg_source: lookup("AOI_LLG_SOURCE").map_or(defaults.llg_source, LayerSource::new),
            geocode_url: lookup("AOI_GEOCODE_URL")
                .unwrap_or(defaults.geocode_url)
                .trim_end_matches('/')
                .to_string(),
            convert_url: lookup("AOI_CONVERT_URL").filter(|u| !u.trim().is_empty()),
            lookup_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            fallback_province: lookup("AOI_FALLBACK_PROVINCE").unwrap_or(defaults.fallback_province),
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    match raw.map(|v| v.trim().parse::<T>()) {
        Some(Ok(value)) => value,
        _ => default,
    }
}
