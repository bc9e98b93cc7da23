use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
    move |key| map.get(key).cloned()
}

// =============================================================================
// defaults
// =============================================================================

#[test]
fn empty_environment_yields_defaults() {
    let config = SessionConfig::from_lookup(lookup_from(&[]));
    assert_eq!(config, SessionConfig::default());
    assert_eq!(config.district_source, LayerSource::new(DEFAULT_DISTRICT_SOURCE));
    assert_eq!(config.llg_source, LayerSource::new(DEFAULT_LLG_SOURCE));
    assert_eq!(config.geocode_url, DEFAULT_GEOCODE_URL);
    assert!(config.convert_url.is_none());
    assert_eq!(config.lookup_timeout, Some(Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS)));
    assert_eq!(config.fallback_province, DEFAULT_FALLBACK_PROVINCE);
}

// =============================================================================
// overrides
// =============================================================================

#[test]
fn variables_override_defaults() {
    let config = SessionConfig::from_lookup(lookup_from(&[
        ("AOI_DISTRICT_SOURCE", "https://gis.example.org/districts.geojson"),
        ("AOI_LLG_SOURCE", "/srv/llgs.geojson"),
        ("AOI_GEOCODE_URL", "https://geo.example.org/reverse/"),
        ("AOI_CONVERT_URL", "https://convert.example.org/v1"),
        ("AOI_LOOKUP_TIMEOUT_MS", "2500"),
        ("AOI_FALLBACK_PROVINCE", "PNG"),
    ]));
    assert_eq!(config.district_source.0, "https://gis.example.org/districts.geojson");
    assert_eq!(config.llg_source.0, "/srv/llgs.geojson");
    assert_eq!(config.geocode_url, "https://geo.example.org/reverse");
    assert_eq!(config.convert_url.as_deref(), Some("https://convert.example.org/v1"));
    assert_eq!(config.lookup_timeout, Some(Duration::from_millis(2500)));
    assert_eq!(config.fallback_province, "PNG");
}

#[test]
fn zero_timeout_disables_it() {
    let config = SessionConfig::from_lookup(lookup_from(&[("AOI_LOOKUP_TIMEOUT_MS", "0")]));
    assert!(config.lookup_timeout.is_none());
}

#[test]
fn unparsable_timeout_falls_back_to_default() {
    let config = SessionConfig::from_lookup(lookup_from(&[("AOI_LOOKUP_TIMEOUT_MS", "soon")]));
    assert_eq!(config.lookup_timeout, Some(Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS)));
}

#[test]
fn blank_convert_url_is_ignored() {
    let config = SessionConfig::from_lookup(lookup_from(&[("AOI_CONVERT_URL", "  ")]));
    assert!(config.convert_url.is_none());
}

// =============================================================================
// process environment
// =============================================================================

#[test]
fn from_env_reads_process_environment() {
    unsafe { std::env::set_var("AOI_FALLBACK_PROVINCE", "__TEST_PROVINCE__") };
    let config = SessionConfig::from_env();
    assert_eq!(config.fallback_province, "__TEST_PROVINCE__");
    unsafe { std::env::remove_var("AOI_FALLBACK_PROVINCE") };
}

#[test]
fn parse_or_trims_and_defaults() {
    assert_eq!(parse_or(Some(" 42 ".to_string()), 7_u64), 42);
    assert_eq!(parse_or(Some("x".to_string()), 7_u64), 7);
    assert_eq!(parse_or::<u64>(None, 7), 7);
}
