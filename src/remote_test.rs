use serde_json::json;

use super::*;

const SQUARE: &str = r#"{"type":"Polygon","coordinates":[[[147.0,-6.0],[147.1,-6.0],[147.1,-5.9],[147.0,-5.9],[147.0,-6.0]]]}"#;

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("aoi-map-{}-{name}", std::process::id()))
}

// =============================================================================
// parse_layer
// =============================================================================

#[test]
fn parse_layer_reads_feature_collection() {
    let body = format!(
        r#"{{"type":"FeatureCollection","features":[{{"type":"Feature","id":3,"properties":{{"DISTNAME":"Lae"}},"geometry":{SQUARE}}}]}}"#
    );
    let fc = parse_layer("districts", body.as_bytes()).unwrap();
    assert_eq!(fc.features.len(), 1);
    assert_eq!(fc.features[0].properties["DISTNAME"], "Lae");
}

#[test]
fn parse_layer_rejects_non_json() {
    let err = parse_layer("districts", b"<html>").unwrap_err();
    assert!(matches!(err, LayerError::Parse { ref layer, .. } if layer == "districts"));
    assert_eq!(err.error_code(), "E_LAYER_PARSE");
}

// =============================================================================
// parse_province
// =============================================================================

#[test]
fn parse_province_prefers_province_then_state() {
    assert_eq!(parse_province(&json!({ "address": { "state": "Morobe Province" } })).as_deref(), Some("Morobe Province"));
    assert_eq!(
        parse_province(&json!({ "address": { "province": "Morobe", "state": "Other" } })).as_deref(),
        Some("Morobe")
    );
    assert_eq!(parse_province(&json!({ "address": { "region": "Momase" } })).as_deref(), Some("Momase"));
}

#[test]
fn parse_province_handles_missing_answer() {
    assert!(parse_province(&json!({ "error": "Unable to geocode" })).is_none());
    assert!(parse_province(&json!({ "address": { "country": "Papua New Guinea" } })).is_none());
    assert!(parse_province(&json!({ "address": { "state": "  " } })).is_none());
}

// =============================================================================
// conversion
// =============================================================================

#[test]
fn parse_conversion_accepts_bare_geometry() {
    let fc = parse_conversion(SQUARE.as_bytes()).unwrap();
    assert_eq!(fc.features.len(), 1);
}

#[test]
fn parse_conversion_empty_collection_is_no_features() {
    let err = parse_conversion(br#"{"type":"FeatureCollection","features":[]}"#).unwrap_err();
    assert_eq!(err, ConversionError::NoFeatures);
}

#[test]
fn parse_conversion_garbage_is_parse_error() {
    assert!(matches!(parse_conversion(b"PK\x03\x04"), Err(ConversionError::Parse(_))));
}

#[tokio::test]
async fn local_converter_accepts_geojson_mime_types() {
    let converter = LocalGeoJsonConverter;
    for mime in ["application/geo+json", "application/json; charset=utf-8", "APPLICATION/JSON"] {
        assert_eq!(converter.convert(SQUARE.as_bytes(), mime).await.unwrap().features.len(), 1, "{mime}");
    }
}

#[tokio::test]
async fn local_converter_rejects_other_formats() {
    let err = LocalGeoJsonConverter.convert(b"PK", "application/zip").await.unwrap_err();
    assert_eq!(err, ConversionError::Unsupported { mime: "application/zip".into() });
    assert!(!err.retryable());
}

#[test]
fn conversion_error_retryability() {
    assert!(ConversionError::Request("reset".into()).retryable());
    assert!(ConversionError::Status { status: 503 }.retryable());
    assert!(!ConversionError::Status { status: 400 }.retryable());
    assert!(!ConversionError::NoFeatures.retryable());
}

// =============================================================================
// GeoJsonLoader
// =============================================================================

#[tokio::test]
async fn loader_reads_local_file() {
    let path = temp_path("layer.geojson");
    tokio::fs::write(&path, SQUARE).await.unwrap();

    let loader = GeoJsonLoader::new().unwrap();
    let fc = loader.load("zones", &LayerSource::new(path.to_string_lossy())).await.unwrap();
    assert_eq!(fc.features.len(), 1);

    tokio::fs::remove_file(&path).await.unwrap();
}

#[tokio::test]
async fn loader_missing_file_is_fetch_error() {
    let loader = GeoJsonLoader::new().unwrap();
    let err = loader.load("zones", &LayerSource::new(temp_path("missing.geojson").to_string_lossy())).await.unwrap_err();
    assert!(matches!(err, LayerError::Fetch { ref layer, .. } if layer == "zones"));
    assert!(err.retryable());
}

#[test]
fn http_sources_are_detected() {
    assert!(is_http("https://example.org/a.geojson"));
    assert!(is_http("http://localhost/a.geojson"));
    assert!(!is_http("data/districts.geojson"));
}
