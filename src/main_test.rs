use super::*;

#[test]
fn mime_is_guessed_from_extension() {
    assert_eq!(mime_for(Path::new("site.geojson")), "application/geo+json");
    assert_eq!(mime_for(Path::new("SITE.JSON")), "application/geo+json");
    assert_eq!(mime_for(Path::new("lease.kml")), "application/vnd.google-earth.kml+xml");
    assert_eq!(mime_for(Path::new("parcels.zip")), "application/zip");
    assert_eq!(mime_for(Path::new("notes")), "application/octet-stream");
}

#[test]
fn cli_parses_negative_latitude() {
    let cli = Cli::try_parse_from(["aoi", "resolve", "--lat", "-6.72", "--lng", "147.0"]).unwrap();
    assert!(matches!(cli.command, Command::Resolve { lat, .. } if (lat - -6.72).abs() < f64::EPSILON));
}

#[tokio::test]
async fn area_of_missing_file_is_read_error() {
    let err = run_area(Path::new("/nonexistent/aoi.geojson")).await.unwrap_err();
    assert!(matches!(err, CliError::Read { .. }));
}
