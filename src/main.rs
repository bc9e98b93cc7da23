use std::path::{Path, PathBuf};
use std::sync::Arc;

use aoi_map::config::SessionConfig;
use aoi_map::geom::{Coordinate, Geometry, GeometryError, area, bbox, representative_point, validate};
use aoi_map::layer::{FeatureCollection, LayerSource, LayerStore};
use aoi_map::remote::{ClientBuildError, GeoJsonLoader, HttpReverseGeocoder};
use aoi_map::resolve::LocationResolver;
use aoi_map::session::{Action, MapSession};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::debug;

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Client(#[from] ClientBuildError),
    #[error("file contains no features")]
    NoFeatures,
    #[error("upload rejected ({code}): {message}")]
    Rejected { code: &'static str, message: String },
}

#[derive(Parser, Debug)]
#[command(name = "aoi", about = "Area-of-interest boundary tools")]
struct Cli {
    /// District boundary layer (URL or file path).
    #[arg(long, env = "AOI_DISTRICT_SOURCE")]
    district_source: Option<String>,

    /// LLG boundary layer (URL or file path).
    #[arg(long, env = "AOI_LLG_SOURCE")]
    llg_source: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Area, representative point, and extent of the first polygon in a GeoJSON file.
    Area { file: PathBuf },
    /// District, LLG, and province containing a coordinate.
    Resolve {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// Run a file through a fresh session upload and print the saved metadata.
    Upload {
        file: PathBuf,
        /// Media type; guessed from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    let mut config = SessionConfig::from_env();
    if let Some(source) = cli.district_source {
        config.district_source = LayerSource::new(source);
    }
    if let Some(source) = cli.llg_source {
        config.llg_source = LayerSource::new(source);
    }

    match cli.command {
        Command::Area { file } => run_area(&file).await,
        Command::Resolve { lat, lng } => run_resolve(config, Coordinate::new(lat, lng)?).await,
        Command::Upload { file, mime } => {
            let mime = mime.unwrap_or_else(|| mime_for(&file).to_string());
            run_upload(config, &file, &mime).await
        }
    }
}

async fn run_area(file: &Path) -> Result<(), CliError> {
    let value: Value = serde_json::from_slice(&read(file).await?)?;
    let collection = FeatureCollection::from_geojson(value)?;
    let first = collection.features.into_iter().next().ok_or(CliError::NoFeatures)?;
    let geometry = Geometry::from_value(&first.geometry)?;
    validate(&geometry)?;

    print_json(&json!({
        "areaSqM": area(&geometry),
        "areaSqKm": geometry.area_sq_km(),
        "representativePoint": representative_point(&geometry)?.truncated(),
        "bbox": bbox(&geometry),
    }))
}

async fn run_resolve(config: SessionConfig, at: Coordinate) -> Result<(), CliError> {
    let store = Arc::new(LayerStore::new(Arc::new(GeoJsonLoader::new()?)));
    let geocoder = Arc::new(HttpReverseGeocoder::new(config.geocode_url.clone(), config.lookup_timeout)?);
    let resolver =
        LocationResolver::new(store, geocoder, config.district_source.clone(), config.llg_source.clone())
            .with_timeout(config.lookup_timeout);

    let location = resolver.resolve(at).await;
    let label = location.province.clone().unwrap_or_else(|| config.fallback_province.clone());
    print_json(&json!({
        "district": location.district,
        "llg": location.llg,
        "province": location.province,
        "provinceLabel": label,
    }))
}

async fn run_upload(config: SessionConfig, file: &Path, mime: &str) -> Result<(), CliError> {
    let bytes = read(file).await?;
    let fallback = config.fallback_province.clone();
    let mut session = MapSession::from_config(config)?;

    for action in session.upload(&bytes, mime).await {
        match action {
            Action::BoundarySaved { metadata, .. } => {
                print_json(&json!({
                    "district": metadata.district,
                    "llg": metadata.llg,
                    "province": metadata.province,
                    "provinceLabel": metadata.province_or(&fallback),
                    "areaSqKm": metadata.area_sq_km,
                }))?;
            }
            Action::Notify { code, message } => return Err(CliError::Rejected { code, message }),
            other => debug!(action = ?other, "ignored action"),
        }
    }
    Ok(())
}

async fn read(path: &Path) -> Result<Vec<u8>, CliError> {
    tokio::fs::read(path).await.map_err(|source| CliError::Read { path: path.to_path_buf(), source })
}

/// Media type for an upload, from its file extension.
fn mime_for(path: &Path) -> &'static str {
    let ext = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "geojson" | "json" => "application/geo+json",
        "kml" => "application/vnd.google-earth.kml+xml",
        "kmz" => "application/vnd.google-earth.kmz",
        "gpx" => "application/gpx+xml",
        "zip" | "shp" => "application/zip",
        _ => "application/octet-stream",
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
