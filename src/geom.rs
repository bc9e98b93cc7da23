//! Geometry kernel: coordinates, GeoJSON polygons, containment, and area.
//!
//! Positions follow GeoJSON order (`[longitude, latitude]`) while
//! [`Coordinate`] is the `(lat, lng)` pair the form and marker speak. Ring
//! winding is never assumed: containment uses an even-odd ray cast and area
//! takes the absolute value of each ring before holes are subtracted.
//!
//! Everything here is pure. Degenerate polygons (fewer than three distinct
//! vertices) contain nothing, have zero area, and have no representative
//! point.

#[cfg(test)]
#[path = "geom_test.rs"]
mod geom_test;

use serde::{Deserialize, Serialize};

use crate::consts::{
    COORD_DECIMALS, DEGENERATE_AREA_EPSILON, EARTH_RADIUS_M, MIN_RING_POINTS, SQ_M_PER_SQ_KM, TRUNCATE_NUDGE,
};
use crate::error::ErrorCode;

/// A `[longitude, latitude]` pair in GeoJSON order.
pub type Position = [f64; 2];

/// A closed sequence of positions (first == last).
pub type Ring = Vec<Position>;

// =============================================================================
// ERROR
// =============================================================================

/// Reasons a geometry is rejected before it can become a boundary candidate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("geometry has no polygons")]
    Empty,
    #[error("ring has {points} points; at least 4 are required")]
    TooFewPoints { points: usize },
    #[error("ring is not closed")]
    OpenRing,
    #[error("polygon has fewer than three distinct vertices")]
    Degenerate,
    #[error("coordinate out of range: lat {lat}, lng {lng}")]
    OutOfRange { lat: f64, lng: f64 },
    #[error("geometry parse failed: {0}")]
    Parse(String),
}

impl ErrorCode for GeometryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Empty => "E_GEOMETRY_EMPTY",
            Self::TooFewPoints { .. } => "E_GEOMETRY_TOO_FEW_POINTS",
            Self::OpenRing => "E_GEOMETRY_OPEN_RING",
            Self::Degenerate => "E_GEOMETRY_DEGENERATE",
            Self::OutOfRange { .. } => "E_GEOMETRY_OUT_OF_RANGE",
            Self::Parse(_) => "E_GEOMETRY_PARSE",
        }
    }
}

// =============================================================================
// COORDINATE
// =============================================================================

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::OutOfRange`] when latitude is outside
    /// `[-90, 90]`, longitude outside `[-180, 180]`, or either is not finite.
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeometryError> {
        let coord = Self { lat, lng };
        if coord.is_valid() { Ok(coord) } else { Err(GeometryError::OutOfRange { lat, lng }) }
    }

    /// Whether both components are finite and within geographic range.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Copy with both components truncated to six decimal places.
    #[must_use]
    pub fn truncated(self) -> Self {
        Self { lat: truncate(self.lat), lng: truncate(self.lng) }
    }

    #[must_use]
    pub fn from_position(p: Position) -> Self {
        Self { lat: p[1], lng: p[0] }
    }

    #[must_use]
    pub fn to_position(self) -> Position {
        [self.lng, self.lat]
    }
}

/// Drop digits past `COORD_DECIMALS`. The nudge keeps values that already
/// have that many decimals (`1.000001` scales to `1000000.999...`) intact.
fn truncate(v: f64) -> f64 {
    let scale = 10f64.powi(COORD_DECIMALS);
    (v * scale + v.signum() * TRUNCATE_NUDGE).trunc() / scale
}

// =============================================================================
// BOUNDING BOX
// =============================================================================

/// Axis-aligned extent in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BBox {
    /// Inclusive containment test.
    #[must_use]
    pub fn contains(&self, at: Coordinate) -> bool {
        at.lng >= self.min_lng && at.lng <= self.max_lng && at.lat >= self.min_lat && at.lat <= self.max_lat
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Coordinate {
        Coordinate { lat: f64::midpoint(self.min_lat, self.max_lat), lng: f64::midpoint(self.min_lng, self.max_lng) }
    }

    fn extend(&mut self, p: Position) {
        self.min_lng = self.min_lng.min(p[0]);
        self.max_lng = self.max_lng.max(p[0]);
        self.min_lat = self.min_lat.min(p[1]);
        self.max_lat = self.max_lat.max(p[1]);
    }
}

// =============================================================================
// POLYGON / GEOMETRY
// =============================================================================

/// Linear rings: the first is the outer boundary, the rest are holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon(pub Vec<Ring>);

impl Polygon {
    #[must_use]
    pub fn new(rings: Vec<Ring>) -> Self {
        Self(rings)
    }

    /// The outer ring, if the polygon has any rings at all.
    #[must_use]
    pub fn outer(&self) -> Option<&Ring> {
        self.0.first()
    }

    /// Hole rings (everything after the outer ring).
    #[must_use]
    pub fn holes(&self) -> &[Ring] {
        self.0.get(1..).unwrap_or(&[])
    }
}

/// Polygonal GeoJSON geometry. Serializes as `{"type": ..., "coordinates": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    /// Parse a GeoJSON geometry object.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Parse`] for non-polygonal or malformed input.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, GeometryError> {
        Self::deserialize(value).map_err(|e| GeometryError::Parse(e.to_string()))
    }

    /// All member polygons in order.
    #[must_use]
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Self::Polygon(p) => std::slice::from_ref(p),
            Self::MultiPolygon(ps) => ps,
        }
    }

    /// Whether any member polygon contains `at`.
    #[must_use]
    pub fn contains(&self, at: Coordinate) -> bool {
        self.polygons().iter().any(|p| point_in_polygon(at, p))
    }

    /// Area in square kilometers.
    #[must_use]
    pub fn area_sq_km(&self) -> f64 {
        area(self) / SQ_M_PER_SQ_KM
    }
}

// =============================================================================
// KERNEL
// =============================================================================

/// Even-odd containment over the outer ring with holes subtracted.
///
/// Planar in degrees, which is adequate at the tens-of-kilometers scale the
/// boundary layers are queried at. Degenerate polygons contain nothing.
#[must_use]
pub fn point_in_polygon(at: Coordinate, polygon: &Polygon) -> bool {
    let Some(outer) = polygon.outer() else {
        return false;
    };
    if !has_three_distinct(outer) {
        return false;
    }
    ring_contains(outer, at) && !polygon.holes().iter().any(|hole| ring_contains(hole, at))
}

/// Geodesic area in square meters, independent of ring winding.
#[must_use]
pub fn area(geometry: &Geometry) -> f64 {
    geometry.polygons().iter().map(polygon_area).sum()
}

/// Vertex mean of the first polygon's outer ring.
///
/// This is not an area-weighted centroid; concave shapes can place it
/// outside the polygon.
///
/// # Errors
///
/// Returns [`GeometryError::Degenerate`] if the ring has fewer than three
/// distinct vertices, or [`GeometryError::Empty`] if there is no ring.
pub fn representative_point(geometry: &Geometry) -> Result<Coordinate, GeometryError> {
    let outer = geometry.polygons().first().and_then(Polygon::outer).ok_or(GeometryError::Empty)?;
    if !has_three_distinct(outer) {
        return Err(GeometryError::Degenerate);
    }
    let vertices = open_vertices(outer);
    #[allow(clippy::cast_precision_loss)]
    let n = vertices.len() as f64;
    let (sum_lng, sum_lat) = vertices.iter().fold((0.0, 0.0), |(x, y), p| (x + p[0], y + p[1]));
    Ok(Coordinate { lat: sum_lat / n, lng: sum_lng / n })
}

/// Bounding box of every outer ring, or `None` for an empty geometry.
#[must_use]
pub fn bbox(geometry: &Geometry) -> Option<BBox> {
    let mut positions = geometry.polygons().iter().filter_map(Polygon::outer).flatten();
    let first = *positions.next()?;
    let mut bounds = BBox { min_lng: first[0], min_lat: first[1], max_lng: first[0], max_lat: first[1] };
    for p in positions {
        bounds.extend(*p);
    }
    Some(bounds)
}

/// Check the structural invariants every boundary candidate must satisfy.
///
/// # Errors
///
/// Returns the first violated invariant: missing polygons or rings, rings
/// shorter than four points or not closed, positions out of range, or a
/// degenerate outer ring.
pub fn validate(geometry: &Geometry) -> Result<(), GeometryError> {
    let polygons = geometry.polygons();
    if polygons.is_empty() {
        return Err(GeometryError::Empty);
    }
    for polygon in polygons {
        let Some(outer) = polygon.outer() else {
            return Err(GeometryError::Empty);
        };
        for ring in &polygon.0 {
            validate_ring(ring)?;
        }
        if !has_three_distinct(outer) || planar_ring_area(outer) < DEGENERATE_AREA_EPSILON {
            return Err(GeometryError::Degenerate);
        }
    }
    Ok(())
}

fn validate_ring(ring: &[Position]) -> Result<(), GeometryError> {
    if ring.len() < MIN_RING_POINTS {
        return Err(GeometryError::TooFewPoints { points: ring.len() });
    }
    if ring.first() != ring.last() {
        return Err(GeometryError::OpenRing);
    }
    if let Some(bad) = ring.iter().map(|p| Coordinate::from_position(*p)).find(|c| !c.is_valid()) {
        return Err(GeometryError::OutOfRange { lat: bad.lat, lng: bad.lng });
    }
    Ok(())
}

fn polygon_area(polygon: &Polygon) -> f64 {
    let Some(outer) = polygon.outer() else {
        return 0.0;
    };
    if !has_three_distinct(outer) {
        return 0.0;
    }
    let holes: f64 = polygon.holes().iter().map(|h| ring_area(h)).sum();
    (ring_area(outer) - holes).max(0.0)
}

/// Spherical ring area (Chamberlain & Duquette), absolute value.
fn ring_area(ring: &[Position]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let total: f64 = (0..n)
        .map(|i| {
            let lower = ring[i];
            let middle = ring[(i + 1) % n];
            let upper = ring[(i + 2) % n];
            (upper[0].to_radians() - lower[0].to_radians()) * middle[1].to_radians().sin()
        })
        .sum();
    (total * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0).abs()
}

/// Shoelace area in square degrees, absolute value.
fn planar_ring_area(ring: &[Position]) -> f64 {
    let twice: f64 = edges(ring).map(|(a, b)| a[0] * b[1] - b[0] * a[1]).sum();
    (twice / 2.0).abs()
}

fn ring_contains(ring: &[Position], at: Coordinate) -> bool {
    let (x, y) = (at.lng, at.lat);
    let mut inside = false;
    for (a, b) in edges(ring) {
        if (a[1] > y) != (b[1] > y) && x < (b[0] - a[0]) * (y - a[1]) / (b[1] - a[1]) + a[0] {
            inside = !inside;
        }
    }
    inside
}

/// Consecutive vertex pairs including the wrap-around edge.
fn edges(ring: &[Position]) -> impl Iterator<Item = (Position, Position)> + '_ {
    ring.iter().zip(ring.iter().cycle().skip(1)).map(|(a, b)| (*a, *b)).take(ring.len())
}

/// Ring vertices without the closing duplicate.
fn open_vertices(ring: &[Position]) -> &[Position] {
    match ring {
        [first, .., last] if first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

fn has_three_distinct(ring: &[Position]) -> bool {
    let mut seen: Vec<Position> = Vec::with_capacity(3);
    for p in ring {
        if !seen.contains(p) {
            seen.push(*p);
            if seen.len() == 3 {
                return true;
            }
        }
    }
    false
}
