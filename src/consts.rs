//! Shared numeric constants for the AOI crate.

// ── Geodesy ─────────────────────────────────────────────────────

/// WGS84 equatorial radius in meters, used for spherical ring area.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Square meters per square kilometer.
pub const SQ_M_PER_SQ_KM: f64 = 1_000_000.0;

// ── Coordinates ─────────────────────────────────────────────────

/// Decimal places kept when coordinates cross into the form (~0.11 m).
pub const COORD_DECIMALS: i32 = 6;

/// Added (away from zero) to scaled coordinates before truncation to absorb
/// binary representation error.
pub const TRUNCATE_NUDGE: f64 = 1e-6;

/// Smallest ring length: three distinct vertices plus the closing point.
pub const MIN_RING_POINTS: usize = 4;

/// Outer rings whose planar area is below this (in square degrees) are degenerate.
pub const DEGENERATE_AREA_EPSILON: f64 = 1e-14;

// ── Layers ──────────────────────────────────────────────────────

/// Registry name of the district boundary layer.
pub const DISTRICT_LAYER: &str = "districts";

/// Registry name of the local-level-government boundary layer.
pub const LLG_LAYER: &str = "llgs";
