//! Location marker confined to the authoritative boundary.
//!
//! The marker follows the boundary: binding a new boundary moves it to the
//! boundary's representative point. Drags, clicks, and coordinate-field
//! edits all funnel through one acceptance check. With a boundary bound, a
//! position outside it is refused and the marker snaps back to its last
//! accepted position. Without one the marker goes wherever it is put.

#[cfg(test)]
#[path = "marker_test.rs"]
mod marker_test;

use crate::geom::{Coordinate, Geometry, GeometryError, representative_point};

/// Which numeric input field was edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordField {
    Lat,
    Lng,
}

/// Result of a marker interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerUpdate {
    /// The new position was accepted.
    Moved(Coordinate),
    /// The position was refused; the marker is back at this position.
    Reverted(Coordinate),
    /// Nothing happened (unparsable edit, or a refusal with no prior position).
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct Marker {
    position: Option<Coordinate>,
    boundary: Option<Geometry>,
    /// Field values typed before the marker has a position.
    draft: Draft,
}

#[derive(Debug, Clone, Copy, Default)]
struct Draft {
    lat: Option<f64>,
    lng: Option<f64>,
}

impl Marker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn position(&self) -> Option<Coordinate> {
        self.position
    }

    #[must_use]
    pub fn boundary(&self) -> Option<&Geometry> {
        self.boundary.as_ref()
    }

    /// Confine the marker to `boundary` and move it to the representative point.
    ///
    /// # Errors
    ///
    /// Returns the kernel's error for a degenerate boundary; the marker is
    /// left untouched.
    pub fn bind(&mut self, boundary: Geometry) -> Result<Coordinate, GeometryError> {
        let at = representative_point(&boundary)?;
        self.position = Some(at);
        self.boundary = Some(boundary);
        self.draft = Draft::default();
        Ok(at)
    }

    /// Release the confinement. The marker stays where it is.
    pub fn unbind(&mut self) {
        self.boundary = None;
    }

    /// Manual drag to `to`.
    pub fn drag_to(&mut self, to: Coordinate) -> MarkerUpdate {
        let inside = self.boundary.as_ref().is_none_or(|b| b.contains(to));
        if !to.is_valid() || !inside {
            return self.revert();
        }
        self.position = Some(to);
        MarkerUpdate::Moved(to)
    }

    /// Map click. Identical acceptance rules to a drag.
    pub fn place(&mut self, at: Coordinate) -> MarkerUpdate {
        self.drag_to(at)
    }

    /// Numeric field edit. Unparsable or out-of-range input is ignored.
    ///
    /// Before the marker has a position, a single field is held until the
    /// other one arrives so the untouched field is never overwritten.
    pub fn edit_field(&mut self, field: CoordField, raw: &str) -> MarkerUpdate {
        let Ok(value) = raw.trim().parse::<f64>() else {
            return MarkerUpdate::Unchanged;
        };
        let Some(base) = self.position else {
            return self.edit_draft(field, value);
        };
        let candidate = match field {
            CoordField::Lat => Coordinate { lat: value, ..base },
            CoordField::Lng => Coordinate { lng: value, ..base },
        };
        if !candidate.is_valid() {
            return MarkerUpdate::Unchanged;
        }
        self.drag_to(candidate)
    }

    fn edit_draft(&mut self, field: CoordField, value: f64) -> MarkerUpdate {
        let alone = match field {
            CoordField::Lat => Coordinate { lat: value, lng: 0.0 },
            CoordField::Lng => Coordinate { lat: 0.0, lng: value },
        };
        if !alone.is_valid() {
            return MarkerUpdate::Unchanged;
        }
        match field {
            CoordField::Lat => self.draft.lat = Some(value),
            CoordField::Lng => self.draft.lng = Some(value),
        }
        let (Some(lat), Some(lng)) = (self.draft.lat, self.draft.lng) else {
            return MarkerUpdate::Unchanged;
        };
        self.draft = Draft::default();
        self.drag_to(Coordinate { lat, lng })
    }

    fn revert(&self) -> MarkerUpdate {
        self.position.map_or(MarkerUpdate::Unchanged, MarkerUpdate::Reverted)
    }
}
