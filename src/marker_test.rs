#![allow(clippy::float_cmp)]

use super::*;
use crate::geom::Polygon;

fn square(lng: f64, lat: f64, half: f64) -> Geometry {
    Geometry::Polygon(Polygon::new(vec![vec![
        [lng - half, lat - half],
        [lng + half, lat - half],
        [lng + half, lat + half],
        [lng - half, lat + half],
        [lng - half, lat - half],
    ]]))
}

fn at(lat: f64, lng: f64) -> Coordinate {
    Coordinate { lat, lng }
}

fn bound() -> Marker {
    let mut m = Marker::new();
    m.bind(square(147.0, -6.0, 0.1)).unwrap();
    m
}

// =============================================================
// bind / unbind
// =============================================================

#[test]
fn new_marker_has_no_position() {
    let m = Marker::new();
    assert!(m.position().is_none());
    assert!(m.boundary().is_none());
}

#[test]
fn bind_moves_to_representative_point() {
    let mut m = Marker::new();
    let p = m.bind(square(147.0, -6.0, 0.1)).unwrap();
    assert!((p.lat - -6.0).abs() < 1e-12);
    assert!((p.lng - 147.0).abs() < 1e-12);
    assert_eq!(m.position(), Some(p));
    assert!(m.boundary().is_some());
}

#[test]
fn bind_degenerate_boundary_leaves_marker_alone() {
    let mut m = bound();
    let before = m.position();
    let flat = Geometry::Polygon(Polygon::new(vec![vec![[0.0, 0.0], [1.0, 0.0], [0.0, 0.0], [1.0, 0.0]]]));
    assert_eq!(m.bind(flat), Err(GeometryError::Degenerate));
    assert_eq!(m.position(), before);
}

#[test]
fn unbind_keeps_position() {
    let mut m = bound();
    let before = m.position();
    m.unbind();
    assert!(m.boundary().is_none());
    assert_eq!(m.position(), before);
}

// =============================================================
// drag
// =============================================================

#[test]
fn drag_inside_boundary_is_accepted() {
    let mut m = bound();
    assert_eq!(m.drag_to(at(-6.05, 147.05)), MarkerUpdate::Moved(at(-6.05, 147.05)));
    assert_eq!(m.position(), Some(at(-6.05, 147.05)));
}

#[test]
fn drag_outside_boundary_reverts_to_last_valid() {
    let mut m = bound();
    m.drag_to(at(-6.05, 147.05));
    let update = m.drag_to(at(-7.0, 147.0));
    assert_eq!(update, MarkerUpdate::Reverted(at(-6.05, 147.05)));
    assert_eq!(m.position(), Some(at(-6.05, 147.05)));
}

#[test]
fn drag_without_boundary_is_free() {
    let mut m = Marker::new();
    assert_eq!(m.drag_to(at(10.0, 20.0)), MarkerUpdate::Moved(at(10.0, 20.0)));
    assert_eq!(m.place(at(-30.0, 40.0)), MarkerUpdate::Moved(at(-30.0, 40.0)));
}

#[test]
fn drag_to_invalid_coordinate_is_refused() {
    let mut m = Marker::new();
    assert_eq!(m.drag_to(at(100.0, 0.0)), MarkerUpdate::Unchanged);
    m.place(at(1.0, 1.0));
    assert_eq!(m.drag_to(at(f64::NAN, 0.0)), MarkerUpdate::Reverted(at(1.0, 1.0)));
}

#[test]
fn place_with_boundary_is_confined() {
    let mut m = bound();
    let before = m.position().unwrap();
    assert_eq!(m.place(at(0.0, 0.0)), MarkerUpdate::Reverted(before));
}

// =============================================================
// field edits
// =============================================================

#[test]
fn edit_field_moves_marker_inside_boundary() {
    let mut m = bound();
    assert_eq!(m.edit_field(CoordField::Lat, " -6.02 "), MarkerUpdate::Moved(at(-6.02, 147.0)));
    assert_eq!(m.edit_field(CoordField::Lng, "147.03"), MarkerUpdate::Moved(at(-6.02, 147.03)));
}

#[test]
fn edit_field_outside_boundary_reverts() {
    let mut m = bound();
    let before = m.position().unwrap();
    assert_eq!(m.edit_field(CoordField::Lng, "150"), MarkerUpdate::Reverted(before));
    assert_eq!(m.position(), Some(before));
}

#[test]
fn edit_field_ignores_unparsable_input() {
    let mut m = bound();
    let before = m.position();
    assert_eq!(m.edit_field(CoordField::Lat, "abc"), MarkerUpdate::Unchanged);
    assert_eq!(m.edit_field(CoordField::Lat, ""), MarkerUpdate::Unchanged);
    assert_eq!(m.edit_field(CoordField::Lat, "NaN"), MarkerUpdate::Unchanged);
    assert_eq!(m.edit_field(CoordField::Lat, "95"), MarkerUpdate::Unchanged);
    assert_eq!(m.position(), before);
}

#[test]
fn edit_field_without_position_waits_for_both_fields() {
    let mut m = Marker::new();
    assert_eq!(m.edit_field(CoordField::Lat, "-6.000003"), MarkerUpdate::Unchanged);
    assert_eq!(m.position(), None);
    assert_eq!(m.edit_field(CoordField::Lng, "147.25"), MarkerUpdate::Moved(at(-6.000003, 147.25)));
}

#[test]
fn edit_field_without_position_ignores_out_of_range_half() {
    let mut m = Marker::new();
    assert_eq!(m.edit_field(CoordField::Lat, "95"), MarkerUpdate::Unchanged);
    assert_eq!(m.edit_field(CoordField::Lng, "147.0"), MarkerUpdate::Unchanged);
    assert_eq!(m.edit_field(CoordField::Lat, "-6.0"), MarkerUpdate::Moved(at(-6.0, 147.0)));
}
