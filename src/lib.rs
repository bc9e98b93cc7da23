//! Area-of-interest engine for permit boundary maps.
//!
//! This crate owns everything between raw map events and the permit form:
//! validating drawn or uploaded boundary polygons, arbitrating between
//! competing boundaries, deriving district/province/LLG context from
//! administrative boundary layers, and keeping the location marker and
//! overlay popups consistent with the chosen boundary. The host UI layer
//! only wires events into [`session::MapSession`] and applies the returned
//! [`session::Action`]s.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`session`] | Top-level [`session::MapSession`] and the action list |
//! | [`aoi`] | Candidate boundaries and the reconciliation state machine |
//! | [`geom`] | Coordinates, GeoJSON geometry, containment and area |
//! | [`layer`] | Lazily loaded boundary/overlay layers and their cache |
//! | [`resolve`] | District/LLG/province lookup for a coordinate |
//! | [`marker`] | Marker position confined to the boundary |
//! | [`overlay`] | Hover popups with stale-response cancellation |
//! | [`remote`] | HTTP/file implementations of the external collaborators |
//! | [`config`] | Session configuration from environment variables |
//! | [`error`] | Shared error-code trait |
//! | [`consts`] | Shared numeric constants and layer names |

pub mod aoi;
pub mod config;
pub mod consts;
pub mod error;
pub mod geom;
pub mod layer;
pub mod marker;
pub mod overlay;
pub mod remote;
pub mod resolve;
pub mod session;
