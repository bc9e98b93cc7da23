//! Hover popups for boundary and third-party overlay layers.
//!
//! DESIGN
//! ======
//! Popup content is resolved asynchronously, so a slow lookup for a feature
//! the pointer has already left must never overwrite the popup of the
//! feature it is on now. Every hover of a new feature and every leave bumps
//! a monotonic sequence number; a lookup result is applied only if its
//! ticket still carries the current number. Hovering the same feature again
//! is a no-op, which keeps the popup steady under pointer jitter.
//!
//! At most one popup exists across all layers.

#[cfg(test)]
#[path = "overlay_test.rs"]
mod overlay_test;

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::geom::Coordinate;
use crate::layer::{FeatureKey, LayerError, LayerFeature, LayerStore};

/// Display attributes shown in a popup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupContent {
    pub name: String,
    pub parent: Option<String>,
    pub area_sq_km: f64,
}

impl PopupContent {
    #[must_use]
    pub fn for_feature(feature: &LayerFeature) -> Self {
        let props = feature.props();
        Self {
            name: props.name().map_or_else(|| feature.key.to_string(), str::to_owned),
            parent: props.parent().map(str::to_owned),
            area_sq_km: feature.geometry.area_sq_km(),
        }
    }
}

/// A visible popup anchored at the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub layer: String,
    pub key: FeatureKey,
    pub anchor: Coordinate,
    pub content: PopupContent,
}

/// Claim on the popup slot for one hover. Stale once superseded.
#[derive(Debug, Clone, PartialEq)]
pub struct HoverTicket {
    seq: u64,
    pub layer: String,
    pub key: FeatureKey,
    pub anchor: Coordinate,
}

impl HoverTicket {
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Result of a hover event.
#[derive(Debug, Clone, PartialEq)]
pub enum Hover {
    /// Still on the same feature; nothing to do.
    Same,
    /// A new feature: look up content for `ticket`. `removed` is true when a
    /// stale popup was taken down.
    Started { ticket: HoverTicket, removed: bool },
}

#[derive(Debug, Default)]
pub struct Overlay {
    seq: u64,
    hovered: Option<(String, FeatureKey)>,
    popup: Option<Popup>,
}

impl Overlay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer entered (or moved within) a feature.
    pub fn hover(&mut self, layer: &str, key: FeatureKey, anchor: Coordinate) -> Hover {
        if self.hovered.as_ref().is_some_and(|(l, k)| l == layer && *k == key) {
            return Hover::Same;
        }
        self.seq += 1;
        self.hovered = Some((layer.to_string(), key.clone()));
        let removed = self.popup.take().is_some();
        Hover::Started { ticket: HoverTicket { seq: self.seq, layer: layer.to_string(), key, anchor }, removed }
    }

    /// Pointer left the hovered feature. Returns true if a popup was removed.
    pub fn leave(&mut self) -> bool {
        self.seq += 1;
        self.hovered = None;
        self.popup.take().is_some()
    }

    #[must_use]
    pub fn is_current(&self, ticket: &HoverTicket) -> bool {
        ticket.seq == self.seq
    }

    /// Apply lookup results. Returns the new popup, or `None` if the ticket is stale.
    pub fn complete(&mut self, ticket: &HoverTicket, content: PopupContent) -> Option<&Popup> {
        if !self.is_current(ticket) {
            debug!(seq = ticket.seq, current = self.seq, key = %ticket.key, "discarding stale popup content");
            return None;
        }
        self.popup = Some(Popup {
            layer: ticket.layer.clone(),
            key: ticket.key.clone(),
            anchor: ticket.anchor,
            content,
        });
        self.popup.as_ref()
    }

    #[must_use]
    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }
}

/// Resolve popup content for a ticket. Runs detached from the overlay so
/// several lookups may be in flight; only the current one gets applied.
///
/// # Errors
///
/// Returns the store's [`LayerError`] if the layer cannot be loaded.
pub async fn lookup(store: Arc<LayerStore>, ticket: &HoverTicket) -> Result<Option<PopupContent>, LayerError> {
    let data = store.request_registered(&ticket.layer).await?;
    Ok(data.feature(&ticket.key).map(PopupContent::for_feature))
}
