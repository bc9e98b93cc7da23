//! Map session: the single owner of boundary, marker, layers, and popups.
//!
//! DESIGN
//! ======
//! The host turns UI events into method calls and applies the returned
//! `Vec<Action>`. The session never calls back into the host. All mutation
//! happens through `&mut self`, so boundary transitions are serialized: an
//! adoption that awaits location resolution completes before the next event
//! is handled.
//!
//! Popup lookups are the exception. They are started from a `HoverTicket`
//! and run without borrowing the session, so the host may keep feeding
//! pointer events while a lookup is outstanding; `apply_popup` drops the
//! result if the ticket went stale in the meantime.
//!
//! ERROR POLICY
//! ============
//! Nothing escapes as `Err`. Layer and geocode failures degrade to missing
//! metadata, conversion and geometry failures become `Action::Notify`, and
//! decision-API misuse is logged and yields no actions.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info, warn};

use crate::aoi::{AoiState, Candidate, CandidateKind, ReconcileError, Reconciler, Transition};
use crate::config::SessionConfig;
use crate::consts::{DISTRICT_LAYER, LLG_LAYER};
use crate::error::ErrorCode;
use crate::geom::{BBox, Coordinate, Geometry, bbox, validate};
use crate::layer::{FeatureCollection, FeatureKey, LayerError, LayerLoader, LayerSource, LayerStore};
use crate::marker::{CoordField, Marker, MarkerUpdate};
use crate::overlay::{self, Hover, HoverTicket, Overlay, Popup, PopupContent};
use crate::remote::{
    ClientBuildError, ConversionError, GeoJsonLoader, GeometryConverter, HttpGeometryConverter, HttpReverseGeocoder,
    LocalGeoJsonConverter,
};
use crate::resolve::{Location, LocationMetadata, LocationResolver, ReverseGeocoder};

/// Instructions for the host, in the order they should be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Persist this boundary and metadata.
    BoundarySaved { geometry: Geometry, metadata: LocationMetadata },
    /// A persisted boundary was adopted at load; display only, nothing to save.
    BoundaryLoaded { geometry: Geometry, metadata: LocationMetadata },
    BoundaryCleared,
    /// A decision closed in favour of the current boundary; redraw it in
    /// place of the discarded candidate. Nothing to save.
    BoundaryRestored { geometry: Geometry },
    /// Show the "replace saved boundary?" dialog, then call `confirm_override`.
    OverrideConfirmationRequested { incoming: CandidateKind },
    /// Ask the user to pick drawn or uploaded, then call `choose`.
    ChoiceRequested,
    MarkerMoved(Coordinate),
    /// Coordinates for the form fields, truncated for display.
    CoordinatesChanged(Coordinate),
    FitBounds(BBox),
    LayerShown { name: String },
    LayerHidden { name: String },
    PopupShown(Popup),
    PopupRemoved,
    Notify { code: &'static str, message: String },
}

impl Action {
    fn notify(error: &impl ErrorCode) -> Self {
        Self::Notify { code: error.error_code(), message: error.to_string() }
    }
}

/// Whether an adopted boundary came from the user or from persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Loaded,
    User,
}

pub struct MapSession {
    config: SessionConfig,
    store: Arc<LayerStore>,
    resolver: LocationResolver,
    converter: Arc<dyn GeometryConverter>,
    reconciler: Reconciler,
    marker: Marker,
    overlay: Overlay,
    metadata: Option<LocationMetadata>,
}

impl MapSession {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        loader: Arc<dyn LayerLoader>,
        geocoder: Arc<dyn ReverseGeocoder>,
        converter: Arc<dyn GeometryConverter>,
    ) -> Self {
        let store = Arc::new(LayerStore::new(loader));
        store.register(DISTRICT_LAYER, config.district_source.clone());
        store.register(LLG_LAYER, config.llg_source.clone());
        let resolver = LocationResolver::new(
            Arc::clone(&store),
            geocoder,
            config.district_source.clone(),
            config.llg_source.clone(),
        )
        .with_timeout(config.lookup_timeout);
        Self {
            config,
            store,
            resolver,
            converter,
            reconciler: Reconciler::new(),
            marker: Marker::new(),
            overlay: Overlay::new(),
            metadata: None,
        }
    }

    /// Build a session wired to the HTTP/file collaborators named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if an HTTP client cannot be built.
    pub fn from_config(config: SessionConfig) -> Result<Self, ClientBuildError> {
        let loader = Arc::new(GeoJsonLoader::new()?);
        let geocoder = Arc::new(HttpReverseGeocoder::new(config.geocode_url.clone(), config.lookup_timeout)?);
        let converter: Arc<dyn GeometryConverter> = match &config.convert_url {
            Some(url) => Arc::new(HttpGeometryConverter::new(url.clone(), config.lookup_timeout)?),
            None => Arc::new(LocalGeoJsonConverter),
        };
        Ok(Self::new(config, loader, geocoder, converter))
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> &AoiState {
        self.reconciler.state()
    }

    /// The boundary in force, including while a decision is pending.
    #[must_use]
    pub fn authoritative(&self) -> Option<&Candidate> {
        self.reconciler.authoritative()
    }

    /// Metadata of the authoritative boundary.
    #[must_use]
    pub fn metadata(&self) -> Option<&LocationMetadata> {
        self.metadata.as_ref()
    }

    #[must_use]
    pub fn marker_position(&self) -> Option<Coordinate> {
        self.marker.position()
    }

    #[must_use]
    pub fn popup(&self) -> Option<&Popup> {
        self.overlay.popup()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<LayerStore> {
        &self.store
    }

    // =========================================================================
    // BOUNDARY EVENTS
    // =========================================================================

    /// Initialize with a previously saved boundary.
    pub async fn load_persisted(&mut self, geometry: Geometry) -> Vec<Action> {
        self.propose(CandidateKind::Persisted, geometry, Origin::Loaded).await
    }

    /// The user finished drawing a polygon.
    pub async fn draw(&mut self, geometry: Geometry) -> Vec<Action> {
        self.propose(CandidateKind::Drawn, geometry, Origin::User).await
    }

    /// The user uploaded a geographic file. Only the first feature is used.
    pub async fn upload(&mut self, bytes: &[u8], mime: &str) -> Vec<Action> {
        let collection = match self.convert(bytes, mime).await {
            Ok(c) => c,
            Err(e) => {
                warn!(mime, error = %e, code = e.error_code(), "upload rejected");
                return vec![Action::notify(&e)];
            }
        };
        let Some(first) = collection.features.into_iter().next() else {
            return vec![Action::notify(&ConversionError::NoFeatures)];
        };
        match Geometry::from_value(&first.geometry) {
            Ok(geometry) => self.propose(CandidateKind::Uploaded, geometry, Origin::User).await,
            Err(e) => {
                warn!(mime, error = %e, "uploaded feature is not a polygon");
                vec![Action::notify(&e)]
            }
        }
    }

    /// Answer the override dialog.
    pub async fn confirm_override(&mut self, confirm: bool) -> Vec<Action> {
        let step = self.reconciler.decide_override(confirm);
        self.apply(step, Origin::User).await
    }

    /// Answer the drawn-vs-uploaded dialog.
    pub async fn choose(&mut self, kind: CandidateKind) -> Vec<Action> {
        let step = self.reconciler.choose(kind);
        self.apply(step, Origin::User).await
    }

    /// The user removed the boundary from the map.
    pub fn delete_boundary(&mut self) -> Vec<Action> {
        match self.reconciler.delete() {
            Ok(_) => self.cleared(),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "ignoring boundary event");
                Vec::new()
            }
        }
    }

    async fn propose(&mut self, kind: CandidateKind, geometry: Geometry, origin: Origin) -> Vec<Action> {
        if let Err(e) = validate(&geometry) {
            warn!(?kind, error = %e, "rejecting invalid boundary");
            return vec![Action::notify(&e)];
        }
        match self.reconciler.propose(Candidate::new(kind, geometry)) {
            Err(e @ ReconcileError::DecisionPending) => {
                warn!(?kind, "boundary arrived while a decision is pending");
                vec![Action::notify(&e)]
            }
            step => self.apply(step, origin).await,
        }
    }

    async fn convert(&self, bytes: &[u8], mime: &str) -> Result<FeatureCollection, ConversionError> {
        let conversion = self.converter.convert(bytes, mime);
        match self.config.lookup_timeout {
            Some(limit) => tokio::time::timeout(limit, conversion).await.unwrap_or_else(|_| {
                Err(ConversionError::Timeout { ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX) })
            }),
            None => conversion.await,
        }
    }

    async fn apply(&mut self, step: Result<Transition, ReconcileError>, origin: Origin) -> Vec<Action> {
        match step {
            Ok(Transition::Adopted(candidate)) => self.adopt(candidate, origin).await,
            Ok(Transition::OverrideRequested { incoming }) => {
                info!(?incoming, "override confirmation requested");
                vec![Action::OverrideConfirmationRequested { incoming }]
            }
            Ok(Transition::ChoiceRequested) => {
                info!("drawn/uploaded choice requested");
                vec![Action::ChoiceRequested]
            }
            Ok(Transition::Kept) => {
                info!("decision closed; boundary unchanged");
                self.authoritative()
                    .map(|c| Action::BoundaryRestored { geometry: c.geometry.clone() })
                    .into_iter()
                    .collect()
            }
            Ok(Transition::Cleared) => self.cleared(),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "ignoring boundary event");
                Vec::new()
            }
        }
    }

    fn cleared(&mut self) -> Vec<Action> {
        info!("boundary cleared");
        self.marker.unbind();
        self.metadata = None;
        vec![Action::BoundaryCleared]
    }

    /// Area, marker, location, and viewport for a newly authoritative boundary.
    async fn adopt(&mut self, candidate: Candidate, origin: Origin) -> Vec<Action> {
        let geometry = candidate.geometry;
        let area_sq_km = geometry.area_sq_km();
        let mut actions = Vec::with_capacity(4);

        let marker_at = match self.marker.bind(geometry.clone()) {
            Ok(at) => Some(at),
            Err(e) => {
                warn!(error = %e, "boundary has no representative point; marker not moved");
                None
            }
        };
        let location = match marker_at {
            Some(at) => self.resolver.resolve(at).await,
            None => Location::default(),
        };
        let metadata = LocationMetadata::new(location, area_sq_km);
        info!(
            kind = ?candidate.kind,
            area_sq_km,
            district = ?metadata.district,
            llg = ?metadata.llg,
            province = ?metadata.province,
            "boundary adopted"
        );

        let bounds = bbox(&geometry);
        self.metadata = Some(metadata.clone());
        actions.push(match origin {
            Origin::User => Action::BoundarySaved { geometry, metadata },
            Origin::Loaded => Action::BoundaryLoaded { geometry, metadata },
        });
        if let Some(at) = marker_at {
            actions.push(Action::MarkerMoved(at.truncated()));
            actions.push(Action::CoordinatesChanged(at.truncated()));
        }
        if let Some(bounds) = bounds {
            actions.push(Action::FitBounds(bounds));
        }
        actions
    }

    // =========================================================================
    // MARKER EVENTS
    // =========================================================================

    pub fn drag_marker(&mut self, to: Coordinate) -> Vec<Action> {
        let update = self.marker.drag_to(to);
        marker_actions(update)
    }

    /// Map click. Places the marker; never creates a boundary candidate.
    pub fn click_map(&mut self, at: Coordinate) -> Vec<Action> {
        let update = self.marker.place(at);
        marker_actions(update)
    }

    pub fn edit_coordinate(&mut self, field: CoordField, raw: &str) -> Vec<Action> {
        let update = self.marker.edit_field(field, raw);
        marker_actions(update)
    }

    // =========================================================================
    // LAYERS
    // =========================================================================

    /// Register (or re-point) a named overlay layer. Hidden until toggled on.
    pub fn add_layer(&mut self, name: &str, source: LayerSource) {
        self.store.register(name, source);
    }

    /// Hide a layer. Cached data stays for the session.
    pub fn remove_layer(&mut self, name: &str) -> Vec<Action> {
        if !self.store.set_visible(name, false) {
            return Vec::new();
        }
        let mut actions = vec![Action::LayerHidden { name: name.to_string() }];
        if self.overlay.popup().is_some_and(|p| p.layer == name) && self.overlay.leave() {
            actions.push(Action::PopupRemoved);
        }
        actions
    }

    /// Show or hide a layer. Showing loads it on first use and retries a
    /// failed load; a loaded layer is never fetched again.
    pub async fn toggle_layer(&mut self, name: &str, visible: bool) -> Vec<Action> {
        if !visible {
            return self.remove_layer(name);
        }
        if self.store.set_visible(name, true) {
            return Vec::new();
        }
        match self.store.request_registered(name).await {
            Ok(data) => {
                debug!(layer = name, features = data.len(), "layer shown");
                vec![Action::LayerShown { name: name.to_string() }]
            }
            Err(e) => {
                warn!(layer = name, error = %e, code = e.error_code(), "layer unavailable; left hidden");
                self.store.set_visible(name, false);
                Vec::new()
            }
        }
    }

    // =========================================================================
    // POPUPS
    // =========================================================================

    /// Pointer over a feature. Returns a ticket when content must be looked up.
    ///
    /// Hidden layers take no hover. While both administrative boundary
    /// layers are visible, hovering either of them shows no popup.
    pub fn hover(&mut self, layer: &str, key: FeatureKey, at: Coordinate) -> (Vec<Action>, Option<HoverTicket>) {
        if !self.store.is_visible(layer) {
            debug!(layer, "hover on hidden layer ignored");
            return (Vec::new(), None);
        }
        if self.suppressed(layer) {
            return (self.leave(), None);
        }
        match self.overlay.hover(layer, key, at) {
            Hover::Same => (Vec::new(), None),
            Hover::Started { ticket, removed } => {
                let actions = if removed { vec![Action::PopupRemoved] } else { Vec::new() };
                (actions, Some(ticket))
            }
        }
    }

    /// Pointer left the hovered feature.
    pub fn leave(&mut self) -> Vec<Action> {
        if self.overlay.leave() { vec![Action::PopupRemoved] } else { Vec::new() }
    }

    /// Detached content lookup for `ticket`. Does not borrow the session.
    #[must_use]
    pub fn popup_lookup(&self, ticket: &HoverTicket) -> BoxFuture<'static, Result<Option<PopupContent>, LayerError>> {
        let store = Arc::clone(&self.store);
        let ticket = ticket.clone();
        async move { overlay::lookup(store, &ticket).await }.boxed()
    }

    /// Apply a finished lookup. Stale tickets and failed lookups show nothing.
    pub fn apply_popup(
        &mut self,
        ticket: &HoverTicket,
        result: Result<Option<PopupContent>, LayerError>,
    ) -> Vec<Action> {
        if !self.store.is_visible(&ticket.layer) {
            debug!(layer = %ticket.layer, "layer hidden before popup lookup finished");
            return Vec::new();
        }
        match result {
            Ok(Some(content)) => match self.overlay.complete(ticket, content) {
                Some(popup) => vec![Action::PopupShown(popup.clone())],
                None => Vec::new(),
            },
            Ok(None) => {
                debug!(key = %ticket.key, layer = %ticket.layer, "hovered feature not found in layer");
                Vec::new()
            }
            Err(e) => {
                warn!(layer = %ticket.layer, error = %e, "popup lookup failed");
                Vec::new()
            }
        }
    }

    /// Hover, look up, and apply in one step.
    pub async fn hover_and_resolve(&mut self, layer: &str, key: FeatureKey, at: Coordinate) -> Vec<Action> {
        let (mut actions, ticket) = self.hover(layer, key, at);
        if let Some(ticket) = ticket {
            let result = self.popup_lookup(&ticket).await;
            actions.extend(self.apply_popup(&ticket, result));
        }
        actions
    }

    fn suppressed(&self, layer: &str) -> bool {
        (layer == DISTRICT_LAYER || layer == LLG_LAYER)
            && self.store.is_visible(DISTRICT_LAYER)
            && self.store.is_visible(LLG_LAYER)
    }
}

fn marker_actions(update: MarkerUpdate) -> Vec<Action> {
    match update {
        MarkerUpdate::Moved(at) | MarkerUpdate::Reverted(at) => {
            vec![Action::MarkerMoved(at.truncated()), Action::CoordinatesChanged(at.truncated())]
        }
        MarkerUpdate::Unchanged => Vec::new(),
    }
}
