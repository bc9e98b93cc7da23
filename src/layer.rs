//! Boundary layer store: named, lazily loaded, session-cached feature layers.
//!
//! DESIGN
//! ======
//! Each layer name maps to one `LayerSlot` holding its source, visibility,
//! and load state (`NotLoaded -> Loading -> Loaded | LoadFailed`). While a
//! fetch is in flight the slot holds a `Shared` future, so every concurrent
//! `request` for that name awaits the same fetch instead of starting its
//! own. A failed load is remembered only until the next request retries it.
//!
//! The store is the only writer of cached layer data. The resolver and the
//! overlay layer read through `request`/`cached` and never mutate it.

#[cfg(test)]
#[path = "layer_test.rs"]
mod layer_test;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::geom::{BBox, Coordinate, Geometry, bbox};

// =============================================================================
// ERROR
// =============================================================================

/// A layer could not be fetched or decoded. Always retryable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    #[error("layer {layer} fetch failed: {message}")]
    Fetch { layer: String, message: String },
    #[error("layer {layer} parse failed: {message}")]
    Parse { layer: String, message: String },
    #[error("layer {layer} has no registered source")]
    Unregistered { layer: String },
}

impl ErrorCode for LayerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "E_LAYER_FETCH",
            Self::Parse { .. } => "E_LAYER_PARSE",
            Self::Unregistered { .. } => "E_LAYER_UNREGISTERED",
        }
    }

    fn retryable(&self) -> bool {
        !matches!(self, Self::Unregistered { .. })
    }
}

// =============================================================================
// GEOJSON CONTAINERS
// =============================================================================

/// A GeoJSON feature collection as delivered by loaders and converters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Accept a `FeatureCollection`, a single `Feature`, or a bare geometry.
    ///
    /// # Errors
    ///
    /// Returns the underlying deserialization error when the value matches
    /// none of those shapes.
    pub fn from_geojson(value: Value) -> Result<Self, serde_json::Error> {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("Feature") => Ok(Self { features: vec![Feature::deserialize(value)?] }),
            Some("FeatureCollection") | None => Self::deserialize(value),
            Some(_) => Ok(Self { features: vec![Feature { id: None, properties: Value::Null, geometry: value }] }),
        }
    }
}

/// A single GeoJSON feature. Geometry stays raw until a layer or upload
/// decides whether it is polygonal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub geometry: Value,
}

impl Feature {
    /// Build a feature from a typed geometry.
    #[must_use]
    pub fn new(geometry: &Geometry, properties: Value) -> Self {
        Self { id: None, properties, geometry: serde_json::to_value(geometry).unwrap_or(Value::Null) }
    }
}

// =============================================================================
// FEATURE PROPERTIES
// =============================================================================

const NAME_KEYS: &[&str] = &["name", "NAME", "Name", "llg", "LLG", "LLGNAME", "district", "DISTRICT", "DISTNAME"];
const PARENT_KEYS: &[&str] = &["district", "DISTRICT", "DISTNAME", "province", "PROVINCE", "PROVNAME", "parent"];
const PROVINCE_KEYS: &[&str] = &["province", "PROVINCE", "Province", "PROVNAME"];

/// Typed access to administrative attributes in a feature's `properties`.
///
/// Boundary datasets spell their columns differently, so each accessor
/// checks a list of common spellings in order.
pub struct FeatureProps<'a> {
    value: &'a Value,
}

impl<'a> FeatureProps<'a> {
    #[must_use]
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    /// Display name of the unit itself.
    #[must_use]
    pub fn name(&self) -> Option<&'a str> {
        self.first(NAME_KEYS, None).map(|(_, v)| v)
    }

    /// Province the unit belongs to (or is).
    #[must_use]
    pub fn province(&self) -> Option<&'a str> {
        self.first(PROVINCE_KEYS, None).map(|(_, v)| v)
    }

    /// Next administrative level up, skipping whichever column supplied the name.
    #[must_use]
    pub fn parent(&self) -> Option<&'a str> {
        let name_key = self.first(NAME_KEYS, None).map(|(k, _)| k);
        self.first(PARENT_KEYS, name_key).map(|(_, v)| v)
    }

    fn first(&self, keys: &[&'static str], skip: Option<&str>) -> Option<(&'static str, &'a str)> {
        keys.iter()
            .filter(|k| Some(**k) != skip)
            .find_map(|k| self.value.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()).map(|v| (*k, v)))
    }
}

// =============================================================================
// FEATURE IDENTITY
// =============================================================================

/// Stable identity of a feature within a layer, independent of array order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureKey(String);

impl FeatureKey {
    /// `"{layer}:{id}"` when the feature carries an id, otherwise
    /// `"{layer}:{properties}"` with properties in canonical (sorted) JSON.
    #[must_use]
    pub fn derive(layer: &str, feature: &Feature) -> Self {
        match &feature.id {
            Some(Value::String(id)) => Self(format!("{layer}:{id}")),
            Some(id) if !id.is_null() => Self(format!("{layer}:{id}")),
            _ => Self(format!("{layer}:{}", feature.properties)),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// LAYER DATA
// =============================================================================

/// A decoded polygonal feature ready for containment queries.
#[derive(Debug, Clone)]
pub struct LayerFeature {
    pub key: FeatureKey,
    pub geometry: Geometry,
    pub properties: Value,
    pub bbox: BBox,
}

impl LayerFeature {
    #[must_use]
    pub fn props(&self) -> FeatureProps<'_> {
        FeatureProps::new(&self.properties)
    }

    /// Bounding-box prefilter, then exact containment.
    #[must_use]
    pub fn contains(&self, at: Coordinate) -> bool {
        self.bbox.contains(at) && self.geometry.contains(at)
    }
}

/// A loaded layer: its polygonal features in source order.
#[derive(Debug, Clone, Default)]
pub struct LayerData {
    pub name: String,
    pub features: Vec<LayerFeature>,
}

impl LayerData {
    /// Decode a collection, dropping features that are not polygons.
    #[must_use]
    pub fn from_collection(name: &str, collection: FeatureCollection) -> Self {
        let mut features = Vec::with_capacity(collection.features.len());
        for feature in collection.features {
            let key = FeatureKey::derive(name, &feature);
            let geometry = match Geometry::from_value(&feature.geometry) {
                Ok(g) => g,
                Err(e) => {
                    debug!(layer = %name, %key, error = %e, "skipping non-polygonal feature");
                    continue;
                }
            };
            let Some(bounds) = bbox(&geometry) else {
                debug!(layer = %name, %key, "skipping empty feature");
                continue;
            };
            features.push(LayerFeature { key, geometry, properties: feature.properties, bbox: bounds });
        }
        Self { name: name.to_string(), features }
    }

    #[must_use]
    pub fn feature(&self, key: &FeatureKey) -> Option<&LayerFeature> {
        self.features.iter().find(|f| &f.key == key)
    }

    /// First feature in source order containing `at`.
    #[must_use]
    pub fn containing(&self, at: Coordinate) -> Option<&LayerFeature> {
        self.features.iter().find(|f| f.contains(at))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

// =============================================================================
// LOADER
// =============================================================================

/// Where a layer is fetched from. Interpretation belongs to the loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerSource(pub String);

impl LayerSource {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }
}

impl fmt::Display for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External collaborator that fetches a named layer. Enables mocking in tests.
#[async_trait::async_trait]
pub trait LayerLoader: Send + Sync {
    /// Fetch the raw features of a layer.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] when the source cannot be read or decoded.
    async fn load(&self, name: &str, source: &LayerSource) -> Result<FeatureCollection, LayerError>;
}

// =============================================================================
// STORE
// =============================================================================

type LoadResult = Result<Arc<LayerData>, LayerError>;
type LoadFuture = Shared<BoxFuture<'static, LoadResult>>;

enum LoadState {
    NotLoaded,
    Loading(LoadFuture),
    Loaded(Arc<LayerData>),
    LoadFailed(LayerError),
}

/// Observable load state of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    NotLoaded,
    Loading,
    Loaded,
    LoadFailed,
}

struct LayerSlot {
    source: Option<LayerSource>,
    visible: bool,
    state: LoadState,
}

impl LayerSlot {
    fn new(source: Option<LayerSource>) -> Self {
        Self { source, visible: false, state: LoadState::NotLoaded }
    }
}

/// Session-lifetime cache of boundary and overlay layers.
pub struct LayerStore {
    loader: Arc<dyn LayerLoader>,
    slots: Mutex<HashMap<String, LayerSlot>>,
}

impl LayerStore {
    #[must_use]
    pub fn new(loader: Arc<dyn LayerLoader>) -> Self {
        Self { loader, slots: Mutex::new(HashMap::new()) }
    }

    /// Record the source for a layer name. Changing the source of a layer
    /// that is not mid-fetch drops its cached data.
    pub fn register(&self, name: &str, source: LayerSource) {
        let mut slots = self.lock();
        let slot = slots.entry(name.to_string()).or_insert_with(|| LayerSlot::new(None));
        if slot.source.as_ref() == Some(&source) {
            return;
        }
        if !matches!(slot.state, LoadState::Loading(_)) {
            slot.state = LoadState::NotLoaded;
        }
        slot.source = Some(source);
    }

    /// Return the layer, fetching it at most once across concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns the loader's [`LayerError`]; the layer is then `LoadFailed`
    /// and the next request retries.
    pub async fn request(&self, name: &str, source: &LayerSource) -> LoadResult {
        let pending = {
            let mut slots = self.lock();
            let slot = slots.entry(name.to_string()).or_insert_with(|| LayerSlot::new(Some(source.clone())));
            let in_flight = match &slot.state {
                LoadState::Loaded(data) => return Ok(Arc::clone(data)),
                LoadState::Loading(fut) => Some(fut.clone()),
                LoadState::NotLoaded | LoadState::LoadFailed(_) => None,
            };
            match in_flight {
                Some(fut) => fut,
                None => {
                    let fut = self.fetch(name, source);
                    slot.state = LoadState::Loading(fut.clone());
                    fut
                }
            }
        };
        let result = pending.clone().await;
        self.settle(name, &pending, &result);
        result
    }

    /// Request a layer using its registered source.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Unregistered`] if no source was registered, or
    /// the load error.
    pub async fn request_registered(&self, name: &str) -> LoadResult {
        let source = self.source(name).ok_or_else(|| LayerError::Unregistered { layer: name.to_string() })?;
        self.request(name, &source).await
    }

    /// Cached data, only if the layer is `Loaded`. Never fetches.
    #[must_use]
    pub fn cached(&self, name: &str) -> Option<Arc<LayerData>> {
        match self.lock().get(name).map(|s| &s.state) {
            Some(LoadState::Loaded(data)) => Some(Arc::clone(data)),
            _ => None,
        }
    }

    #[must_use]
    pub fn status(&self, name: &str) -> LoadStatus {
        match self.lock().get(name).map(|s| &s.state) {
            None | Some(LoadState::NotLoaded) => LoadStatus::NotLoaded,
            Some(LoadState::Loading(_)) => LoadStatus::Loading,
            Some(LoadState::Loaded(_)) => LoadStatus::Loaded,
            Some(LoadState::LoadFailed(_)) => LoadStatus::LoadFailed,
        }
    }

    #[must_use]
    pub fn source(&self, name: &str) -> Option<LayerSource> {
        self.lock().get(name).and_then(|s| s.source.clone())
    }

    /// Flip visibility. Returns the previous value. Never fetches.
    pub fn set_visible(&self, name: &str, visible: bool) -> bool {
        let mut slots = self.lock();
        let slot = slots.entry(name.to_string()).or_insert_with(|| LayerSlot::new(None));
        std::mem::replace(&mut slot.visible, visible)
    }

    #[must_use]
    pub fn is_visible(&self, name: &str) -> bool {
        self.lock().get(name).is_some_and(|s| s.visible)
    }

    /// Names of visible layers, sorted.
    #[must_use]
    pub fn visible_layers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().iter().filter(|(_, s)| s.visible).map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    fn fetch(&self, name: &str, source: &LayerSource) -> LoadFuture {
        let loader = Arc::clone(&self.loader);
        let name = name.to_string();
        let source = source.clone();
        async move {
            info!(layer = %name, %source, "layer fetch started");
            let collection = loader.load(&name, &source).await?;
            let data = LayerData::from_collection(&name, collection);
            info!(layer = %name, features = data.len(), "layer loaded");
            Ok(Arc::new(data))
        }
        .boxed()
        .shared()
    }

    /// Move a slot out of `Loading`, unless another waiter already did.
    fn settle(&self, name: &str, pending: &LoadFuture, result: &LoadResult) {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(name) else {
            return;
        };
        let LoadState::Loading(current) = &slot.state else {
            return;
        };
        if !current.ptr_eq(pending) {
            return;
        }
        slot.state = match result {
            Ok(data) => LoadState::Loaded(Arc::clone(data)),
            Err(e) => {
                warn!(layer = %name, error = %e, "layer load failed; will retry on next request");
                LoadState::LoadFailed(e.clone())
            }
        };
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LayerSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
