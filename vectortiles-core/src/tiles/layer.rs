//! Vector layer configuration and the per-request feature selection built from it.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use vectortiles_tile_utils::{BoundingBox, MAX_ZOOM, TileCoord, TileData};

use crate::tiles::backend::SharedBackend;
use crate::tiles::{
    AttributeFilter, FeatureQuery, FieldRef, Properties, ResolvedFilter, SharedSource, TileError,
    TileResult, ZoomRule,
};

pub const DEFAULT_EXTENT: u32 = 4096;
pub const DEFAULT_BUFFER: u32 = 256;
pub const DEFAULT_CLIP_GEOM: bool = true;
pub const DEFAULT_MIN_ZOOM: u8 = 0;
pub const DEFAULT_MAX_ZOOM: u8 = 22;

/// What to emit as the geometry of a feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryMode {
    /// The geometry as stored in the source.
    #[default]
    Source,
    /// The centroid of the stored geometry.
    Centroid,
}

/// How to treat a feature whose geometry cannot be encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidFeaturePolicy {
    /// Fail the whole layer.
    #[default]
    Abort,
    /// Drop the feature and log a warning.
    Skip,
}

/// Immutable configuration of one vector layer.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Layer name inside the tile, unique within a tile.
    pub id: String,
    /// Id of the feature source the layer reads from.
    pub source: String,
    pub description: Option<String>,
    /// Overrides the geometry column of the source.
    pub geometry_field: Option<String>,
    /// Attributes to emit, in this order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default)]
    pub min_zoom: u8,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
    #[serde(default = "default_extent")]
    pub extent: u32,
    #[serde(default = "default_buffer")]
    pub buffer: u32,
    #[serde(default = "default_clip_geom", alias = "clip")]
    pub clip_geom: bool,
    /// Maximum number of features per tile, taken in source order after filtering.
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<AttributeFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zoom_rules: Vec<ZoomRule>,
    /// Computed attributes, usable in `fields` and filters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub derived: BTreeMap<String, FieldRef>,
    #[serde(default)]
    pub geometry: GeometryMode,
    /// Falls back to the global setting when unset.
    pub on_invalid_feature: Option<InvalidFeaturePolicy>,
    /// Attribute holding the integer feature id.
    pub id_field: Option<String>,
    /// Keys this struct does not know, reported by the config loader.
    #[serde(flatten, skip_serializing)]
    pub unrecognized: HashMap<String, Value>,
}

fn default_max_zoom() -> u8 {
    DEFAULT_MAX_ZOOM
}

fn default_extent() -> u32 {
    DEFAULT_EXTENT
}

fn default_buffer() -> u32 {
    DEFAULT_BUFFER
}

fn default_clip_geom() -> bool {
    DEFAULT_CLIP_GEOM
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            source: String::new(),
            description: None,
            geometry_field: None,
            fields: Vec::new(),
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            extent: DEFAULT_EXTENT,
            buffer: DEFAULT_BUFFER,
            clip_geom: DEFAULT_CLIP_GEOM,
            limit: None,
            filters: Vec::new(),
            zoom_rules: Vec::new(),
            derived: BTreeMap::new(),
            geometry: GeometryMode::default(),
            on_invalid_feature: None,
            id_field: None,
            unrecognized: HashMap::new(),
        }
    }
}

impl LayerConfig {
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> TileResult<()> {
        let invalid = |msg: String| Err(TileError::InvalidLayerConfig(self.id.clone(), msg));
        if self.id.is_empty() {
            return invalid("layer id must not be empty".to_string());
        }
        if self.extent == 0 {
            return invalid("extent must be greater than 0".to_string());
        }
        if self.min_zoom > self.max_zoom {
            return invalid(format!(
                "min_zoom {} is greater than max_zoom {}",
                self.min_zoom, self.max_zoom
            ));
        }
        if self.max_zoom > MAX_ZOOM {
            return invalid(format!(
                "max_zoom {} exceeds the maximum zoom {MAX_ZOOM}",
                self.max_zoom
            ));
        }
        Ok(())
    }

    /// Field expression behind an attribute name, derived or plain.
    #[must_use]
    pub fn resolve_field(&self, name: &str) -> FieldRef {
        self.derived
            .get(name)
            .cloned()
            .unwrap_or_else(|| FieldRef::column(name))
    }

    fn resolve_filters<'a>(
        &self,
        filters: impl IntoIterator<Item = &'a AttributeFilter>,
    ) -> Vec<ResolvedFilter> {
        filters
            .into_iter()
            .map(|f| ResolvedFilter {
                field: self.resolve_field(&f.field),
                op: f.op.clone(),
            })
            .collect()
    }
}

/// A named layer bound to a feature source and a geometry backend.
///
/// Read-only after construction and safe to share between concurrent requests.
#[derive(Clone)]
pub struct VectorLayer {
    config: LayerConfig,
    source: SharedSource,
    backend: SharedBackend,
    attributes: Vec<(String, FieldRef)>,
    id_field: Option<FieldRef>,
    filters: Vec<ResolvedFilter>,
}

impl Debug for VectorLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorLayer")
            .field("id", &self.config.id)
            .field("source", &self.source.get_id())
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl VectorLayer {
    pub fn new(config: LayerConfig, source: SharedSource, backend: SharedBackend) -> TileResult<Self> {
        config.validate()?;
        if config.source != source.get_id() {
            return Err(TileError::UnknownSource(
                config.id.clone(),
                config.source.clone(),
            ));
        }
        let attributes = config
            .fields
            .iter()
            .map(|name| (name.clone(), config.resolve_field(name)))
            .collect();
        let id_field = config.id_field.as_deref().map(|f| config.resolve_field(f));
        let filters = config.resolve_filters(&config.filters);
        Ok(Self {
            config,
            source,
            backend,
            attributes,
            id_field,
            filters,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.config.description.as_deref()
    }

    #[must_use]
    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    #[must_use]
    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    #[must_use]
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    #[must_use]
    pub fn min_zoom(&self) -> u8 {
        self.config.min_zoom
    }

    #[must_use]
    pub fn max_zoom(&self) -> u8 {
        self.config.max_zoom
    }

    #[must_use]
    pub fn is_valid_zoom(&self, zoom: u8) -> bool {
        (self.min_zoom()..=self.max_zoom()).contains(&zoom)
    }

    #[must_use]
    pub fn extent(&self) -> u32 {
        self.config.extent
    }

    #[must_use]
    pub fn buffer(&self) -> u32 {
        self.config.buffer
    }

    #[must_use]
    pub fn clip(&self) -> bool {
        self.config.clip_geom
    }

    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.config.limit
    }

    #[must_use]
    pub fn geometry_mode(&self) -> GeometryMode {
        self.config.geometry
    }

    #[must_use]
    pub fn invalid_feature_policy(&self) -> InvalidFeaturePolicy {
        self.config.on_invalid_feature.unwrap_or_default()
    }

    /// Output attribute names with their expressions, in declared order.
    #[must_use]
    pub fn attribute_fields(&self) -> &[(String, FieldRef)] {
        &self.attributes
    }

    #[must_use]
    pub fn id_field(&self) -> Option<&FieldRef> {
        self.id_field.as_ref()
    }

    /// Envelope used for clipping: the tile bounds grown by the layer buffer.
    pub fn clip_bounds(&self, xyz: TileCoord) -> TileResult<BoundingBox> {
        Ok(xyz.bounds()?.expand_pixels(self.buffer(), self.extent()))
    }

    /// Filters in effect at `zoom`: the layer filters followed by those of matching zoom rules.
    #[must_use]
    pub fn query_filters(&self, zoom: u8) -> Vec<ResolvedFilter> {
        let mut filters = self.filters.clone();
        for rule in self.config.zoom_rules.iter().filter(|r| r.applies_to(zoom)) {
            filters.extend(self.config.resolve_filters(&rule.filters));
        }
        filters
    }

    /// Build the feature selection for one tile.
    ///
    /// The spatial predicate is the unbuffered tile envelope. Layer filters apply at
    /// every zoom, filters of zoom rules only where their range contains `xyz.z`.
    pub fn query_for(&self, xyz: TileCoord) -> TileResult<FeatureQuery> {
        let bbox = xyz.bounds()?;
        let filters = self.query_filters(xyz.z);
        debug!(
            "Layer {} selects features in {bbox} with {} filters at zoom {}",
            self.id(),
            filters.len(),
            xyz.z
        );
        Ok(FeatureQuery {
            bbox: Some(bbox),
            geometry_field: self.config.geometry_field.clone(),
            filters,
            limit: self.limit(),
        })
    }

    /// Attributes to emit for a feature, in declared order.
    #[must_use]
    pub fn attributes(&self, properties: &Properties) -> Vec<(String, Value)> {
        self.attributes
            .iter()
            .map(|(name, field)| (name.clone(), field.evaluate(properties)))
            .collect()
    }

    /// Feature id from the configured id field, or the id known to the source.
    #[must_use]
    pub fn feature_id(&self, source_id: Option<u64>, properties: &Properties) -> Option<u64> {
        let Some(field) = &self.id_field else {
            return source_id;
        };
        match field.evaluate(properties) {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Encoded contribution of this layer to a tile. Empty outside the zoom range.
    pub async fn get_tile(&self, xyz: TileCoord) -> TileResult<TileData> {
        if !self.is_valid_zoom(xyz.z) {
            debug!(
                "Layer {} is not visible at zoom {} ({}..={})",
                self.id(),
                xyz.z,
                self.min_zoom(),
                self.max_zoom()
            );
            return Ok(TileData::new());
        }
        self.backend.render_layer(self, xyz).await
    }
}
