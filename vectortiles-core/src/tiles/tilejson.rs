use serde::{Deserialize, Serialize};
use tilejson::{TileJSON, VectorLayer as TileJsonLayer};

use crate::tiles::layer::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, VectorLayer};
use crate::tiles::query::Cast;

/// Document-level values that take precedence over what the layers declare.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileJsonOverrides {
    pub name: Option<String>,
    pub description: Option<String>,
    pub attribution: Option<String>,
    pub minzoom: Option<u8>,
    pub maxzoom: Option<u8>,
}

/// Describe `layers` as a `TileJSON` document served from `tile_url`.
///
/// The zoom range is the override when set, otherwise the union of the layer ranges.
#[must_use]
pub fn tilejson_for_layers(
    layers: &[VectorLayer],
    tile_url: &str,
    overrides: &TileJsonOverrides,
) -> TileJSON {
    let mut tilejson = tilejson::tilejson! {
        tiles: vec![tile_url.to_string()]
    };
    tilejson.name.clone_from(&overrides.name);
    tilejson.description.clone_from(&overrides.description);
    tilejson.attribution.clone_from(&overrides.attribution);
    tilejson.minzoom = Some(overrides.minzoom.unwrap_or_else(|| {
        layers
            .iter()
            .map(VectorLayer::min_zoom)
            .min()
            .unwrap_or(DEFAULT_MIN_ZOOM)
    }));
    tilejson.maxzoom = Some(overrides.maxzoom.unwrap_or_else(|| {
        layers
            .iter()
            .map(VectorLayer::max_zoom)
            .max()
            .unwrap_or(DEFAULT_MAX_ZOOM)
    }));
    tilejson.vector_layers = Some(layers.iter().map(vector_layer).collect());
    tilejson
}

fn vector_layer(layer: &VectorLayer) -> TileJsonLayer {
    TileJsonLayer {
        id: layer.id().to_string(),
        fields: layer
            .attribute_fields()
            .iter()
            .map(|(name, field)| {
                // the type of an uncast attribute is unknown
                let kind = match field.cast {
                    Some(Cast::Float | Cast::Integer) => "Number",
                    Some(Cast::Text) => "String",
                    None => "",
                };
                (name.clone(), kind.to_string())
            })
            .collect(),
        description: layer.description().map(ToString::to_string),
        minzoom: Some(layer.min_zoom()),
        maxzoom: Some(layer.max_zoom()),
        other: Default::default(),
    }
}
