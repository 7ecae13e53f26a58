//! Mapbox Vector Tile encoding and decoding.

mod commands;
mod decode;
mod error;
mod geometry_encoding;
mod tile_value;

pub use decode::{DecodedFeature, DecodedGeometry, DecodedLayer, decode_geometry, decode_tile};
pub use error::{MvtError, MvtResult};
pub use geometry_encoding::{EncodedGeometry, encode_geom};
use geozero::mvt::{Message as _, TagsBuilder, Tile, tile};
pub use tile_value::{tile_value_from_json, tile_value_to_json};
use vectortiles_tile_utils::TileData;

use crate::tiles::TileFeature;

/// Version of the vector tile specification written into every layer.
pub const MVT_VERSION: u32 = 2;

/// Incrementally builds one MVT layer, de-duplicating keys and values.
pub struct LayerBuilder {
    name: String,
    tag_builder: TagsBuilder<String>,
    features: Vec<tile::Feature>,
    extent: u32,
}

impl LayerBuilder {
    pub fn new(name: impl Into<String>, extent: u32) -> MvtResult<Self> {
        if extent == 0 {
            return Err(MvtError::InvalidExtent);
        }
        Ok(Self {
            name: name.into(),
            tag_builder: TagsBuilder::new(),
            features: Vec::new(),
            extent,
        })
    }

    /// Add one feature in tile pixel space.
    ///
    /// Returns `false` if the geometry collapsed and nothing was added.
    pub fn add_feature(&mut self, feature: &TileFeature) -> MvtResult<bool> {
        let Some(geometry) = encode_geom(&feature.geometry)? else {
            return Ok(false);
        };

        let mut tags = Vec::with_capacity(feature.attributes.len() * 2);
        for (key, value) in &feature.attributes {
            if let Some(value) = tile_value_from_json(value) {
                let (key_idx, val_idx) = self.tag_builder.insert(key.clone(), value);
                tags.push(key_idx);
                tags.push(val_idx);
            }
        }

        self.features.push(tile::Feature {
            id: feature.id,
            tags,
            r#type: Some(geometry.geom_type as i32),
            geometry: geometry.commands,
        });
        Ok(true)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[must_use]
    pub fn build(self) -> tile::Layer {
        let (keys, values) = self.tag_builder.into_tags();
        let values = values.into_iter().map(Into::into).collect();
        tile::Layer {
            name: self.name,
            features: self.features,
            version: MVT_VERSION,
            extent: Some(self.extent),
            keys,
            values,
        }
    }

    /// Serialize into a tile holding just this layer.
    ///
    /// A layer without features produces an empty payload, so that concatenating
    /// per-layer payloads never adds empty layers to a tile.
    #[must_use]
    pub fn into_tile_data(self) -> TileData {
        if self.is_empty() {
            return TileData::new();
        }
        Tile {
            layers: vec![self.build()],
        }
        .encode_to_vec()
    }
}
