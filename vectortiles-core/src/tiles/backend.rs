//! Geometry backends turn the features of a layer into tile pixel space.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use vectortiles_tile_utils::{TileCoord, TileData, pixel_length};

use crate::tiles::geometry::{SIMPLIFICATION_TILE_SIZE, centroid, clip, quantize, simplify};
use crate::tiles::layer::{GeometryMode, InvalidFeaturePolicy, VectorLayer};
use crate::tiles::mvt::LayerBuilder;
use crate::tiles::{TileError, TileFeature, TileResult};

/// Strategy used to select, transform and clip the features of a layer.
#[async_trait]
pub trait GeometryBackend: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Features of `layer` for one tile, in tile pixel space and source order,
    /// each with the layer's attributes in declared order.
    async fn prepare_features(
        &self,
        layer: &VectorLayer,
        xyz: TileCoord,
    ) -> TileResult<Vec<TileFeature>>;

    /// Encoded MVT layer for one tile. Empty if nothing is left to draw.
    async fn render_layer(&self, layer: &VectorLayer, xyz: TileCoord) -> TileResult<TileData> {
        let features = self.prepare_features(layer, xyz).await?;
        encode_features(layer, &features)
    }

    /// Whether all `layers` can be rendered with [`Self::render_combined`].
    fn supports_combined(&self, _layers: &[VectorLayer]) -> bool {
        false
    }

    /// Render several layers with a single request to the feature store.
    ///
    /// Any error fails the whole tile.
    async fn render_combined(
        &self,
        layers: &[VectorLayer],
        _xyz: TileCoord,
    ) -> TileResult<TileData> {
        Err(TileError::CombinedQueryUnsupported(
            layer_ids(layers),
            format!("the {} backend renders layers one by one", self.name()),
        ))
    }
}

pub type SharedBackend = Arc<dyn GeometryBackend>;

pub(crate) fn layer_ids(layers: &[VectorLayer]) -> String {
    layers
        .iter()
        .map(VectorLayer::id)
        .collect::<Vec<_>>()
        .join(",")
}

/// Encode prepared features as one MVT layer, honoring the layer's invalid feature policy.
pub fn encode_features(layer: &VectorLayer, features: &[TileFeature]) -> TileResult<TileData> {
    let mut builder = LayerBuilder::new(layer.id(), layer.extent())
        .map_err(|e| TileError::Encoding(e, layer.id().to_string()))?;
    let mut collapsed = 0;
    for (idx, feature) in features.iter().enumerate() {
        match builder.add_feature(feature) {
            Ok(true) => {}
            Ok(false) => collapsed += 1,
            Err(e) if layer.invalid_feature_policy() == InvalidFeaturePolicy::Skip => {
                warn!("Skipping feature {idx} of layer {}: {e}", layer.id());
            }
            Err(e) => return Err(TileError::Encoding(e, layer.id().to_string())),
        }
    }
    if collapsed > 0 {
        debug!(
            "{collapsed} features of layer {} collapsed to nothing",
            layer.id()
        );
    }
    Ok(builder.into_tile_data())
}

/// Backend that lists candidate features and processes their geometries in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessBackend;

#[async_trait]
impl GeometryBackend for InProcessBackend {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn prepare_features(
        &self,
        layer: &VectorLayer,
        xyz: TileCoord,
    ) -> TileResult<Vec<TileFeature>> {
        if !layer.is_valid_zoom(xyz.z) {
            return Ok(Vec::new());
        }
        let query = layer.query_for(xyz)?;
        let source = layer.source();
        let features = source.list(&query).await.map_err(|e| {
            TileError::FeatureSource(e, source.get_id().to_string(), layer.id().to_string())
        })?;

        let tile_bounds = xyz.bounds()?;
        let clip_bounds = layer.clip_bounds(xyz)?;
        let tolerance = pixel_length(xyz.z, SIMPLIFICATION_TILE_SIZE);

        let prepared: Vec<TileFeature> = features
            .into_iter()
            .filter_map(|feature| {
                let geometry = match layer.geometry_mode() {
                    GeometryMode::Source => feature.geometry,
                    GeometryMode::Centroid => centroid(&feature.geometry)?,
                };
                let geometry = simplify(geometry, tolerance);
                let geometry = if layer.clip() {
                    clip(geometry, &clip_bounds)?
                } else {
                    geometry
                };
                Some(TileFeature {
                    id: layer.feature_id(feature.id, &feature.properties),
                    geometry: quantize(&geometry, &tile_bounds, layer.extent()),
                    attributes: layer.attributes(&feature.properties),
                })
            })
            .collect();

        debug!(
            "Prepared {} features of layer {} for tile {xyz:#}",
            prepared.len(),
            layer.id()
        );
        Ok(prepared)
    }
}

#[cfg(test)]
mod tests {
    use geo::{Geometry, GeometryCollection, point, polygon};
    use serde_json::json;

    use super::*;
    use crate::tiles::layer::LayerConfig;
    use crate::tiles::mvt::{DecodedGeometry, decode_tile};
    use crate::tiles::source::tests::StaticSource;
    use crate::tiles::{Feature, Properties};

    fn props(value: serde_json::Value) -> Properties {
        value.as_object().cloned().unwrap_or_default()
    }

    fn layer_with(config: LayerConfig, features: Vec<Feature>) -> VectorLayer {
        let source = Arc::new(StaticSource::new(&config.source, features));
        VectorLayer::new(config, source, Arc::new(InProcessBackend)).unwrap()
    }

    #[tokio::test]
    async fn test_prepare_quantizes_and_selects_fields() {
        let config = LayerConfig {
            fields: vec!["name".to_string()],
            ..LayerConfig::new("points", "src")
        };
        let layer = layer_with(
            config,
            vec![Feature::new(point!(x: 0.0, y: 0.0), props(json!({"name": "a", "other": 1})))],
        );
        let features = InProcessBackend
            .prepare_features(&layer, TileCoord { z: 0, x: 0, y: 0 })
            .await
            .unwrap();
        assert_eq!(
            features,
            vec![TileFeature {
                id: None,
                geometry: point!(x: 2048, y: 2048).into(),
                attributes: vec![("name".to_string(), json!("a"))],
            }]
        );
    }

    #[tokio::test]
    async fn test_clip_to_buffer() {
        // a square spanning the whole world, rendered into the north-west tile of zoom 1
        let world = 20_000_000.0;
        let square = polygon![
            (x: -world, y: -world),
            (x: world, y: -world),
            (x: world, y: world),
            (x: -world, y: world),
        ];
        let config = LayerConfig {
            buffer: 64,
            ..LayerConfig::new("areas", "src")
        };
        let layer = layer_with(config, vec![Feature::new(square, Properties::new())]);
        let features = InProcessBackend
            .prepare_features(&layer, TileCoord { z: 1, x: 0, y: 0 })
            .await
            .unwrap();
        let Geometry::Polygon(poly) = &features[0].geometry else {
            panic!("polygon expected");
        };
        let xs: Vec<i32> = poly.exterior().coords().map(|c| c.x).collect();
        let ys: Vec<i32> = poly.exterior().coords().map(|c| c.y).collect();
        assert_eq!(xs.iter().max(), Some(&(4096 + 64)));
        assert_eq!(ys.iter().max(), Some(&(4096 + 64)));
        assert!(xs.iter().min().is_some_and(|x| *x > -64));
    }

    #[tokio::test]
    async fn test_encoding_policy() {
        let collection: Geometry<f64> =
            Geometry::GeometryCollection(GeometryCollection(vec![point!(x: 0.0, y: 0.0).into()]));
        let features = vec![
            Feature::new(collection, Properties::new()),
            Feature::new(point!(x: 0.0, y: 0.0), Properties::new()),
        ];
        let xyz = TileCoord { z: 0, x: 0, y: 0 };

        let strict = layer_with(LayerConfig::new("strict", "src"), features.clone());
        assert!(matches!(
            strict.get_tile(xyz).await,
            Err(TileError::Encoding(_, id)) if id == "strict"
        ));

        let lenient = LayerConfig {
            on_invalid_feature: Some(InvalidFeaturePolicy::Skip),
            ..LayerConfig::new("lenient", "src")
        };
        let lenient = layer_with(lenient, features);
        let data = lenient.get_tile(xyz).await.unwrap();
        let layers = decode_tile(&data).unwrap();
        assert_eq!(layers[0].features.len(), 1);
        assert_eq!(
            layers[0].features[0].geometry,
            DecodedGeometry::Point(vec![[2048, 2048]])
        );
    }

    #[tokio::test]
    async fn test_centroid_mode() {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1000.0, y: 0.0),
            (x: 1000.0, y: 1000.0),
            (x: 0.0, y: 1000.0),
        ];
        let config = LayerConfig {
            geometry: GeometryMode::Centroid,
            ..LayerConfig::new("labels", "src")
        };
        let layer = layer_with(config, vec![Feature::new(square, Properties::new())]);
        let features = InProcessBackend
            .prepare_features(&layer, TileCoord { z: 0, x: 0, y: 0 })
            .await
            .unwrap();
        assert!(matches!(features[0].geometry, Geometry::Point(_)));
    }

    #[tokio::test]
    async fn test_source_error() {
        let source = Arc::new(StaticSource::failing("broken"));
        let layer = VectorLayer::new(
            LayerConfig::new("points", "broken"),
            source,
            Arc::new(InProcessBackend),
        )
        .unwrap();
        let err = layer.get_tile(TileCoord { z: 0, x: 0, y: 0 }).await.unwrap_err();
        assert!(matches!(err, TileError::FeatureSource(_, src, layer) if src == "broken" && layer == "points"));
    }
}
