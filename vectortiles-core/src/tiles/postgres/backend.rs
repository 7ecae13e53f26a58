use async_trait::async_trait;
use deadpool_postgres::tokio_postgres::types::{ToSql, Type};
use geo::{Coord, Geometry, MapCoords as _};
use tracing::debug;
use vectortiles_tile_utils::{TileCoord, TileData};

use crate::tiles::backend::{GeometryBackend, InProcessBackend, layer_ids};
use crate::tiles::layer::VectorLayer;
use crate::tiles::postgres::PostgresError::{GetTileError, PrepareQueryError};
use crate::tiles::postgres::query::{combined_mvt_query, layer_features_query, layer_mvt_query};
use crate::tiles::postgres::source::row_to_feature;
use crate::tiles::postgres::{PostgresError, PostgresPool};
use crate::tiles::source::TableInfo;
use crate::tiles::{SourceError, TileError, TileFeature, TileResult};

/// Backend pushing selection, transformation, clipping and encoding into `PostGIS`.
///
/// Layers whose source is not a table are delegated to the [`InProcessBackend`].
#[derive(Clone, Debug)]
pub struct PostgisBackend {
    pool: PostgresPool,
}

impl PostgisBackend {
    #[must_use]
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    /// Run a tile query returning a single `bytea` value.
    async fn query_tile(&self, sql: &str, xyz: TileCoord, label: &str) -> Result<TileData, PostgresError> {
        let conn = self.pool.get().await?;
        let stmt = conn
            .prepare_typed_cached(sql, &[Type::INT2, Type::INT8, Type::INT8])
            .await
            .map_err(|e| PrepareQueryError(e, label.to_string(), sql.to_string()))?;
        debug!("SQL: {sql} [{xyz}]");
        let tile = conn
            .query_opt(&stmt, &tile_params(xyz).each())
            .await
            .map_err(|e| GetTileError(e, label.to_string(), xyz))?
            .and_then(|row| row.get::<_, Option<TileData>>(0))
            .unwrap_or_default();
        Ok(tile)
    }
}

/// Query parameters `$1..$3` of a tile.
struct TileParams {
    z: i16,
    x: i64,
    y: i64,
}

impl TileParams {
    fn each(&self) -> [&(dyn ToSql + Sync); 3] {
        [&self.z, &self.x, &self.y]
    }
}

fn tile_params(xyz: TileCoord) -> TileParams {
    TileParams {
        z: i16::from(xyz.z),
        x: i64::from(xyz.x),
        y: i64::from(xyz.y),
    }
}

fn source_error(layer: &VectorLayer, e: PostgresError) -> TileError {
    TileError::FeatureSource(
        SourceError::from(e),
        layer.source().get_id().to_string(),
        layer.id().to_string(),
    )
}

fn table_of(layer: &VectorLayer) -> Option<&TableInfo> {
    layer.source().table()
}

#[async_trait]
impl GeometryBackend for PostgisBackend {
    fn name(&self) -> &'static str {
        "postgis"
    }

    async fn prepare_features(
        &self,
        layer: &VectorLayer,
        xyz: TileCoord,
    ) -> TileResult<Vec<TileFeature>> {
        if !layer.is_valid_zoom(xyz.z) {
            return Ok(Vec::new());
        }
        let Some(table) = table_of(layer) else {
            return InProcessBackend.prepare_features(layer, xyz).await;
        };
        xyz.bounds()?;

        let sql = layer_features_query(layer, table, xyz.z);
        let conn = self.pool.get().await.map_err(|e| source_error(layer, e))?;
        let stmt = conn
            .prepare_typed_cached(&sql, &[Type::INT2, Type::INT8, Type::INT8])
            .await
            .map_err(|e| source_error(layer, PrepareQueryError(e, layer.id().to_string(), sql.clone())))?;
        debug!("SQL: {sql} [{xyz}]");
        let rows = conn
            .query(&stmt, &tile_params(xyz).each())
            .await
            .map_err(|e| source_error(layer, GetTileError(e, layer.id().to_string(), xyz)))?;

        let mut features = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(feature) = row_to_feature(row, layer.id()).map_err(|e| source_error(layer, e))?
            else {
                continue;
            };
            features.push(TileFeature {
                id: layer.feature_id(None, &feature.properties),
                geometry: to_pixels(&feature.geometry),
                attributes: layer.attributes(&feature.properties),
            });
        }
        Ok(features)
    }

    async fn render_layer(&self, layer: &VectorLayer, xyz: TileCoord) -> TileResult<TileData> {
        if !layer.is_valid_zoom(xyz.z) {
            return Ok(TileData::new());
        }
        let Some(table) = table_of(layer) else {
            return InProcessBackend.render_layer(layer, xyz).await;
        };
        xyz.bounds()?;
        let sql = layer_mvt_query(layer, table, xyz.z);
        self.query_tile(&sql, xyz, layer.id())
            .await
            .map_err(|e| source_error(layer, e))
    }

    fn supports_combined(&self, layers: &[VectorLayer]) -> bool {
        !layers.is_empty() && layers.iter().all(|l| table_of(l).is_some())
    }

    async fn render_combined(
        &self,
        layers: &[VectorLayer],
        xyz: TileCoord,
    ) -> TileResult<TileData> {
        let ids = layer_ids(layers);
        let mut visible = Vec::with_capacity(layers.len());
        for layer in layers {
            let Some(table) = table_of(layer) else {
                return Err(TileError::CombinedQueryUnsupported(
                    ids,
                    format!("layer {} is not backed by a table", layer.id()),
                ));
            };
            if layer.is_valid_zoom(xyz.z) {
                visible.push((layer, table));
            }
        }
        xyz.bounds()?;
        if visible.is_empty() {
            return Ok(TileData::new());
        }
        let sql = combined_mvt_query(visible, xyz.z);
        self.query_tile(&sql, xyz, &ids).await.map_err(|e| {
            TileError::FeatureSource(SourceError::from(e), self.pool.get_id().to_string(), ids)
        })
    }
}

/// `ST_AsMVTGeom` output is already in tile pixels.
fn to_pixels(geom: &Geometry<f64>) -> Geometry<i32> {
    geom.map_coords(|Coord { x, y }| Coord {
        x: x.round() as i32,
        y: y.round() as i32,
    })
}
