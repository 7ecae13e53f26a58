//! Assembling the layers of a tile into one MVT payload.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};
use vectortiles_tile_utils::{TileCoord, TileData};
use xxhash_rust::xxh3::xxh3_128;

use crate::tiles::layer::VectorLayer;
use crate::tiles::{TileError, TileResult};

/// Outcome of a tile request, mapped to HTTP status codes by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    /// 200, the tile has content
    Ok,
    /// 204, nothing to draw
    NoContent,
}

impl TileStatus {
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NoContent => 204,
        }
    }
}

/// A rendered tile with the layers that could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTile {
    pub data: TileData,
    pub status: TileStatus,
    /// Ids of layers skipped because their feature source failed.
    pub failed_layers: Vec<String>,
    /// Hash of the tile data, usable as an HTTP `ETag`.
    pub etag: String,
}

impl RenderedTile {
    #[must_use]
    pub fn new(data: TileData, failed_layers: Vec<String>) -> Self {
        let status = if data.is_empty() {
            TileStatus::NoContent
        } else {
            TileStatus::Ok
        };
        let etag = if data.is_empty() {
            "0".to_string()
        } else {
            xxh3_128(&data).to_string()
        };
        Self {
            data,
            status,
            failed_layers,
            etag,
        }
    }

    /// Whether every layer contributed, making the tile safe to cache.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_layers.is_empty()
    }
}

/// Anything producing tiles for a tile coordinate.
#[async_trait]
pub trait TileRenderer: Send + Sync {
    async fn render(&self, xyz: TileCoord) -> TileResult<RenderedTile>;

    /// Identity of the rendered content: layers and data freshness markers.
    fn cache_key(&self) -> String;
}

/// Renders an ordered list of vector layers into one tile.
#[derive(Debug, Clone)]
pub struct TileAssembler {
    layers: Arc<[VectorLayer]>,
    combined: bool,
}

impl TileAssembler {
    pub fn new(layers: Vec<VectorLayer>) -> TileResult<Self> {
        if layers.is_empty() {
            return Err(TileError::NoLayersConfigured);
        }
        Ok(Self {
            layers: layers.into(),
            combined: false,
        })
    }

    /// Render all layers with one query when their backend supports it.
    #[must_use]
    pub fn with_combined(mut self, combined: bool) -> Self {
        self.combined = combined;
        self
    }

    #[must_use]
    pub fn layers(&self) -> &[VectorLayer] {
        &self.layers
    }

    fn combined_backend(&self) -> bool {
        let Some(first) = self.layers.first() else {
            return false;
        };
        let backend = first.backend();
        self.combined
            && self.layers.iter().all(|l| Arc::ptr_eq(l.backend(), backend))
            && backend.supports_combined(&self.layers)
    }
}

#[async_trait]
impl TileRenderer for TileAssembler {
    async fn render(&self, xyz: TileCoord) -> TileResult<RenderedTile> {
        xyz.bounds()?;
        if self.combined_backend() {
            let backend = self.layers[0].backend();
            debug!("Rendering {} layers of tile {xyz:#} in one query", self.layers.len());
            let data = backend.render_combined(&self.layers, xyz).await?;
            return Ok(RenderedTile::new(data, Vec::new()));
        }
        render(&self.layers, xyz).await
    }

    fn cache_key(&self) -> String {
        self.layers
            .iter()
            .map(|l| {
                let version = l.source().get_version().unwrap_or_default();
                format!("{}@{}:{version}", l.id(), l.source().get_id())
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Render `layers` in declared order and concatenate their payloads.
///
/// A layer whose feature source fails is left out and reported in
/// [`RenderedTile::failed_layers`]. Any other error fails the tile.
pub async fn render(layers: &[VectorLayer], xyz: TileCoord) -> TileResult<RenderedTile> {
    if layers.is_empty() {
        return Err(TileError::NoLayersConfigured);
    }
    xyz.bounds()?;

    let results = join_all(layers.iter().map(|layer| layer.get_tile(xyz))).await;

    let mut data = TileData::new();
    let mut failed_layers = Vec::new();
    for (layer, result) in layers.iter().zip(results) {
        match result {
            Ok(bytes) => data.extend_from_slice(&bytes),
            Err(e @ TileError::FeatureSource(..)) => {
                warn!("Skipping layer {} of tile {xyz:#}: {e}", layer.id());
                failed_layers.push(layer.id().to_string());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(RenderedTile::new(data, failed_layers))
}

/// Validate raw tile coordinates and render them.
pub async fn render_tile(
    layers: &[VectorLayer],
    z: i64,
    x: i64,
    y: i64,
) -> TileResult<RenderedTile> {
    if layers.is_empty() {
        return Err(TileError::NoLayersConfigured);
    }
    render(layers, TileCoord::try_new(z, x, y)?).await
}
