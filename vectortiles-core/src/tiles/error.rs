use std::path::PathBuf;

use vectortiles_tile_utils::TileCoordError;

use crate::tiles::mvt::MvtError;

/// Errors raised by a [`FeatureSource`](crate::tiles::FeatureSource) while listing features.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("Unable to read {path}: {err}", path = .1.display(), err = .0)]
    IoError(#[source] std::io::Error, PathBuf),

    #[error("Unable to parse GeoJSON in {1}: {0}")]
    GeoJsonError(#[source] Box<geojson::Error>, String),

    #[error("Feature {1} of source {0} has no usable geometry")]
    MissingGeometry(String, usize),

    #[error("Source {0} uses SRID {1}, only 4326 and 3857 can be reprojected in-process")]
    UnsupportedSrid(String, i32),

    /// Errors that can occur while talking to `PostgreSQL`.
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] crate::tiles::postgres::PostgresError),
}

/// Errors that can occur while producing a tile.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum TileError {
    #[error(transparent)]
    InvalidCoordinate(#[from] TileCoordError),

    #[error("Feature source {1} failed while rendering layer {2}: {0}")]
    FeatureSource(#[source] SourceError, String, String),

    #[error("No vector layers are configured")]
    NoLayersConfigured,

    #[error("Unable to encode layer {1}: {0}")]
    Encoding(#[source] MvtError, String),

    #[error("Invalid configuration of layer {0}: {1}")]
    InvalidLayerConfig(String, String),

    #[error("Layer {0} refers to unknown source {1}")]
    UnknownSource(String, String),

    #[error("Layers {0} cannot be rendered in one query: {1}")]
    CombinedQueryUnsupported(String, String),
}

/// A convenience [`Result`] for tile generation.
pub type TileResult<T> = Result<T, TileError>;

pub type SourceResult<T> = Result<T, SourceError>;
