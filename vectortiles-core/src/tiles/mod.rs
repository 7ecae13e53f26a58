//! Tile generation: feature sources, geometry backends, vector layers and the assembler.
//!
//! A tile request flows through these parts:
//! - [`VectorLayer::query_for`] turns a tile address into a [`FeatureQuery`]
//! - a [`FeatureSource`] lists matching features
//! - a [`GeometryBackend`] brings them into tile pixel space
//! - the [`mvt`] codec encodes each layer
//! - the [`TileAssembler`] concatenates the layers into one payload

/// Mapbox Vector Tile encoding and decoding.
pub mod mvt;

mod error;
pub use error::{SourceError, SourceResult, TileError, TileResult};

mod feature;
pub use feature::{Feature, Properties, TileFeature};

mod query;
pub use query::{
    AttributeFilter, Cast, FeatureQuery, FieldExpr, FieldRef, FilterOp, ResolvedFilter, ZoomRule,
};

mod source;
pub use source::{FeatureSource, SharedSource, TableInfo};

/// Geometry processing done in-process.
pub mod geometry;

mod memory;
pub use memory::MemorySource;

mod layer;
pub use layer::{
    DEFAULT_BUFFER, DEFAULT_CLIP_GEOM, DEFAULT_EXTENT, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM,
    GeometryMode, InvalidFeaturePolicy, LayerConfig, VectorLayer,
};

mod backend;
pub use backend::{GeometryBackend, InProcessBackend, SharedBackend, encode_features};

#[cfg(feature = "postgres")]
/// `PostGIS` feature sources and geometry backend.
pub mod postgres;

mod assembler;
pub use assembler::{RenderedTile, TileAssembler, TileRenderer, TileStatus, render, render_tile};

mod cache;
pub use cache::{CachedRenderer, TileCache};

mod tilejson;
pub use tilejson::{TileJsonOverrides, tilejson_for_layers};
