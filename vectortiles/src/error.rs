use std::io;
use std::path::PathBuf;

use vectortiles_core::tiles::TileError;
use vectortiles_core::tiles::mvt::MvtError;

use crate::config::ConfigFileError;

/// A convenience [`Result`] for the vectortiles binary.
pub type VectorTilesResult<T> = Result<T, VectorTilesError>;

#[derive(thiserror::Error, Debug)]
pub enum VectorTilesError {
    #[error(transparent)]
    ConfigFileError(#[from] ConfigFileError),

    #[error(transparent)]
    TileError(#[from] TileError),

    #[error("Unable to decode tile {1}: {0}")]
    DecodeError(#[source] MvtError, PathBuf),

    #[error("Invalid tile address '{0}', expected z/x/y")]
    BadTileAddress(String),

    #[error("Unable to read {1}: {0}")]
    ReadError(#[source] io::Error, PathBuf),

    #[error("Unable to write {1}: {0}")]
    WriteError(#[source] io::Error, PathBuf),

    #[error("Unable to write to stdout: {0}")]
    StdoutError(#[source] io::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}
