use std::path::PathBuf;

pub type ConfigFileResult<T> = Result<T, ConfigFileError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigFileError {
    #[error("Unable to load config file {1}: {0}")]
    ConfigLoadError(#[source] std::io::Error, PathBuf),

    #[error("Unable to parse config file {1}: {0}")]
    ConfigParseError(#[source] subst::yaml::Error, PathBuf),

    #[error("No layers configured. Add at least one entry to 'layers' in the config file.")]
    NoLayers,

    #[error("Layer {0} refers to source {1}, which is not defined in 'sources'")]
    UnknownSource(String, String),

    #[error("Layer id {0} is used more than once")]
    DuplicateLayer(String),

    #[error("Source {0} is a table, which needs the postgis backend")]
    TableNeedsPostgis(String),

    #[error("The postgres pool_size must be greater than or equal to 1")]
    PostgresPoolSizeInvalid,

    #[error(
        "A postgres connection string must be provided in 'postgres.connection_string' or the DATABASE_URL environment variable"
    )]
    PostgresConnectionStringMissing,

    #[cfg(not(feature = "postgres"))]
    #[error("The postgis backend requires the 'postgres' feature")]
    PostgresNotEnabled,

    #[cfg(feature = "postgres")]
    #[error("Failed to create postgres pool: {0}")]
    PostgresPoolCreationFailed(#[source] vectortiles_core::tiles::postgres::PostgresError),

    #[error("Unable to load source {1}: {0}")]
    SourceLoadError(#[source] vectortiles_core::tiles::SourceError, String),

    #[error(transparent)]
    InvalidLayer(#[from] vectortiles_core::tiles::TileError),
}
