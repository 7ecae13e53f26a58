use deadpool_postgres::tokio_postgres::Error as TokioPgError;
use deadpool_postgres::{BuildError, PoolError};
use semver::Version;
use vectortiles_tile_utils::TileCoord;

/// Result type for `PostgreSQL` operations.
pub type PostgresResult<T> = Result<T, PostgresError>;

/// Errors that can occur while talking to `PostgreSQL`.
#[derive(thiserror::Error, Debug)]
pub enum PostgresError {
    #[error("Postgres error while {1}: {0}")]
    PostgresError(#[source] TokioPgError, &'static str),

    #[error("Unable to build a Postgres connection pool {1}: {0}")]
    PostgresPoolBuildError(#[source] BuildError, String),

    #[error("Unable to get a Postgres connection from the pool {1}: {0}")]
    PostgresPoolConnError(#[source] PoolError, String),

    #[error("Unable to parse connection string {1}: {0}")]
    BadConnectionString(#[source] TokioPgError, String),

    #[error("Unable to parse PostGIS version {1}: {0}")]
    BadPostgisVersion(#[source] semver::Error, String),

    #[error("Unable to parse PostgreSQL version {1}: {0}")]
    BadPostgresVersion(#[source] semver::Error, String),

    #[error("PostGIS version {0} is too old, minimum required is {1}")]
    PostgisTooOld(Version, Version),

    #[error("PostgreSQL version {0} is too old, minimum required is {1}")]
    PostgresqlTooOld(Version, Version),

    #[error("Error preparing a query for {1}: {2} {0}")]
    PrepareQueryError(#[source] TokioPgError, String, String),

    #[error("Unable to get tile {2:#} from {1}: {0}")]
    GetTileError(#[source] TokioPgError, String, TileCoord),

    #[error("Unable to list features of {1}: {0}")]
    ListFeaturesError(#[source] TokioPgError, String),

    #[error("Table {0} returned a geometry that is not valid GeoJSON: {1}")]
    InvalidGeometry(String, #[source] Box<geojson::Error>),
}
