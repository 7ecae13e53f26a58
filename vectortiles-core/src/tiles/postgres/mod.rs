//! `PostGIS`-backed feature sources and geometry backend.

mod errors;
pub use errors::{PostgresError, PostgresResult};

mod pool;
pub use pool::{POOL_SIZE_DEFAULT, PostgresPool};

pub mod query;

mod source;
pub use source::PostgresTableSource;

mod backend;
pub use backend::PostgisBackend;
