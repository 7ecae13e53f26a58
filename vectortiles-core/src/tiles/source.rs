use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::tiles::{Feature, FeatureQuery, SourceResult};

/// Table metadata of sources backed by a `PostgreSQL` table.
///
/// Geometry backends that push work into the database build their SQL from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub schema: String,
    pub table: String,
    pub geometry_column: String,
    pub srid: i32,
}

/// Core trait for feature stores a vector layer reads from.
///
/// Implementors must be side-effect free: listing the same query twice against
/// unchanged data yields the same features in the same order.
#[async_trait]
pub trait FeatureSource: Send + Sync + Debug {
    /// Unique source identifier.
    fn get_id(&self) -> &str;

    /// SRID the features are stored in.
    fn srid(&self) -> i32;

    /// List features matching the query. Geometries are returned in Web Mercator.
    async fn list(&self, query: &FeatureQuery) -> SourceResult<Vec<Feature>>;

    /// Table backing this source, if any.
    fn table(&self) -> Option<&TableInfo> {
        None
    }

    /// A data freshness marker. When it changes, cached tiles built from this source are stale.
    fn get_version(&self) -> Option<String> {
        None
    }
}

/// Shared feature source trait object.
pub type SharedSource = Arc<dyn FeatureSource>;
