use async_trait::async_trait;
use deadpool_postgres::tokio_postgres::Row;
use deadpool_postgres::tokio_postgres::types::{ToSql, Type};
use geo::Geometry;
use serde_json::Value;
use tracing::{debug, warn};

use crate::tiles::postgres::PostgresError::{InvalidGeometry, ListFeaturesError, PrepareQueryError};
use crate::tiles::postgres::query::table_list_query;
use crate::tiles::postgres::{PostgresPool, PostgresResult};
use crate::tiles::source::TableInfo;
use crate::tiles::{Feature, FeatureQuery, FeatureSource, SourceResult};

/// Features of one `PostGIS` table, queried live.
#[derive(Clone, Debug)]
pub struct PostgresTableSource {
    id: String,
    info: TableInfo,
    pool: PostgresPool,
}

impl PostgresTableSource {
    #[must_use]
    pub fn new(id: impl Into<String>, info: TableInfo, pool: PostgresPool) -> Self {
        Self {
            id: id.into(),
            info,
            pool,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PostgresPool {
        &self.pool
    }

    fn format_id(&self) -> String {
        format!("{}.{}.{}", self.info.schema, self.info.table, self.info.geometry_column)
    }
}

/// Convert one row of [`table_list_query`] (or a features query) into a feature.
///
/// Rows without geometry yield `None`.
pub(crate) fn row_to_feature(row: &Row, origin: &str) -> PostgresResult<Option<Feature>> {
    let Some(geom) = row.get::<_, Option<Value>>("geom") else {
        return Ok(None);
    };
    let geometry = geojson::Geometry::from_json_value(geom)
        .and_then(Geometry::<f64>::try_from)
        .map_err(|e| InvalidGeometry(origin.to_string(), Box::new(e)))?;
    let properties = match row.get::<_, Option<Value>>("properties") {
        Some(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    Ok(Some(Feature {
        id: None,
        geometry,
        properties,
    }))
}

#[async_trait]
impl FeatureSource for PostgresTableSource {
    fn get_id(&self) -> &str {
        &self.id
    }

    fn srid(&self) -> i32 {
        self.info.srid
    }

    async fn list(&self, query: &FeatureQuery) -> SourceResult<Vec<Feature>> {
        let sql = table_list_query(
            &self.info,
            query.geometry_field.as_deref(),
            query.bbox.is_some(),
            &query.filters,
            query.limit,
        );
        let conn = self.pool.get().await?;

        let bbox = query
            .bbox
            .map(|b| [b.xmin, b.ymin, b.xmax, b.ymax])
            .unwrap_or_default();
        let types: &[Type] = if query.bbox.is_some() {
            &[Type::FLOAT8, Type::FLOAT8, Type::FLOAT8, Type::FLOAT8]
        } else {
            &[]
        };
        let params: Vec<&(dyn ToSql + Sync)> = if query.bbox.is_some() {
            bbox.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
        } else {
            Vec::new()
        };

        let stmt = conn
            .prepare_typed_cached(&sql, types)
            .await
            .map_err(|e| PrepareQueryError(e, self.format_id(), sql.clone()))?;
        debug!("SQL: {sql} [{:?}]", query.bbox);
        let rows = conn
            .query(&stmt, &params)
            .await
            .map_err(|e| ListFeaturesError(e, self.format_id()))?;

        let origin = self.format_id();
        let mut features = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_feature(row, &origin)? {
                Some(feature) => features.push(feature),
                None => warn!("Skipping a row of {origin} without geometry"),
            }
        }
        Ok(features)
    }

    fn table(&self) -> Option<&TableInfo> {
        Some(&self.info)
    }
}
