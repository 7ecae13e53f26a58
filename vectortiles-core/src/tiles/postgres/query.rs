//! SQL generation for table-backed layers.
//!
//! All queries take the tile as `$1` (zoom, `INT2`), `$2` (x, `INT8`) and `$3` (y, `INT8`).

use postgres_protocol::escape::{escape_identifier, escape_literal};
use serde_json::Value;

use crate::tiles::layer::{GeometryMode, VectorLayer};
use crate::tiles::query::{Cast, FieldExpr, FieldRef, FilterOp, ResolvedFilter};
use crate::tiles::source::TableInfo;

const TILE_ENVELOPE: &str = "ST_TileEnvelope($1::integer, $2::integer, $3::integer)";

/// SQL expression reading an attribute.
#[must_use]
pub fn field_sql(field: &FieldRef) -> String {
    let base = match &field.expr {
        FieldExpr::Column(column) => escape_identifier(column),
        FieldExpr::JsonKey { column, key } => {
            format!("{}->>{}", escape_identifier(column), escape_literal(key))
        }
    };
    match (field.cast, &field.expr) {
        (None, FieldExpr::Column(_)) => base,
        (None, FieldExpr::JsonKey { .. }) => format!("({base})"),
        (Some(Cast::Float), _) => guarded_cast(&base, FLOAT_PATTERN, "double precision"),
        (Some(Cast::Integer), _) => guarded_cast(&base, INTEGER_PATTERN, "bigint"),
        (Some(Cast::Text), _) => format!("({base})::text"),
    }
}

/// Text accepted by a `float` cast, the same forms Rust's `f64` parser takes.
const FLOAT_PATTERN: &str = "^[-+]?([0-9]+[.]?[0-9]*|[.][0-9]+)([eE][-+]?[0-9]+)?$";
/// Text accepted by an `integer` cast, short enough to never overflow `bigint`.
const INTEGER_PATTERN: &str = "^[-+]?[0-9]{1,18}$";

/// Numeric cast yielding `NULL` for values that do not parse, instead of failing the query.
/// Booleans become 0 or 1.
fn guarded_cast(base: &str, pattern: &str, sql_type: &str) -> String {
    let text = format!("btrim(({base})::text)");
    format!(
        "CASE WHEN {text} ~ '{pattern}' THEN {text}::{sql_type} \
         WHEN {text} IN ('true', 'false') THEN ({text} = 'true')::integer::{sql_type} END"
    )
}

/// Spatial predicate of the tile query: index-assisted envelope overlap, then an exact test.
fn intersects_sql(column: &str, envelope: &str) -> String {
    format!("{column} && {envelope}\n    AND ST_Intersects({column}, {envelope})")
}

/// Quoted literal, left for `PostgreSQL` to coerce to the type of the compared expression.
fn literal_sql(value: &Value) -> String {
    match value {
        Value::String(s) => escape_literal(s),
        other => escape_literal(&other.to_string()),
    }
}

fn literal_list(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter(|v| !v.is_null())
        .map(literal_sql)
        .collect()
}

/// SQL predicate of one filter. `NULL` attributes never match.
#[must_use]
pub fn filter_sql(filter: &ResolvedFilter) -> String {
    let field = field_sql(&filter.field);
    match &filter.op {
        FilterOp::Eq(Value::Null) => "FALSE".to_string(),
        FilterOp::NotEq(Value::Null) => format!("{field} IS NOT NULL"),
        FilterOp::Eq(value) => format!("{field} = {}", literal_sql(value)),
        FilterOp::NotEq(value) => format!("{field} <> {}", literal_sql(value)),
        FilterOp::In(values) => {
            let values = literal_list(values);
            if values.is_empty() {
                "FALSE".to_string()
            } else {
                format!("{field} IN ({})", values.join(", "))
            }
        }
        FilterOp::NotIn(values) => {
            let values = literal_list(values);
            if values.is_empty() {
                format!("{field} IS NOT NULL")
            } else {
                format!("{field} NOT IN ({})", values.join(", "))
            }
        }
        FilterOp::Contains(value) => format!(
            "({field})::jsonb @> {}::jsonb",
            escape_literal(&value.to_string())
        ),
    }
}

/// `AND`-joined predicates, each prefixed with ` AND ` so it can follow a spatial predicate.
fn filters_sql(filters: &[ResolvedFilter]) -> String {
    filters
        .iter()
        .map(|f| format!(" AND {}", filter_sql(f)))
        .collect()
}

fn limit_sql(limit: Option<usize>) -> String {
    limit.map_or(String::new(), |v| format!("\n  LIMIT {v}"))
}

fn geometry_column<'a>(layer: &'a VectorLayer, table: &'a TableInfo) -> &'a str {
    layer
        .config()
        .geometry_field
        .as_deref()
        .unwrap_or(&table.geometry_column)
}

fn source_geometry(layer: &VectorLayer, column: &str) -> String {
    let geom = format!("ST_CurveToLine({column}::geometry)");
    match layer.geometry_mode() {
        GeometryMode::Source => geom,
        GeometryMode::Centroid => format!("ST_Centroid({geom})"),
    }
}

/// Inner `SELECT` producing tile-space geometries of a layer, plus the extra output columns.
fn tile_geometry_select(layer: &VectorLayer, table: &TableInfo, columns: &str, zoom: u8) -> String {
    let column = escape_identifier(geometry_column(layer, table));
    let geom = source_geometry(layer, &column);
    let extent = layer.extent();
    let buffer = layer.buffer();
    let clip_geom = layer.clip();
    let srid = table.srid;
    let schema = escape_identifier(&table.schema);
    let name = escape_identifier(&table.table);
    let spatial = intersects_sql(&column, &format!("ST_Transform({TILE_ENVELOPE}, {srid})"));
    let filters = filters_sql(&layer.query_filters(zoom));
    let limit = limit_sql(layer.limit());
    format!(
        r"SELECT
    ST_AsMVTGeom(
        ST_Transform({geom}, 3857),
        {TILE_ENVELOPE},
        {extent}, {buffer}, {clip_geom}
    ) AS geom{columns}
  FROM
    {schema}.{name} AS t
  WHERE
    {spatial}{filters}{limit}"
    )
}

/// Query encoding a layer with `ST_AsMVT`. It returns one `bytea`, empty when no feature matched.
#[must_use]
pub fn layer_mvt_query(layer: &VectorLayer, table: &TableInfo, zoom: u8) -> String {
    let mut columns: String = layer
        .attribute_fields()
        .iter()
        .map(|(name, field)| format!(",\n    {} AS {}", field_sql(field), escape_identifier(name)))
        .collect();
    let id_name = if let Some(field) = layer.id_field() {
        columns.push_str(&format!(
            ",\n    ({})::bigint AS {}",
            field_sql(field),
            escape_identifier(FEATURE_ID_COLUMN)
        ));
        format!(", {}", escape_literal(FEATURE_ID_COLUMN))
    } else {
        String::new()
    };
    let layer_id = escape_literal(layer.id());
    let extent = layer.extent();
    let select = tile_geometry_select(layer, table, &columns, zoom);
    format!(
        r"SELECT
  ST_AsMVT(tile, {layer_id}, {extent}, 'geom'{id_name})
FROM (
  {select}
) AS tile"
    )
}

/// Name of the temporary column holding the feature id in [`layer_mvt_query`].
const FEATURE_ID_COLUMN: &str = "__feature_id";

/// Query returning tile-space geometries as `GeoJSON` and all row attributes as a JSON object.
#[must_use]
pub fn layer_features_query(layer: &VectorLayer, table: &TableInfo, zoom: u8) -> String {
    let column = escape_literal(geometry_column(layer, table));
    let properties = format!(",\n    to_jsonb(t) - {column} AS properties");
    let select = tile_geometry_select(layer, table, &properties, zoom);
    format!(
        r"SELECT ST_AsGeoJSON(tile.geom)::json AS geom, tile.properties
FROM (
  {select}
) AS tile
WHERE tile.geom IS NOT NULL"
    )
}

/// All layers in one query. Each layer contributes a complete MVT layer, so the bytes concatenate.
#[must_use]
pub fn combined_mvt_query<'a>(
    layers: impl IntoIterator<Item = (&'a VectorLayer, &'a TableInfo)>,
    zoom: u8,
) -> String {
    let parts: Vec<String> = layers
        .into_iter()
        .map(|(layer, table)| format!("({})", layer_mvt_query(layer, table, zoom)))
        .collect();
    if parts.is_empty() {
        return "SELECT ''::bytea".to_string();
    }
    format!("SELECT {}", parts.join(" || "))
}

/// Query listing features of a table, transformed to Web Mercator.
///
/// The bounding box, when present, is bound as `$1..$4` (`FLOAT8`).
#[must_use]
pub fn table_list_query(
    table: &TableInfo,
    geometry_field: Option<&str>,
    with_bbox: bool,
    filters: &[ResolvedFilter],
    limit: Option<usize>,
) -> String {
    let raw_column = geometry_field.unwrap_or(&table.geometry_column);
    let column = escape_identifier(raw_column);
    let schema = escape_identifier(&table.schema);
    let name = escape_identifier(&table.table);
    let srid = table.srid;
    let bbox = if with_bbox {
        intersects_sql(
            &column,
            &format!("ST_Transform(ST_MakeEnvelope($1, $2, $3, $4, 3857), {srid})"),
        )
    } else {
        "TRUE".to_string()
    };
    let filters = filters_sql(filters);
    let limit = limit_sql(limit);
    let raw_column = escape_literal(raw_column);
    format!(
        r"SELECT
    ST_AsGeoJSON(ST_Transform(ST_CurveToLine({column}::geometry), 3857))::json AS geom,
    to_jsonb(t) - {raw_column} AS properties
  FROM
    {schema}.{name} AS t
  WHERE
    {bbox}{filters}{limit}"
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::tiles::InProcessBackend;
    use crate::tiles::layer::LayerConfig;
    use crate::tiles::source::tests::StaticSource;

    fn table() -> TableInfo {
        TableInfo {
            schema: "public".to_string(),
            table: "trees".to_string(),
            geometry_column: "geom".to_string(),
            srid: 4326,
        }
    }

    fn layer(config: serde_json::Value) -> VectorLayer {
        let config: LayerConfig = serde_json::from_value(config).unwrap();
        let source = Arc::new(StaticSource::new(&config.source, vec![]));
        VectorLayer::new(config, source, Arc::new(InProcessBackend)).unwrap()
    }

    #[test]
    fn test_filter_sql() {
        let date = FieldRef::column("date");
        let f = |op| filter_sql(&ResolvedFilter { field: date.clone(), op });
        insta::assert_snapshot!(f(FilterOp::Eq(json!("2020-07-07"))), @r#""date" = '2020-07-07'"#);
        insta::assert_snapshot!(f(FilterOp::NotEq(json!(5))), @r#""date" <> '5'"#);
        insta::assert_snapshot!(f(FilterOp::In(vec![json!("a"), json!(null), json!(true)])), @r#""date" IN ('a', 'true')"#);
        insta::assert_snapshot!(f(FilterOp::In(vec![])), @"FALSE");
        insta::assert_snapshot!(f(FilterOp::NotIn(vec![])), @r#""date" IS NOT NULL"#);
        insta::assert_snapshot!(f(FilterOp::Eq(Value::Null)), @"FALSE");

        let kind = FieldRef {
            expr: FieldExpr::JsonKey {
                column: "properties".to_string(),
                key: "it's".to_string(),
            },
            cast: Some(Cast::Float),
        };
        insta::assert_snapshot!(field_sql(&kind), @r#"CASE WHEN btrim(("properties"->>'it''s')::text) ~ '^[-+]?([0-9]+[.]?[0-9]*|[.][0-9]+)([eE][-+]?[0-9]+)?$' THEN btrim(("properties"->>'it''s')::text)::double precision WHEN btrim(("properties"->>'it''s')::text) IN ('true', 'false') THEN (btrim(("properties"->>'it''s')::text) = 'true')::integer::double precision END"#);
        let count = FieldRef {
            expr: FieldExpr::Column("count".to_string()),
            cast: Some(Cast::Integer),
        };
        insta::assert_snapshot!(field_sql(&count), @r#"CASE WHEN btrim(("count")::text) ~ '^[-+]?[0-9]{1,18}$' THEN btrim(("count")::text)::bigint WHEN btrim(("count")::text) IN ('true', 'false') THEN (btrim(("count")::text) = 'true')::integer::bigint END"#);
        let contains = ResolvedFilter {
            field: FieldRef::column("properties"),
            op: FilterOp::Contains(json!({"kind": "tree"})),
        };
        insta::assert_snapshot!(filter_sql(&contains), @r#"("properties")::jsonb @> '{"kind":"tree"}'::jsonb"#);
    }

    #[test]
    fn test_layer_mvt_query() {
        let layer = layer(json!({
            "id": "trees",
            "source": "src",
            "fields": ["name", "height"],
            "buffer": 64,
            "limit": 1000,
            "filters": [{"field": "date", "eq": "2020-07-07"}],
            "derived": {"height": {"expr": {"column": "properties", "key": "height"}, "cast": "float"}},
            "id_field": "gid",
        }));
        let expected = indoc! {r#"
            SELECT
              ST_AsMVT(tile, 'trees', 4096, 'geom', '__feature_id')
            FROM (
              SELECT
                ST_AsMVTGeom(
                    ST_Transform(ST_CurveToLine("geom"::geometry), 3857),
                    ST_TileEnvelope($1::integer, $2::integer, $3::integer),
                    4096, 64, true
                ) AS geom,
                "name" AS "name",
                CASE WHEN btrim(("properties"->>'height')::text) ~ '^[-+]?([0-9]+[.]?[0-9]*|[.][0-9]+)([eE][-+]?[0-9]+)?$' THEN btrim(("properties"->>'height')::text)::double precision WHEN btrim(("properties"->>'height')::text) IN ('true', 'false') THEN (btrim(("properties"->>'height')::text) = 'true')::integer::double precision END AS "height",
                ("gid")::bigint AS "__feature_id"
              FROM
                "public"."trees" AS t
              WHERE
                "geom" && ST_Transform(ST_TileEnvelope($1::integer, $2::integer, $3::integer), 4326)
                AND ST_Intersects("geom", ST_Transform(ST_TileEnvelope($1::integer, $2::integer, $3::integer), 4326)) AND "date" = '2020-07-07'
              LIMIT 1000
            ) AS tile"#};
        assert_eq!(layer_mvt_query(&layer, &table(), 10), expected);
    }

    #[test]
    fn test_layer_features_query() {
        let layer = layer(json!({
            "id": "trees",
            "source": "src",
            "geometry": "centroid",
            "clip_geom": false,
            "geometry_field": "location",
        }));
        let expected = indoc! {r#"
            SELECT ST_AsGeoJSON(tile.geom)::json AS geom, tile.properties
            FROM (
              SELECT
                ST_AsMVTGeom(
                    ST_Transform(ST_Centroid(ST_CurveToLine("location"::geometry)), 3857),
                    ST_TileEnvelope($1::integer, $2::integer, $3::integer),
                    4096, 256, false
                ) AS geom,
                to_jsonb(t) - 'location' AS properties
              FROM
                "public"."trees" AS t
              WHERE
                "location" && ST_Transform(ST_TileEnvelope($1::integer, $2::integer, $3::integer), 4326)
                AND ST_Intersects("location", ST_Transform(ST_TileEnvelope($1::integer, $2::integer, $3::integer), 4326))
            ) AS tile
            WHERE tile.geom IS NOT NULL"#};
        assert_eq!(layer_features_query(&layer, &table(), 3), expected);
    }

    #[test]
    fn test_combined_query() {
        let a = layer(json!({"id": "a", "source": "src"}));
        let b = layer(json!({"id": "b", "source": "src"}));
        let table = table();
        let sql = combined_mvt_query([(&a, &table), (&b, &table)], 0);
        assert!(sql.starts_with("SELECT (SELECT\n  ST_AsMVT(tile, 'a'"));
        assert!(sql.contains(") AS tile) || (SELECT\n  ST_AsMVT(tile, 'b'"));
        assert_eq!(
            combined_mvt_query(Vec::<(&VectorLayer, &TableInfo)>::new(), 0),
            "SELECT ''::bytea"
        );
    }

    #[test]
    fn test_table_list_query() {
        let filters = vec![ResolvedFilter {
            field: FieldRef::column("date"),
            op: FilterOp::Eq(json!("2020-07-07")),
        }];
        let expected = indoc! {r#"
            SELECT
                ST_AsGeoJSON(ST_Transform(ST_CurveToLine("geom"::geometry), 3857))::json AS geom,
                to_jsonb(t) - 'geom' AS properties
              FROM
                "public"."trees" AS t
              WHERE
                "geom" && ST_Transform(ST_MakeEnvelope($1, $2, $3, $4, 3857), 4326)
                AND ST_Intersects("geom", ST_Transform(ST_MakeEnvelope($1, $2, $3, $4, 3857), 4326)) AND "date" = '2020-07-07'
              LIMIT 5"#};
        assert_eq!(table_list_query(&table(), None, true, &filters, Some(5)), expected);

        let sql = table_list_query(&table(), None, false, &[], None);
        assert!(sql.ends_with("WHERE\n    TRUE"));
    }
}
