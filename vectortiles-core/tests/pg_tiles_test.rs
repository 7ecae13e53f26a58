#![cfg(feature = "test-pg")]

use std::sync::Arc;

use indoc::indoc;
use pretty_assertions::assert_eq;
use serde_json::json;
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::runners::AsyncRunner as _;
use testcontainers_modules::testcontainers::{ContainerAsync, ImageExt as _};
use vectortiles_core::tiles::mvt::{DecodedGeometry, decode_tile};
use vectortiles_core::tiles::postgres::{PostgisBackend, PostgresPool, PostgresTableSource};
use vectortiles_core::tiles::{
    AttributeFilter, FeatureQuery, FeatureSource as _, FilterOp, GeometryBackend as _, LayerConfig,
    SharedBackend, TableInfo, TileAssembler, TileRenderer as _, TileStatus, VectorLayer,
};
use vectortiles_tile_utils::TileCoord;

const ZERO: TileCoord = TileCoord { z: 0, x: 0, y: 0 };

const FIXTURE: &str = indoc! {"
    CREATE TABLE points (
        gid serial PRIMARY KEY,
        name text,
        date text,
        geom geometry(Geometry, 4326)
    );
    INSERT INTO points (name, date, geom) VALUES
        ('feat1', '2024-05-01', ST_SetSRID(ST_MakePoint(0, 0), 4326)),
        ('feat2', '2024-05-02', ST_SetSRID(ST_MakeLine(ST_MakePoint(0, 0), ST_MakePoint(1, 1)), 4326)),
        ('feat3', '2024-05-01', ST_SetSRID(ST_MakePoint(10, 10), 4326));
    CREATE TABLE crossing (
        gid serial PRIMARY KEY,
        name text,
        geom geometry(Geometry, 3857)
    );
    INSERT INTO crossing (name, geom) VALUES
        ('diagonal', ST_SetSRID(ST_MakeLine(ST_MakePoint(-15000000, 5000000), ST_MakePoint(5000000, -15000000)), 3857)),
        ('ne', ST_SetSRID(ST_MakePoint(5000000, 5000000), 3857));
"};

async fn start_db() -> (ContainerAsync<Postgres>, PostgresPool) {
    let node = Postgres::default()
        .with_name("postgis/postgis")
        .with_tag("17-3.5")
        .start()
        .await
        .expect("container launched");
    let conn_str = format!(
        "postgres://postgres:postgres@{}:{}/postgres",
        node.get_host().await.unwrap(),
        node.get_host_port_ipv4(5432).await.unwrap()
    );
    let pool = PostgresPool::new(&conn_str, 2).await.expect("pool created");
    pool.get()
        .await
        .unwrap()
        .batch_execute(FIXTURE)
        .await
        .expect("fixture loaded");
    (node, pool)
}

fn table_layer(pool: &PostgresPool, backend: &SharedBackend, config: LayerConfig) -> VectorLayer {
    let info = TableInfo {
        schema: "public".to_string(),
        table: "points".to_string(),
        geometry_column: "geom".to_string(),
        srid: 4326,
    };
    layer_on(pool, backend, config, info)
}

fn layer_on(
    pool: &PostgresPool,
    backend: &SharedBackend,
    config: LayerConfig,
    info: TableInfo,
) -> VectorLayer {
    let source = PostgresTableSource::new(config.source.clone(), info, pool.clone());
    VectorLayer::new(config, Arc::new(source), backend.clone()).unwrap()
}

#[tokio::test]
async fn postgis_tiles() {
    let (_node, pool) = start_db().await;
    let backend: SharedBackend = Arc::new(PostgisBackend::new(pool.clone()));

    let config = LayerConfig {
        fields: vec!["name".to_string()],
        filters: vec![AttributeFilter::new(
            "name",
            FilterOp::In(vec![json!("feat1"), json!("feat2")]),
        )],
        ..LayerConfig::new("points", "points")
    };
    let layer = table_layer(&pool, &backend, config);
    let data = layer.get_tile(ZERO).await.unwrap();
    let decoded = decode_tile(&data).unwrap();
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].name, "points");
    assert_eq!(decoded[0].version, 2);
    assert_eq!(decoded[0].extent, 4096);
    assert_eq!(decoded[0].features.len(), 2);
    assert_eq!(
        decoded[0].features[0].geometry,
        DecodedGeometry::Point(vec![[2048, 2048]])
    );
    assert_eq!(decoded[0].features[1].properties.get("name"), Some(&json!("feat2")));

    let features = backend.prepare_features(&layer, ZERO).await.unwrap();
    assert_eq!(features.len(), 2);

    // text that is not a number becomes null instead of failing the query
    let numeric: LayerConfig = serde_json::from_value(json!({
        "id": "numeric",
        "source": "points",
        "fields": ["name_num", "gid_num"],
        "derived": {
            "name_num": {"expr": "name", "cast": "float"},
            "gid_num": {"expr": "gid", "cast": "integer"},
        },
    }))
    .unwrap();
    let layer = table_layer(&pool, &backend, numeric);
    let decoded = decode_tile(&layer.get_tile(ZERO).await.unwrap()).unwrap();
    assert_eq!(decoded[0].features.len(), 3);
    assert!(decoded[0].features.iter().all(|f| !f.properties.contains_key("name_num")));
    assert_eq!(decoded[0].features[0].properties.get("gid_num"), Some(&json!(1)));

    let dated = LayerConfig {
        fields: vec!["name".to_string()],
        filters: vec![AttributeFilter::new("date", FilterOp::Eq(json!("2024-05-01")))],
        ..LayerConfig::new("dated", "points")
    };
    let assembler = TileAssembler::new(vec![
        table_layer(&pool, &backend, LayerConfig::new("all", "points")),
        table_layer(&pool, &backend, dated),
    ])
    .unwrap()
    .with_combined(true);
    let tile = assembler.render(ZERO).await.unwrap();
    assert_eq!(tile.status, TileStatus::Ok);
    let counts: Vec<_> = decode_tile(&tile.data)
        .unwrap()
        .iter()
        .map(|l| (l.name.clone(), l.features.len()))
        .collect();
    assert_eq!(counts, vec![("all".to_string(), 3), ("dated".to_string(), 2)]);

    let empty = assembler.render(TileCoord { z: 10, x: 0, y: 0 }).await.unwrap();
    assert_eq!(empty.status, TileStatus::NoContent);
}

#[tokio::test]
async fn table_source_lists_features() {
    let (_node, pool) = start_db().await;
    let backend: SharedBackend = Arc::new(PostgisBackend::new(pool.clone()));
    let layer = table_layer(&pool, &backend, LayerConfig::new("points", "points"));

    let all = layer.source().list(&FeatureQuery::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].properties.get("name"), Some(&json!("feat1")));
    assert!(!all[0].properties.contains_key("geom"));

    let limited = FeatureQuery {
        limit: Some(1),
        ..layer.query_for(ZERO).unwrap()
    };
    assert_eq!(layer.source().list(&limited).await.unwrap().len(), 1);
}

#[tokio::test]
async fn limit_counts_only_intersecting_features() {
    let (_node, pool) = start_db().await;
    let backend: SharedBackend = Arc::new(PostgisBackend::new(pool.clone()));
    let info = TableInfo {
        schema: "public".to_string(),
        table: "crossing".to_string(),
        geometry_column: "geom".to_string(),
        srid: 3857,
    };
    let config = LayerConfig {
        fields: vec!["name".to_string()],
        limit: Some(1),
        ..LayerConfig::new("crossing", "crossing")
    };
    let layer = layer_on(&pool, &backend, config, info);
    // the diagonal's envelope overlaps this tile, the line itself does not
    let ne = TileCoord { z: 1, x: 1, y: 0 };

    let decoded = decode_tile(&layer.get_tile(ne).await.unwrap()).unwrap();
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].features.len(), 1);
    assert_eq!(decoded[0].features[0].properties.get("name"), Some(&json!("ne")));

    let listed = layer.source().list(&layer.query_for(ne).unwrap()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].properties.get("name"), Some(&json!("ne")));
}
