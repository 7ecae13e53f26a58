use std::collections::BTreeMap;
use std::sync::Arc;

use tilejson::TileJSON;
use tracing::info;
#[cfg(feature = "postgres")]
use vectortiles_core::tiles::TableInfo;
#[cfg(feature = "postgres")]
use vectortiles_core::tiles::postgres::{
    POOL_SIZE_DEFAULT, PostgisBackend, PostgresPool, PostgresTableSource,
};
use vectortiles_core::tiles::{
    CachedRenderer, InProcessBackend, MemorySource, RenderedTile, SharedBackend, SharedSource,
    TileAssembler, TileCache, TileJsonOverrides, TileRenderer, TileResult, VectorLayer,
    tilejson_for_layers,
};
use vectortiles_tile_utils::TileCoord;

use crate::config::{BackendKind, Config, ConfigFileError, ConfigFileResult, Env, SourceConfig};

/// Layers resolved from a [`Config`], rendered through the configured cache.
pub struct TileService {
    assembler: TileAssembler,
    renderer: Box<dyn TileRenderer>,
    tilejson: TileJsonOverrides,
}

impl TileService {
    /// Connect to the database if needed, load the sources and bind the layers.
    ///
    /// `config` must have been finalized.
    pub async fn from_config<'a>(config: &Config, env: &impl Env<'a>) -> ConfigFileResult<Self> {
        let resolver = Resolver::new(config, env).await?;

        let mut sources = BTreeMap::new();
        for (id, source) in &config.sources {
            sources.insert(id.as_str(), resolver.source(id, source)?);
        }

        let mut layers = Vec::with_capacity(config.layers.len());
        for layer in &config.layers {
            let source = sources.get(layer.source.as_str()).ok_or_else(|| {
                ConfigFileError::UnknownSource(layer.id.clone(), layer.source.clone())
            })?;
            layers.push(VectorLayer::new(
                layer.clone(),
                Arc::clone(source),
                Arc::clone(&resolver.backend),
            )?);
        }

        let assembler =
            TileAssembler::new(layers)?.with_combined(config.combined_query.unwrap_or_default());
        let renderer: Box<dyn TileRenderer> = match config.cache_size_bytes() {
            Some(size) => {
                info!("Caching up to {size} bytes of tiles");
                Box::new(CachedRenderer::new(
                    assembler.clone(),
                    TileCache::new(size, config.cache_expiry),
                ))
            }
            None => Box::new(assembler.clone()),
        };

        Ok(Self {
            assembler,
            renderer,
            tilejson: config.tilejson.clone().unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn layers(&self) -> &[VectorLayer] {
        self.assembler.layers()
    }

    pub async fn render(&self, xyz: TileCoord) -> TileResult<RenderedTile> {
        self.renderer.render(xyz).await
    }

    /// Validate raw coordinates, e.g. from a URL, and render them.
    pub async fn render_tile(&self, z: i64, x: i64, y: i64) -> TileResult<RenderedTile> {
        self.render(TileCoord::try_new(z, x, y)?).await
    }

    #[must_use]
    pub fn tilejson(&self, tile_url: &str) -> TileJSON {
        tilejson_for_layers(self.layers(), tile_url, &self.tilejson)
    }
}

/// Shared state used while turning source configs into sources.
struct Resolver {
    backend: SharedBackend,
    #[cfg(feature = "postgres")]
    pool: Option<PostgresPool>,
}

impl Resolver {
    async fn new<'a>(config: &Config, env: &impl Env<'a>) -> ConfigFileResult<Self> {
        match config.backend_kind() {
            BackendKind::InProcess => {
                info!("Processing geometries in-process");
                Ok(Self {
                    backend: Arc::new(InProcessBackend),
                    #[cfg(feature = "postgres")]
                    pool: None,
                })
            }
            #[cfg(feature = "postgres")]
            BackendKind::Postgis => {
                let pool = connect(config, env).await?;
                Ok(Self {
                    backend: Arc::new(PostgisBackend::new(pool.clone())),
                    pool: Some(pool),
                })
            }
            #[cfg(not(feature = "postgres"))]
            BackendKind::Postgis => {
                let _ = env;
                Err(ConfigFileError::PostgresNotEnabled)
            }
        }
    }

    fn source(&self, id: &str, config: &SourceConfig) -> ConfigFileResult<SharedSource> {
        match config {
            SourceConfig::Geojson { path, version } => {
                let mut source = MemorySource::from_geojson_file(id, path)
                    .map_err(|e| ConfigFileError::SourceLoadError(e, id.to_string()))?;
                if let Some(version) = version {
                    source = source.with_version(version.clone());
                }
                Ok(Arc::new(source))
            }
            #[cfg(feature = "postgres")]
            SourceConfig::Table {
                schema,
                table,
                srid,
                geometry_column,
            } => {
                let Some(pool) = &self.pool else {
                    return Err(ConfigFileError::TableNeedsPostgis(id.to_string()));
                };
                let info = TableInfo {
                    schema: schema.clone(),
                    table: table.clone(),
                    geometry_column: geometry_column.clone(),
                    srid: *srid,
                };
                info!("Serving table {schema}.{table} as source {id}");
                Ok(Arc::new(PostgresTableSource::new(id, info, pool.clone())))
            }
            #[cfg(not(feature = "postgres"))]
            SourceConfig::Table { .. } => Err(ConfigFileError::PostgresNotEnabled),
        }
    }
}

#[cfg(feature = "postgres")]
async fn connect<'a>(config: &Config, env: &impl Env<'a>) -> ConfigFileResult<PostgresPool> {
    let pg = config.postgres.clone().unwrap_or_default();
    let connection_string = pg
        .connection_string
        .or_else(|| env.get_env_str("DATABASE_URL"))
        .ok_or(ConfigFileError::PostgresConnectionStringMissing)?;
    PostgresPool::new(
        &connection_string,
        pg.pool_size.unwrap_or(POOL_SIZE_DEFAULT),
    )
    .await
    .map_err(ConfigFileError::PostgresPoolCreationFailed)
}
