use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use subst::VariableMap;
use tracing::warn;
use vectortiles_core::tiles::{InvalidFeaturePolicy, LayerConfig, TileJsonOverrides};

use crate::config::{ConfigFileError, ConfigFileResult};

pub type UnrecognizedValues = HashMap<String, serde_yaml::Value>;
pub type UnrecognizedKeys = HashSet<String>;

/// Tile cache size used when `cache_size_mb` is not set.
pub const DEFAULT_CACHE_SIZE_MB: u64 = 128;

/// Where geometry processing and encoding happen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Select, clip and encode inside `PostGIS`
    Postgis,
    /// Process geometries in this process
    #[serde(alias = "inprocess")]
    InProcess,
}

#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database connection string, falls back to `DATABASE_URL`
    pub connection_string: Option<String>,
    /// Maximum number of open connections
    pub pool_size: Option<usize>,
    #[serde(flatten, skip_serializing)]
    pub unrecognized: UnrecognizedValues,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_geometry_column() -> String {
    "geom".to_string()
}

/// A feature source declared in the config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// A `PostGIS` table, queried live
    Table {
        #[serde(default = "default_schema")]
        schema: String,
        table: String,
        srid: i32,
        #[serde(default = "default_geometry_column")]
        geometry_column: String,
    },
    /// A GeoJSON file loaded into memory at startup
    #[serde(alias = "file")]
    Geojson {
        path: PathBuf,
        /// Data freshness marker, part of the tile cache key
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Geometry backend. Defaults to `postgis` when a `postgres` section exists.
    pub backend: Option<BackendKind>,

    pub postgres: Option<PostgresConfig>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, SourceConfig>,

    /// Layers in the order they appear in every tile
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<LayerConfig>,

    pub tilejson: Option<TileJsonOverrides>,

    /// Render all layers of a tile with one database query
    pub combined_query: Option<bool>,

    /// Maximum size of the tile cache in megabytes (0 to disable)
    pub cache_size_mb: Option<u64>,

    /// Maximum lifetime of cached tiles, e.g. "1h" or "30m"
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub cache_expiry: Option<Duration>,

    /// Default for layers that do not set `on_invalid_feature`
    pub on_invalid_feature: Option<InvalidFeaturePolicy>,

    #[serde(flatten, skip_serializing)]
    pub unrecognized: UnrecognizedValues,
}

impl Config {
    /// Apply defaults and check cross references. Unknown keys are returned and logged.
    pub fn finalize(&mut self) -> ConfigFileResult<UnrecognizedKeys> {
        let mut res = UnrecognizedKeys::new();
        copy_unrecognized_keys_from_config(&mut res, "", &self.unrecognized);
        if let Some(pg) = &self.postgres {
            copy_unrecognized_keys_from_config(&mut res, "postgres.", &pg.unrecognized);
            if pg.pool_size == Some(0) {
                return Err(ConfigFileError::PostgresPoolSizeInvalid);
            }
        }
        for (idx, layer) in self.layers.iter().enumerate() {
            copy_unrecognized_keys_from_config(
                &mut res,
                &format!("layers[{idx}]."),
                &layer.unrecognized,
            );
        }
        for key in &res {
            warn!(
                "Ignoring unrecognized configuration key '{key}'. Please check your configuration file for typos."
            );
        }

        if self.layers.is_empty() {
            return Err(ConfigFileError::NoLayers);
        }

        let backend = self.backend_kind();
        for (id, source) in &self.sources {
            if matches!(source, SourceConfig::Table { .. }) && backend != BackendKind::Postgis {
                return Err(ConfigFileError::TableNeedsPostgis(id.clone()));
            }
        }

        let mut seen = HashSet::new();
        let default_policy = self.on_invalid_feature;
        for layer in &mut self.layers {
            if !seen.insert(layer.id.clone()) {
                return Err(ConfigFileError::DuplicateLayer(layer.id.clone()));
            }
            if !self.sources.contains_key(&layer.source) {
                return Err(ConfigFileError::UnknownSource(
                    layer.id.clone(),
                    layer.source.clone(),
                ));
            }
            if layer.on_invalid_feature.is_none() {
                layer.on_invalid_feature = default_policy;
            }
            layer.validate()?;
        }

        Ok(res)
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.unwrap_or(if self.postgres.is_some() {
            BackendKind::Postgis
        } else {
            BackendKind::InProcess
        })
    }

    /// Tile cache size in bytes, `None` when caching is disabled.
    #[must_use]
    pub fn cache_size_bytes(&self) -> Option<u64> {
        let size_mb = self.cache_size_mb.unwrap_or(DEFAULT_CACHE_SIZE_MB);
        if size_mb == 0 {
            if self.cache_expiry.is_some() {
                warn!("Tile cache is not enabled, ignoring cache_expiry");
            }
            None
        } else {
            Some(size_mb.saturating_mul(1024 * 1024))
        }
    }
}

pub fn copy_unrecognized_keys_from_config<V>(
    result: &mut UnrecognizedKeys,
    prefix: &str,
    unrecognized: &HashMap<String, V>,
) {
    result.extend(unrecognized.keys().map(|k| format!("{prefix}{k}")));
}

/// Read config from a file
pub fn read_config<'a, M>(file_name: &Path, env: &'a M) -> ConfigFileResult<Config>
where
    M: VariableMap<'a>,
    M::Value: AsRef<str>,
{
    let mut file =
        File::open(file_name).map_err(|e| ConfigFileError::ConfigLoadError(e, file_name.into()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| ConfigFileError::ConfigLoadError(e, file_name.into()))?;
    parse_config(&contents, env, file_name)
}

/// Parse a YAML config, substituting `${VAR}` references from `env`.
pub fn parse_config<'a, M>(contents: &str, env: &'a M, file_name: &Path) -> ConfigFileResult<Config>
where
    M: VariableMap<'a>,
    M::Value: AsRef<str>,
{
    subst::yaml::from_str(contents, env)
        .map_err(|e| ConfigFileError::ConfigParseError(e, file_name.into()))
}
