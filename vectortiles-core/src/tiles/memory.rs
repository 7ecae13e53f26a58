//! Feature source over features held in memory.

use std::fmt::{Debug, Formatter};
use std::path::Path;

use async_trait::async_trait;
use geo::{Geometry, Intersects as _, Rect};
use geojson::GeoJson;
use geojson::feature::Id;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};
use tracing::{debug, info};
use vectortiles_tile_utils::{SRID_WEB_MERCATOR, SRID_WGS84};

use crate::tiles::geometry::{envelope, to_web_mercator};
use crate::tiles::{Feature, FeatureQuery, FeatureSource, SourceError, SourceResult};

type IndexedEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Features kept in memory and indexed with an R-tree over their Web Mercator envelopes.
pub struct MemorySource {
    id: String,
    srid: i32,
    features: Vec<Feature>,
    index: RTree<IndexedEnvelope>,
    version: Option<String>,
}

impl Debug for MemorySource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySource")
            .field("id", &self.id)
            .field("srid", &self.srid)
            .field("features", &self.features.len())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl MemorySource {
    /// Build a source from features stored in `srid`, which must be 4326 or 3857.
    pub fn new(id: impl Into<String>, srid: i32, mut features: Vec<Feature>) -> SourceResult<Self> {
        let id = id.into();
        for feature in &mut features {
            if !to_web_mercator(&mut feature.geometry, srid) {
                return Err(SourceError::UnsupportedSrid(id, srid));
            }
        }

        let entries: Vec<IndexedEnvelope> = features
            .iter()
            .enumerate()
            .filter_map(|(idx, f)| {
                let env = envelope(&f.geometry)?;
                let rect = Rectangle::from_corners([env.xmin, env.ymin], [env.xmax, env.ymax]);
                Some(GeomWithData::new(rect, idx))
            })
            .collect();
        debug!(
            "Indexed {} of {} features of source {id}",
            entries.len(),
            features.len()
        );

        Ok(Self {
            id,
            srid,
            features,
            index: RTree::bulk_load(entries),
            version: None,
        })
    }

    /// Parse a GeoJSON `FeatureCollection`, `Feature` or bare geometry (always WGS84).
    pub fn from_geojson_str(id: impl Into<String>, text: &str) -> SourceResult<Self> {
        let id = id.into();
        let features = parse_geojson(&id, text, "inline GeoJSON")?;
        Self::new(id, SRID_WGS84, features)
    }

    /// Load a GeoJSON file.
    pub fn from_geojson_file(id: impl Into<String>, path: &Path) -> SourceResult<Self> {
        let id = id.into();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SourceError::IoError(e, path.to_path_buf()))?;
        let features = parse_geojson(&id, &text, &path.display().to_string())?;
        info!(
            "Loaded {} features for source {id} from {}",
            features.len(),
            path.display()
        );
        Self::new(id, SRID_WGS84, features)
    }

    /// Attach a data freshness marker, used to invalidate cached tiles.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn parse_geojson(id: &str, text: &str, origin: &str) -> SourceResult<Vec<Feature>> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| SourceError::GeoJsonError(Box::new(e), origin.to_string()))?;

    let raw = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![geojson::Feature::from(g)],
    };

    raw.into_iter()
        .enumerate()
        .map(|(idx, f)| {
            let geometry = f
                .geometry
                .ok_or_else(|| SourceError::MissingGeometry(id.to_string(), idx))?;
            let geometry = Geometry::<f64>::try_from(geometry)
                .map_err(|e| SourceError::GeoJsonError(Box::new(e), origin.to_string()))?;
            let id = match f.id {
                Some(Id::Number(n)) => n.as_u64(),
                _ => None,
            };
            Ok(Feature {
                id,
                geometry,
                properties: f.properties.unwrap_or_default(),
            })
        })
        .collect()
}

#[async_trait]
impl FeatureSource for MemorySource {
    fn get_id(&self) -> &str {
        &self.id
    }

    fn srid(&self) -> i32 {
        self.srid
    }

    async fn list(&self, query: &FeatureQuery) -> SourceResult<Vec<Feature>> {
        let candidates: Vec<usize> = if let Some(bbox) = &query.bbox {
            let search = AABB::from_corners([bbox.xmin, bbox.ymin], [bbox.xmax, bbox.ymax]);
            let mut found: Vec<usize> = self
                .index
                .locate_in_envelope_intersecting(&search)
                .map(|entry| entry.data)
                .collect();
            // R-tree order is arbitrary, keep the source order
            found.sort_unstable();
            found
        } else {
            (0..self.features.len()).collect()
        };

        let window = query.bbox.as_ref().map(|b| {
            Rect::new(
                geo::Coord {
                    x: b.xmin,
                    y: b.ymin,
                },
                geo::Coord {
                    x: b.xmax,
                    y: b.ymax,
                },
            )
        });

        let features: Vec<Feature> = candidates
            .into_iter()
            .filter_map(|idx| self.features.get(idx))
            .filter(|f| window.is_none_or(|w| f.geometry.intersects(&w)))
            .filter(|f| query.matches(&f.properties))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        debug!(
            "Source {} returned {} features for {:?}",
            self.id,
            features.len(),
            query.bbox
        );
        Ok(features)
    }

    fn get_version(&self) -> Option<String> {
        self.version.clone()
    }
}

impl MemorySource {
    /// SRID of the stored geometries, which is always Web Mercator after loading.
    #[must_use]
    pub fn storage_srid(&self) -> i32 {
        SRID_WEB_MERCATOR
    }
}
