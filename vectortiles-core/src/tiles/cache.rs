use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{info, trace};
use vectortiles_tile_utils::TileCoord;
use xxhash_rust::xxh3::xxh3_64;

use crate::tiles::TileResult;
use crate::tiles::assembler::{RenderedTile, TileRenderer};

/// Tile cache for storing rendered tiles.
#[derive(Clone, Debug)]
pub struct TileCache(Cache<TileCacheKey, RenderedTile>);

impl TileCache {
    /// Creates a new tile cache holding at most `max_size_bytes` of tile data.
    ///
    /// `expiry` is the maximum lifetime of an entry since its creation.
    #[must_use]
    pub fn new(max_size_bytes: u64, expiry: Option<Duration>) -> Self {
        let mut builder = Cache::builder()
            .name("tile_cache")
            .weigher(|_key: &TileCacheKey, value: &RenderedTile| -> u32 {
                value.data.len().try_into().unwrap_or(u32::MAX)
            })
            .max_capacity(max_size_bytes);

        if let Some(ttl) = expiry {
            builder = builder.time_to_live(ttl);
            trace!("Tile cache configured with TTL of {ttl:?}");
        }

        Self(builder.build())
    }

    async fn get(&self, key: &TileCacheKey) -> Option<RenderedTile> {
        let result = self.0.get(key).await;

        if result.is_some() {
            trace!(
                "Tile cache HIT for {key:?} (entries={entries}, size={size}B)",
                entries = self.0.entry_count(),
                size = self.0.weighted_size()
            );
        } else {
            trace!("Tile cache MISS for {key:?}");
        }

        result
    }

    /// Gets a tile from cache or computes it with `compute`.
    ///
    /// Errors and tiles with failed layers are returned without being cached.
    pub async fn get_or_insert<F, Fut>(
        &self,
        content_key: &str,
        xyz: TileCoord,
        compute: F,
    ) -> TileResult<RenderedTile>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TileResult<RenderedTile>>,
    {
        let key = TileCacheKey::new(content_key, xyz);
        if let Some(tile) = self.get(&key).await {
            return Ok(tile);
        }

        let tile = compute().await?;
        if tile.is_complete() {
            self.0.insert(key, tile.clone()).await;
        } else {
            trace!("Not caching incomplete tile {xyz:#}");
        }
        Ok(tile)
    }

    /// Invalidates all cached tiles.
    pub fn invalidate_all(&self) {
        self.0.invalidate_all();
        info!("Invalidated all tile cache entries");
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.0.entry_count()
    }

    /// Returns the total size of cached data in bytes.
    #[must_use]
    pub fn weighted_size(&self) -> u64 {
        self.0.weighted_size()
    }
}

/// Cache key: a hash of the rendered content identity plus the tile address.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
struct TileCacheKey {
    content: u64,
    xyz: TileCoord,
}

impl TileCacheKey {
    fn new(content_key: &str, xyz: TileCoord) -> Self {
        Self {
            content: xxh3_64(content_key.as_bytes()),
            xyz,
        }
    }
}

/// A [`TileRenderer`] memoizing another one.
///
/// The key includes the inner renderer's [`TileRenderer::cache_key`], so a changed data
/// freshness marker misses the cache.
#[derive(Debug, Clone)]
pub struct CachedRenderer<R> {
    inner: R,
    cache: TileCache,
}

impl<R: TileRenderer> CachedRenderer<R> {
    #[must_use]
    pub fn new(inner: R, cache: TileCache) -> Self {
        Self { inner, cache }
    }

    #[must_use]
    pub fn inner(&self) -> &R {
        &self.inner
    }

    #[must_use]
    pub fn cache(&self) -> &TileCache {
        &self.cache
    }
}

#[async_trait]
impl<R: TileRenderer> TileRenderer for CachedRenderer<R> {
    async fn render(&self, xyz: TileCoord) -> TileResult<RenderedTile> {
        let key = self.inner.cache_key();
        self.cache
            .get_or_insert(&key, xyz, || self.inner.render(xyz))
            .await
    }

    fn cache_key(&self) -> String {
        self.inner.cache_key()
    }
}
