//! Asset cache keyed by `(AssetType, id)`.
//!
//! Lookups never hold the lock across a fetch, so two concurrent misses for the
//! same key both go to the data source and the later insert wins. Tile images
//! are not cached: every `get_tile` decodes a fresh handle.

use crate::data_source::DataSource;
use crate::error::ClientError;
use crate::images::{ImageDecoder, ImageHandle, MacroquadDecoder};
use futures_util::stream::{FuturesUnordered, StreamExt};
use log::{debug, info};
use shared::{Asset, AssetType, EntityAsset, MapAsset, TileAsset};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub enum CachedAsset {
    Map(Arc<MapAsset>),
    Tile(Arc<TileAsset>),
    Entity(Arc<EntityAsset>),
}

impl CachedAsset {
    pub fn asset_type(&self) -> AssetType {
        match self {
            CachedAsset::Map(_) => AssetType::Map,
            CachedAsset::Tile(_) => AssetType::Tile,
            CachedAsset::Entity(_) => AssetType::Entity,
        }
    }
}

impl From<Asset> for CachedAsset {
    fn from(asset: Asset) -> Self {
        match asset {
            Asset::Map(map) => CachedAsset::Map(Arc::new(map)),
            Asset::Tile(tile) => CachedAsset::Tile(Arc::new(tile)),
            Asset::Entity(entity) => CachedAsset::Entity(Arc::new(entity)),
        }
    }
}

/// A tile asset together with its decoded image.
#[derive(Debug, Clone)]
pub struct LoadedTile {
    pub asset: Arc<TileAsset>,
    pub image: ImageHandle,
}

pub struct AssetCache<D> {
    source: Arc<D>,
    decoder: Arc<dyn ImageDecoder>,
    entries: RwLock<HashMap<(AssetType, String), CachedAsset>>,
}

impl<D: DataSource> AssetCache<D> {
    pub fn new(source: Arc<D>) -> Self {
        Self::with_decoder(source, Arc::new(MacroquadDecoder))
    }

    pub fn with_decoder(source: Arc<D>, decoder: Arc<dyn ImageDecoder>) -> Self {
        Self {
            source,
            decoder,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached asset, fetching and inserting it on a miss.
    pub async fn get(&self, asset_type: AssetType, asset_id: &str) -> Result<CachedAsset, ClientError> {
        let key = (asset_type, asset_id.to_string());

        if let Some(cached) = self.entries.read().await.get(&key) {
            debug!("{} asset {} cached, returning it", asset_type, asset_id);
            return Ok(cached.clone());
        }

        debug!("{} asset {} not cached, requesting it", asset_type, asset_id);
        let fetched = self.source.fetch_asset(asset_type, asset_id).await?;
        if fetched.asset_type() != asset_type {
            return Err(ClientError::WrongAssetType {
                asset_id: asset_id.to_string(),
                expected: asset_type,
                actual: fetched.asset_type(),
            });
        }

        let cached = CachedAsset::from(fetched);
        self.entries.write().await.insert(key, cached.clone());
        debug!("{} asset {} cached", asset_type, asset_id);
        Ok(cached)
    }

    pub async fn get_map(&self, map_id: &str) -> Result<Arc<MapAsset>, ClientError> {
        match self.get(AssetType::Map, map_id).await? {
            CachedAsset::Map(map) => Ok(map),
            other => Err(wrong_type(map_id, AssetType::Map, &other)),
        }
    }

    pub async fn get_entity(&self, entity_type: &str) -> Result<Arc<EntityAsset>, ClientError> {
        match self.get(AssetType::Entity, entity_type).await? {
            CachedAsset::Entity(entity) => Ok(entity),
            other => Err(wrong_type(entity_type, AssetType::Entity, &other)),
        }
    }

    pub async fn get_tile_asset(&self, tile_id: &str) -> Result<Arc<TileAsset>, ClientError> {
        match self.get(AssetType::Tile, tile_id).await? {
            CachedAsset::Tile(tile) => Ok(tile),
            other => Err(wrong_type(tile_id, AssetType::Tile, &other)),
        }
    }

    /// Tile asset plus a freshly loaded image.
    pub async fn get_tile(&self, tile_id: &str) -> Result<LoadedTile, ClientError> {
        let asset = self.get_tile_asset(tile_id).await?;
        let image = self.load_image(&asset.image_uri).await?;
        Ok(LoadedTile { asset, image })
    }

    /// Loads all tiles concurrently. The result is index-aligned with `ids`
    /// regardless of completion order; any failure fails the whole batch.
    pub async fn get_multiple_tiles(&self, ids: &[String]) -> Result<Vec<LoadedTile>, ClientError> {
        info!("Requested {} tile assets from cache", ids.len());

        let mut pending: FuturesUnordered<_> = ids
            .iter()
            .enumerate()
            .map(|(index, id)| async move { (index, self.get_tile(id).await) })
            .collect();

        let mut slots: Vec<Option<LoadedTile>> = vec![None; ids.len()];
        let mut remaining = ids.len();
        while let Some((index, result)) = pending.next().await {
            slots[index] = Some(result?);
            remaining -= 1;
            if remaining > 0 {
                debug!("Still {} tile assets pending", remaining);
            }
        }

        info!("All tile assets retrieved");
        Ok(slots.into_iter().flatten().collect())
    }

    pub async fn load_image(&self, uri: &str) -> Result<ImageHandle, ClientError> {
        let bytes = self.source.fetch_image(uri).await?;
        self.decoder.decode(uri, &bytes)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn contains(&self, asset_type: AssetType, asset_id: &str) -> bool {
        self.entries
            .read()
            .await
            .contains_key(&(asset_type, asset_id.to_string()))
    }
}

fn wrong_type(asset_id: &str, expected: AssetType, actual: &CachedAsset) -> ClientError {
    ClientError::WrongAssetType {
        asset_id: asset_id.to_string(),
        expected,
        actual: actual.asset_type(),
    }
}
