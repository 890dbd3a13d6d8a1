//! In-process backend: one ordered map per region.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{BackingStore, Query, Region, StoreError};

#[derive(Default)]
pub struct InMemoryStore {
    regions: RwLock<HashMap<Region, BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held in `region`.
    pub async fn count(&self, region: Region) -> usize {
        self.regions
            .read()
            .await
            .get(&region)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn get(&self, region: Region, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let regions = self.regions.read().await;
        Ok(regions.get(&region).and_then(|m| m.get(key)).cloned())
    }

    async fn put(&self, region: Region, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut regions = self.regions.write().await;
        regions
            .entry(region)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, region: Region, key: &str) -> Result<(), StoreError> {
        let mut regions = self.regions.write().await;
        if let Some(m) = regions.get_mut(&region) {
            m.remove(key);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Vec<u8>>, StoreError> {
        let regions = self.regions.read().await;
        let Some(m) = regions.get(&query.region()) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for raw in m.values() {
            if query.matches_raw(raw)? {
                out.push(raw.clone());
            }
        }
        Ok(out)
    }
}
