//! Typed client over a `BackingStore`.
//!
//! Metadata values are encoded as field-named JSON so that backends can
//! evaluate `Query` filters against them; blobs pass through untouched.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::{BackingStore, Query, Region, StoreError};

#[derive(Clone)]
pub struct StoreClient {
    backend: Arc<dyn BackingStore>,
}

impl StoreClient {
    pub fn new<B: BackingStore + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn BackingStore>) -> Self {
        Self { backend }
    }

    /// Fetch and decode a structured value. `Ok(None)` when the key is absent.
    pub async fn get_value<T: DeserializeOwned>(
        &self,
        region: Region,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.backend.get(region, key).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put_value<T: Serialize + ?Sized>(
        &self,
        region: Region,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(value)?;
        self.backend.put(region, key, raw).await
    }

    pub async fn get_bytes(&self, region: Region, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.backend.get(region, key).await
    }

    pub async fn put_bytes(&self, region: Region, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.backend.put(region, key, data.to_vec()).await
    }

    pub async fn remove(&self, region: Region, key: &str) -> Result<(), StoreError> {
        self.backend.remove(region, key).await
    }

    /// Run `query` and decode every match.
    pub async fn query_values<T: DeserializeOwned>(&self, query: &Query) -> Result<Vec<T>, StoreError> {
        let raws = self.backend.query(query).await?;
        raws.iter()
            .map(|raw| serde_json::from_slice(raw).map_err(StoreError::from))
            .collect()
    }
}
