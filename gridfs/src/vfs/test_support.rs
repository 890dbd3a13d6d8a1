//! Fault-injecting store wrapper for unit tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::fs::GridFs;
use crate::store::{BackingStore, InMemoryStore, Query, Region, StoreClient, StoreError};

#[derive(Default)]
pub(crate) struct FaultyStore {
    inner: InMemoryStore,
    fail_metadata_puts: AtomicBool,
    fail_blocks_puts: AtomicBool,
    fail_queries: AtomicBool,
    fail_gets: AtomicBool,
    metadata_puts: AtomicUsize,
    blocks_puts: AtomicUsize,
}

impl FaultyStore {
    fn put_flag(&self, region: Region) -> &AtomicBool {
        match region {
            Region::Metadata => &self.fail_metadata_puts,
            Region::Blocks => &self.fail_blocks_puts,
        }
    }

    fn put_counter(&self, region: Region) -> &AtomicUsize {
        match region {
            Region::Metadata => &self.metadata_puts,
            Region::Blocks => &self.blocks_puts,
        }
    }

    pub(crate) fn fail_puts(&self, region: Region, fail: bool) {
        self.put_flag(region).store(fail, Ordering::SeqCst);
        self.put_counter(region).store(0, Ordering::SeqCst);
    }

    pub(crate) fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Puts attempted on `region` since the last `fail_puts` call.
    pub(crate) fn put_attempts(&self, region: Region) -> usize {
        self.put_counter(region).load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackingStore for FaultyStore {
    async fn get(&self, region: Region, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("get {region}{key}")));
        }
        self.inner.get(region, key).await
    }

    async fn put(&self, region: Region, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.put_counter(region).fetch_add(1, Ordering::SeqCst);
        if self.put_flag(region).load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("put {region}{key}")));
        }
        self.inner.put(region, key, value).await
    }

    async fn remove(&self, region: Region, key: &str) -> Result<(), StoreError> {
        self.inner.remove(region, key).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Vec<u8>>, StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("query {query}")));
        }
        self.inner.query(query).await
    }
}

pub(crate) fn faulty_fs() -> (GridFs, Arc<FaultyStore>) {
    let faulty = Arc::new(FaultyStore::default());
    let backend: Arc<dyn BackingStore> = faulty.clone();
    (GridFs::new(StoreClient::from_arc(backend)), faulty)
}
