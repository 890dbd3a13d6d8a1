//! Backing store adapter
//!
//! Submodules:
//! - `client`: typed client used by the VFS layer (serde-encoded records, raw blobs)
//! - `query`: the filter expression accepted by `BackingStore::query`
//! - `memory`: process-local backend for tests and single-node runs
//! - `xline`: etcd v3 / xline backend
//!
//! Responsibilities summary:
//! - Provide an async get/put/remove API scoped to a named region.
//! - Provide a query-by-filter primitive over the `metadata` region.
//! - Report every failure as a `StoreError`; nothing here retries.
pub mod client;
pub mod memory;
pub mod query;
pub mod xline;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

pub use client::StoreClient;
pub use memory::InMemoryStore;
pub use query::Query;
pub use xline::{XlineConfig, XlineStore};

/// Named partition within the backing store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    /// Inode records, keyed by full path.
    Metadata,
    /// Content blobs, keyed by full path.
    Blocks,
}

impl Region {
    pub fn name(self) -> &'static str {
        match self {
            Region::Metadata => "metadata",
            Region::Blocks => "blocks",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Region {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata" => Ok(Region::Metadata),
            "blocks" => Ok(Region::Blocks),
            other => Err(StoreError::UnknownRegion(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Xline(#[from] Box<etcd_client::Error>),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("unknown region: {0}")]
    UnknownRegion(String),
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
}

impl From<etcd_client::Error> for StoreError {
    fn from(e: etcd_client::Error) -> Self {
        StoreError::Xline(Box::new(e))
    }
}

/// Region-scoped key/value access plus a filter query over stored values.
///
/// Values in `Region::Metadata` are JSON documents; `query` evaluates against
/// their top-level fields. Values in `Region::Blocks` are opaque bytes.
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn get(&self, region: Region, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, region: Region, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Removing an absent key is not an error.
    async fn remove(&self, region: Region, key: &str) -> Result<(), StoreError>;

    /// Raw values matching `query`, in backend order.
    async fn query(&self, query: &Query) -> Result<Vec<Vec<u8>>, StoreError>;
}
