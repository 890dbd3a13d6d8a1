//! Filesystem root: owns the store client and the id allocator and hands out
//! node views. Every view holds a cheap clone of this.

use std::sync::Arc;
use tracing::{info, warn};

use super::dir::DirNode;
use super::error::{FsError, Result};
use super::file::FileNode;
use super::handles::HandleAllocator;
use super::node::Node;
use crate::meta::{InodeRecord, path};
use crate::store::{Region, StoreClient, StoreError, XlineConfig, XlineStore};

#[derive(Clone)]
pub struct GridFs {
    store: StoreClient,
    handles: Arc<HandleAllocator>,
}

impl GridFs {
    pub fn new(store: StoreClient) -> Self {
        Self {
            store,
            handles: Arc::new(HandleAllocator::new()),
        }
    }

    /// Connect to an xline/etcd cluster. Failure here is fatal for a mount.
    pub async fn connect(cfg: &XlineConfig) -> std::result::Result<Self, StoreError> {
        let store = XlineStore::connect(cfg).await?;
        info!(endpoints = ?cfg.endpoints, prefix = %cfg.prefix, "connected to backing store");
        Ok(Self::new(StoreClient::new(store)))
    }

    /// The directory node for "/".
    pub fn root(&self) -> DirNode {
        DirNode::new(self.clone(), InodeRecord::root())
    }

    pub fn store(&self) -> &StoreClient {
        &self.store
    }

    pub fn handles(&self) -> &HandleAllocator {
        &self.handles
    }

    /// Resolve a full path to a node with a single metadata fetch.
    pub async fn resolve(&self, full_path: &str) -> Result<Node> {
        let full_path = path::normalize(full_path);
        if full_path == path::ROOT {
            return Ok(Node::Dir(self.root()));
        }
        match self.fetch_record(&full_path).await? {
            Some(record) => Ok(self.node_for(record)),
            None => Err(FsError::NotFound(full_path)),
        }
    }

    /// Current record at `key`, shape-checked against the key.
    pub(crate) async fn fetch_record(&self, key: &str) -> Result<Option<InodeRecord>> {
        let Some(record) = self
            .store
            .get_value::<InodeRecord>(Region::Metadata, key)
            .await?
        else {
            return Ok(None);
        };
        if !record.is_consistent_with(key) {
            warn!(key, ?record, "record does not match its key");
            return Err(FsError::InvalidState {
                key: key.to_string(),
                reason: format!(
                    "record names {:?} under parent {:?}",
                    record.name, record.parent
                ),
            });
        }
        Ok(Some(record))
    }

    pub(crate) fn node_for(&self, record: InodeRecord) -> Node {
        if record.is_directory {
            Node::Dir(DirNode::new(self.clone(), record))
        } else {
            Node::File(FileNode::new(self.clone(), record))
        }
    }
}
