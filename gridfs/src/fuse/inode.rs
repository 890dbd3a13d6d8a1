//! Kernel inode numbers for paths.
//!
//! Records carry only a process-local id, so the kernel-facing inode number is
//! assigned here per mount session: root is 1, every other path gets the next
//! number the first time it is seen and keeps it until it is removed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::meta::path;

pub const ROOT_INODE: u64 = 1;

#[derive(Default)]
struct Tables {
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
}

pub struct InodeTable {
    tables: RwLock<Tables>,
    next: AtomicU64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut tables = Tables::default();
        tables.by_ino.insert(ROOT_INODE, path::ROOT.to_string());
        tables.by_path.insert(path::ROOT.to_string(), ROOT_INODE);
        Self {
            tables: RwLock::new(tables),
            next: AtomicU64::new(ROOT_INODE + 1),
        }
    }

    pub async fn path_of(&self, ino: u64) -> Option<String> {
        self.tables.read().await.by_ino.get(&ino).cloned()
    }

    /// Inode number for `full_path`, assigning one if needed.
    pub async fn ino_for(&self, full_path: &str) -> u64 {
        if let Some(&ino) = self.tables.read().await.by_path.get(full_path) {
            return ino;
        }
        let mut tables = self.tables.write().await;
        if let Some(&ino) = tables.by_path.get(full_path) {
            return ino;
        }
        let ino = self.next.fetch_add(1, Ordering::Relaxed);
        tables.by_ino.insert(ino, full_path.to_string());
        tables.by_path.insert(full_path.to_string(), ino);
        ino
    }

    /// Inode number of the directory containing `full_path`; root for root.
    pub async fn parent_ino(&self, full_path: &str) -> u64 {
        match path::split(full_path) {
            Some((parent, _)) => self.ino_for(&parent).await,
            None => ROOT_INODE,
        }
    }

    /// Drop the mapping of a removed path. The root is never dropped.
    pub async fn forget_path(&self, full_path: &str) {
        if full_path == path::ROOT {
            return;
        }
        let mut tables = self.tables.write().await;
        if let Some(ino) = tables.by_path.remove(full_path) {
            tables.by_ino.remove(&ino);
        }
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.by_ino.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
