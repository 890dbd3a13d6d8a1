//! Open-file handle.
//!
//! Content is stored as one blob per path, so reads return the whole blob and
//! writes replace it. Every call goes straight to the backing store; a handle
//! has no buffers and nothing to flush on close.

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::dir::list_children_of;
use super::error::Result;
use super::file::check_blob_size;
use super::fs::GridFs;
use super::node::DirEntry;
use crate::meta::InodeRecord;
use crate::store::Region;

pub struct FileHandle {
    id: u64,
    fs: GridFs,
    path: String,
    record: RwLock<InodeRecord>,
}

impl FileHandle {
    pub(crate) fn new(fs: GridFs, id: u64, record: InodeRecord) -> Self {
        Self {
            id,
            fs,
            path: record.full_path(),
            record: RwLock::new(record),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The record as last seen by this handle.
    pub async fn record(&self) -> InodeRecord {
        self.record.read().await.clone()
    }

    /// Whole content blob; a file without a blob reads as empty.
    pub async fn read_all(&self) -> Result<Bytes> {
        let data = self
            .fs
            .store()
            .get_bytes(Region::Blocks, &self.path)
            .await?
            .unwrap_or_default();
        Ok(Bytes::from(data))
    }

    /// Content is not range-addressable; the whole blob is returned and the
    /// caller slices it.
    pub async fn read(&self, offset: u64) -> Result<Bytes> {
        debug!(path = %self.path, fh = self.id, offset, "read");
        self.read_all().await
    }

    /// Replace the content with `data` and bring the record's size in line.
    ///
    /// The record is re-fetched between the two writes so concurrent attribute
    /// changes are not clobbered. If the second write fails, size and content
    /// disagree until the next successful write.
    pub async fn write(&self, data: &[u8], offset: u64) -> Result<usize> {
        debug!(path = %self.path, fh = self.id, offset, len = data.len(), "write");
        check_blob_size(&self.path, data.len() as u64)?;
        let store = self.fs.store();
        store.put_bytes(Region::Blocks, &self.path, data).await?;

        let mut current = match self.fs.fetch_record(&self.path).await? {
            Some(record) => record,
            None => {
                warn!(path = %self.path, "missing metadata entry on write");
                let held = self.record.read().await;
                InodeRecord {
                    name: held.name.clone(),
                    parent: held.parent.clone(),
                    ..Default::default()
                }
            }
        };
        current.size = data.len() as u64;
        store
            .put_value(Region::Metadata, &self.path, &current)
            .await?;
        *self.record.write().await = current;
        Ok(data.len())
    }

    /// Children of the entry this handle was opened on.
    pub async fn list_children(&self) -> Result<Vec<DirEntry>> {
        list_children_of(&self.fs, &self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreClient};
    use crate::vfs::FsError;
    use crate::vfs::node::{AttrChange, Node};
    use crate::vfs::test_support::faulty_fs;
    use std::sync::Arc;

    fn memfs() -> (GridFs, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (GridFs::new(StoreClient::from_arc(store.clone())), store)
    }

    async fn stored_size(fs: &GridFs, path: &str) -> u64 {
        fs.fetch_record(path).await.unwrap().unwrap().size
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let (fs, _) = memfs();
        let (_, handle) = fs.root().create_file("test1", 0o644).await.unwrap();
        assert_eq!(handle.write(b"test1", 0).await.unwrap(), 5);
        assert_eq!(&handle.read_all().await.unwrap()[..], b"test1");
        assert_eq!(&handle.read(3).await.unwrap()[..], b"test1");
        assert_eq!(stored_size(&fs, "/test1").await, 5);
        assert_eq!(handle.record().await.size, 5);
    }

    #[tokio::test]
    async fn unwritten_file_reads_empty() {
        let (fs, _) = memfs();
        let (_, handle) = fs.root().create_file("empty", 0o644).await.unwrap();
        assert!(handle.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_write_replaces_content_and_size() {
        let (fs, _) = memfs();
        let (file, handle) = fs.root().create_file("test2", 0o644).await.unwrap();
        handle.write(b"test2 updated", 0).await.unwrap();
        handle.write(b"short", 0).await.unwrap();
        assert_eq!(&handle.read_all().await.unwrap()[..], b"short");
        assert_eq!(stored_size(&fs, "/test2").await, 5);

        let other = file.open();
        assert_eq!(&other.read_all().await.unwrap()[..], b"short");
    }

    #[tokio::test]
    async fn write_keeps_concurrent_mode_change() {
        let (fs, _) = memfs();
        let (mut file, handle) = fs.root().create_file("f", 0o644).await.unwrap();
        file.set_attr(AttrChange {
            mode: Some(0o600),
            size: None,
        })
        .await
        .unwrap();
        handle.write(b"abc", 0).await.unwrap();

        let Node::File(fresh) = fs.root().lookup("f").await.unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(fresh.attr().perm, 0o600);
        assert_eq!(fresh.attr().size, 3);
    }

    #[tokio::test]
    async fn write_tolerates_missing_metadata() {
        let (fs, _) = memfs();
        let (_, handle) = fs.root().create_file("gone", 0o644).await.unwrap();
        fs.store().remove(Region::Metadata, "/gone").await.unwrap();

        assert_eq!(handle.write(b"xyz", 0).await.unwrap(), 3);
        let record = fs.fetch_record("/gone").await.unwrap().unwrap();
        assert_eq!(record.name, "gone");
        assert_eq!(record.parent, "/");
        assert_eq!(record.size, 3);
        assert_eq!(record.id, 0);
    }

    #[tokio::test]
    async fn oversized_write_is_rejected() {
        let (fs, store) = memfs();
        let (_, handle) = fs.root().create_file("big", 0o644).await.unwrap();
        let data = vec![7u8; crate::vfs::file::MAX_BLOB_SIZE as usize + 1];
        assert!(matches!(
            handle.write(&data, 0).await,
            Err(FsError::FileTooLarge(_))
        ));
        assert_eq!(store.count(Region::Blocks).await, 0);
        assert_eq!(stored_size(&fs, "/big").await, 0);
    }

    #[tokio::test]
    async fn blob_write_failure_leaves_metadata_untouched() {
        let (fs, faulty) = faulty_fs();
        let (_, handle) = fs.root().create_file("f", 0o644).await.unwrap();

        faulty.fail_puts(Region::Blocks, true);
        assert!(matches!(handle.write(b"data", 0).await, Err(FsError::Store(_))));
        assert_eq!(stored_size(&fs, "/f").await, 0);
    }

    #[tokio::test]
    async fn metadata_write_failure_is_reported() {
        let (fs, faulty) = faulty_fs();
        let (_, handle) = fs.root().create_file("f", 0o644).await.unwrap();

        faulty.fail_puts(Region::Metadata, true);
        assert!(matches!(handle.write(b"data", 0).await, Err(FsError::Store(_))));
        faulty.fail_puts(Region::Metadata, false);

        // content landed, size did not: the documented inconsistency window
        assert_eq!(&handle.read_all().await.unwrap()[..], b"data");
        assert_eq!(stored_size(&fs, "/f").await, 0);

        handle.write(b"data!", 0).await.unwrap();
        assert_eq!(stored_size(&fs, "/f").await, 5);
    }
}
