//! Regular-file metadata view, independent of any open handle.

use tracing::debug;

use super::error::{FsError, Result};
use super::file_handle::FileHandle;
use super::fs::GridFs;
use super::node::{AttrChange, FileAttr};
use crate::meta::InodeRecord;
use crate::store::Region;

/// Largest content blob kept for one file. One blob travels in one store
/// request, and etcd rejects requests above 1.5 MiB by default.
pub const MAX_BLOB_SIZE: u64 = 1024 * 1024;

#[derive(Clone)]
pub struct FileNode {
    fs: GridFs,
    record: InodeRecord,
}

impl FileNode {
    pub(crate) fn new(fs: GridFs, record: InodeRecord) -> Self {
        Self { fs, record }
    }

    pub fn path(&self) -> String {
        self.record.full_path()
    }

    /// Attributes of the record this node was built from; not re-fetched.
    pub fn attr(&self) -> FileAttr {
        FileAttr::from(&self.record)
    }

    /// New handle with a fresh id. Content is not preloaded.
    pub fn open(&self) -> FileHandle {
        let id = self.fs.handles().next_id();
        debug!(path = %self.path(), fh = id, "open");
        FileHandle::new(self.fs.clone(), id, self.record.clone())
    }

    /// Apply `change` to the held record and persist the whole record.
    ///
    /// A size change also resizes the content blob so that `size` keeps
    /// matching the stored content. Sizes above [`MAX_BLOB_SIZE`] fail with
    /// `FileTooLarge` before anything is read or written. Nothing is rolled
    /// back on other failures.
    pub async fn set_attr(&mut self, change: AttrChange) -> Result<FileAttr> {
        let path = self.path();
        if let Some(size) = change.size {
            check_blob_size(&path, size)?;
        }
        if let Some(mode) = change.mode {
            self.record.mode = mode & 0o7777;
        }
        if let Some(size) = change.size {
            resize_blob(&self.fs, &path, size).await?;
            self.record.size = size;
        }
        self.fs
            .store()
            .put_value(Region::Metadata, &path, &self.record)
            .await?;
        debug!(path = %path, ?change, "setattr");
        Ok(self.attr())
    }
}

pub(crate) fn check_blob_size(path: &str, size: u64) -> Result<()> {
    if size > MAX_BLOB_SIZE {
        return Err(FsError::FileTooLarge(format!(
            "{path}: {size} bytes, limit {MAX_BLOB_SIZE}"
        )));
    }
    Ok(())
}

async fn resize_blob(fs: &GridFs, path: &str, size: u64) -> Result<()> {
    let too_large = || FsError::FileTooLarge(format!("{path}: {size} bytes"));
    let target = usize::try_from(size).map_err(|_| too_large())?;
    let current = fs.store().get_bytes(Region::Blocks, path).await?;
    match current {
        None if target == 0 => Ok(()),
        Some(ref data) if data.len() == target => Ok(()),
        current => {
            let mut data = current.unwrap_or_default();
            data.try_reserve_exact(target.saturating_sub(data.len()))
                .map_err(|_| too_large())?;
            data.resize(target, 0);
            fs.store().put_bytes(Region::Blocks, path, &data).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreClient};
    use crate::vfs::node::Node;

    fn memfs() -> GridFs {
        GridFs::new(StoreClient::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn mode_change_is_visible_through_fresh_lookup() {
        let fs = memfs();
        let (mut file, _) = fs.root().create_file("f", 0o644).await.unwrap();
        let attr = file
            .set_attr(AttrChange {
                mode: Some(0o100600),
                size: None,
            })
            .await
            .unwrap();
        assert_eq!(attr.perm, 0o600);

        let Node::File(fresh) = fs.root().lookup("f").await.unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(fresh.attr().perm, 0o600);
    }

    #[tokio::test]
    async fn truncate_shrinks_content_and_size() {
        let fs = memfs();
        let (mut file, handle) = fs.root().create_file("f", 0o644).await.unwrap();
        handle.write(b"hello world", 0).await.unwrap();

        file.set_attr(AttrChange {
            mode: None,
            size: Some(5),
        })
        .await
        .unwrap();

        assert_eq!(&handle.read_all().await.unwrap()[..], b"hello");
        let Node::File(fresh) = fs.root().lookup("f").await.unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(fresh.attr().size, 5);
    }

    #[tokio::test]
    async fn extending_zero_fills() {
        let fs = memfs();
        let (mut file, handle) = fs.root().create_file("f", 0o644).await.unwrap();
        handle.write(b"ab", 0).await.unwrap();
        file.set_attr(AttrChange {
            mode: None,
            size: Some(4),
        })
        .await
        .unwrap();
        assert_eq!(&handle.read_all().await.unwrap()[..], b"ab\0\0");
    }

    #[tokio::test]
    async fn truncating_unwritten_file_to_zero_creates_no_blob() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let fs = GridFs::new(StoreClient::from_arc(store.clone()));
        let (mut file, _) = fs.root().create_file("f", 0o644).await.unwrap();
        file.set_attr(AttrChange {
            mode: None,
            size: Some(0),
        })
        .await
        .unwrap();
        assert_eq!(store.count(Region::Blocks).await, 0);
    }

    #[tokio::test]
    async fn oversized_truncate_is_rejected_without_side_effects() {
        let fs = memfs();
        let (mut file, handle) = fs.root().create_file("f", 0o644).await.unwrap();
        handle.write(b"abc", 0).await.unwrap();

        let err = file
            .set_attr(AttrChange {
                mode: Some(0o600),
                size: Some(1 << 50),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::FileTooLarge(_)));
        assert_eq!(err.errno(), libc::EFBIG);
        assert_eq!(file.attr().perm, 0o644);
        assert_eq!(file.attr().size, 0);

        let Node::File(fresh) = fs.root().lookup("f").await.unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(fresh.attr().size, 3);
        assert_eq!(fresh.attr().perm, 0o644);
        assert_eq!(&handle.read_all().await.unwrap()[..], b"abc");
    }

    #[tokio::test]
    async fn truncate_to_the_limit_is_allowed() {
        let fs = memfs();
        let (mut file, handle) = fs.root().create_file("f", 0o644).await.unwrap();
        let attr = file
            .set_attr(AttrChange {
                mode: None,
                size: Some(MAX_BLOB_SIZE),
            })
            .await
            .unwrap();
        assert_eq!(attr.size, MAX_BLOB_SIZE);
        assert_eq!(handle.read_all().await.unwrap().len() as u64, MAX_BLOB_SIZE);
    }

    #[tokio::test]
    async fn open_allocates_distinct_handles() {
        let fs = memfs();
        let (file, created) = fs.root().create_file("f", 0o644).await.unwrap();
        let a = file.open();
        let b = file.open();
        assert_ne!(a.id(), b.id());
        assert!(a.id() > created.id());
        assert_eq!(a.path(), "/f");
    }
}
