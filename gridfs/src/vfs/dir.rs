//! Directory operations. Children are never stored on the directory itself;
//! membership is whatever the `metadata` region holds under `parent == path`.

use tracing::{debug, info, warn};

use super::error::{FsError, Result};
use super::file::FileNode;
use super::file_handle::FileHandle;
use super::fs::GridFs;
use super::node::{AttrChange, DirEntry, FileAttr, Node};
use crate::meta::{InodeRecord, path};
use crate::store::{Query, Region};

#[derive(Clone)]
pub struct DirNode {
    fs: GridFs,
    record: InodeRecord,
}

impl DirNode {
    pub(crate) fn new(fs: GridFs, record: InodeRecord) -> Self {
        Self { fs, record }
    }

    pub fn path(&self) -> String {
        self.record.full_path()
    }

    pub fn attr(&self) -> FileAttr {
        FileAttr::from(&self.record)
    }

    fn child_path(&self, name: &str) -> Result<String> {
        if !path::is_valid_name(name) {
            return Err(FsError::InvalidName(name.to_string()));
        }
        Ok(path::join(&self.path(), name))
    }

    /// Fetch the child's record and wrap it in the matching node type.
    pub async fn lookup(&self, name: &str) -> Result<Node> {
        let child = self.child_path(name)?;
        debug!(dir = %self.path(), name, "lookup");
        match self.fs.fetch_record(&child).await? {
            Some(record) => Ok(self.fs.node_for(record)),
            None => Err(FsError::NotFound(child)),
        }
    }

    /// Children in backing-store order.
    pub async fn list_children(&self) -> Result<Vec<DirEntry>> {
        list_children_of(&self.fs, &self.path()).await
    }

    pub async fn create_dir(&self, name: &str, mode: u32) -> Result<DirNode> {
        let child = self.child_path(name)?;
        self.ensure_absent(&child).await?;
        let id = self.fs.handles().next_id();
        let record = InodeRecord::new_dir(&self.path(), name, mode, id);
        self.fs
            .store()
            .put_value(Region::Metadata, &child, &record)
            .await?;
        info!(path = %child, id, "created directory");
        Ok(DirNode::new(self.fs.clone(), record))
    }

    /// Create an empty file and return it together with an open handle. The
    /// record id and the handle id are the same allocation.
    pub async fn create_file(&self, name: &str, mode: u32) -> Result<(FileNode, FileHandle)> {
        let child = self.child_path(name)?;
        self.ensure_absent(&child).await?;
        let id = self.fs.handles().next_id();
        let record = InodeRecord::new_file(&self.path(), name, mode, id);
        self.fs
            .store()
            .put_value(Region::Metadata, &child, &record)
            .await?;
        info!(path = %child, id, "created file");
        let handle = FileHandle::new(self.fs.clone(), id, record.clone());
        Ok((FileNode::new(self.fs.clone(), record), handle))
    }

    /// Remove a child. Files lose their content blob as well; directories must
    /// be empty.
    pub async fn remove_entry(&self, name: &str) -> Result<()> {
        let child = self.child_path(name)?;
        let Some(record) = self.fs.fetch_record(&child).await? else {
            return Err(FsError::NotFound(child));
        };
        let store = self.fs.store();
        if record.is_directory {
            if !list_children_of(&self.fs, &child).await?.is_empty() {
                return Err(FsError::NotEmpty(child));
            }
        } else {
            store.remove(Region::Blocks, &child).await?;
        }
        store.remove(Region::Metadata, &child).await?;
        info!(path = %child, dir = record.is_directory, "removed entry");
        Ok(())
    }

    /// Open a handle on this directory, e.g. for enumeration by handle.
    pub fn open(&self) -> FileHandle {
        FileHandle::new(
            self.fs.clone(),
            self.fs.handles().next_id(),
            self.record.clone(),
        )
    }

    /// Only the mode applies to directories. The implicit root is not stored
    /// and keeps its attributes.
    pub async fn set_attr(&mut self, change: AttrChange) -> Result<FileAttr> {
        if self.record.is_root() {
            return Ok(self.attr());
        }
        if let Some(mode) = change.mode {
            self.record.mode = mode & 0o7777;
        }
        self.fs
            .store()
            .put_value(Region::Metadata, &self.path(), &self.record)
            .await?;
        Ok(self.attr())
    }

    async fn ensure_absent(&self, child: &str) -> Result<()> {
        if self.fs.fetch_record(child).await?.is_some() {
            return Err(FsError::AlreadyExists(child.to_string()));
        }
        Ok(())
    }
}

/// Query the `metadata` region for records whose `parent` is `dir`.
pub(crate) async fn list_children_of(fs: &GridFs, dir: &str) -> Result<Vec<DirEntry>> {
    let records: Vec<InodeRecord> = fs
        .store()
        .query_values(&Query::parent_equals(dir))
        .await?;
    let mut out = Vec::with_capacity(records.len());
    for record in &records {
        if !path::is_valid_name(&record.name) {
            warn!(dir, ?record, "skipping malformed child record");
            continue;
        }
        out.push(DirEntry::from(record));
    }
    debug!(dir, count = out.len(), "listed children");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreClient};
    use crate::vfs::node::FileType;
    use crate::vfs::test_support::faulty_fs;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn memfs() -> (GridFs, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let fs = GridFs::new(StoreClient::from_arc(store.clone()));
        (fs, store)
    }

    fn names(entries: &[DirEntry]) -> HashSet<String> {
        entries.iter().map(|e| e.name.clone()).collect()
    }

    #[tokio::test]
    async fn lookup_missing_is_not_found() {
        let (fs, _) = memfs();
        let err = fs.root().lookup("nonexistent").await.err().unwrap();
        assert!(matches!(err, FsError::NotFound(ref p) if p == "/nonexistent"));
        assert_eq!(err.errno(), libc::ENOENT);
    }

    #[tokio::test]
    async fn lookup_returns_matching_node_type() {
        let (fs, _) = memfs();
        let root = fs.root();
        root.create_dir("d", 0o755).await.unwrap();
        root.create_file("f", 0o644).await.unwrap();

        assert!(matches!(root.lookup("d").await.unwrap(), Node::Dir(_)));
        assert!(matches!(root.lookup("f").await.unwrap(), Node::File(_)));
    }

    #[tokio::test]
    async fn create_persists_record_under_full_path() {
        let (fs, _) = memfs();
        let d = fs.root().create_dir("d", 0o40750).await.unwrap();
        assert_eq!(d.path(), "/d");
        let (file, handle) = d.create_file("f", 0o100640).await.unwrap();

        let stored = fs.fetch_record("/d/f").await.unwrap().unwrap();
        assert_eq!(stored.name, "f");
        assert_eq!(stored.parent, "/d");
        assert_eq!(stored.size, 0);
        assert!(!stored.is_directory);
        assert_eq!(stored.mode, 0o640);
        assert_eq!(stored.id, handle.id());
        assert_eq!(file.attr().id, handle.id());

        let dir_rec = fs.fetch_record("/d").await.unwrap().unwrap();
        assert!(dir_rec.is_directory);
        assert_eq!(dir_rec.mode, 0o750);
    }

    #[tokio::test]
    async fn listing_reflects_creates_and_removes() {
        let (fs, _) = memfs();
        let dir = fs.root().create_dir("dir", 0o755).await.unwrap();
        assert!(dir.list_children().await.unwrap().is_empty());

        dir.create_file("a", 0o644).await.unwrap();
        dir.create_file("b", 0o644).await.unwrap();
        let entries = dir.list_children().await.unwrap();
        assert_eq!(names(&entries), HashSet::from(["a".to_string(), "b".to_string()]));

        dir.remove_entry("a").await.unwrap();
        let entries = dir.list_children().await.unwrap();
        assert_eq!(names(&entries), HashSet::from(["b".to_string()]));
    }

    #[tokio::test]
    async fn listing_reports_entry_types_and_excludes_grandchildren() {
        let (fs, _) = memfs();
        let root = fs.root();
        let sub = root.create_dir("sub", 0o755).await.unwrap();
        root.create_file("top", 0o644).await.unwrap();
        sub.create_file("deep", 0o644).await.unwrap();

        let entries = root.list_children().await.unwrap();
        assert_eq!(entries.len(), 2);
        for e in entries {
            match e.name.as_str() {
                "sub" => assert_eq!(e.kind, FileType::Dir),
                "top" => assert_eq!(e.kind, FileType::File),
                other => panic!("unexpected entry {other}"),
            }
        }
    }

    #[tokio::test]
    async fn create_existing_name_fails() {
        let (fs, _) = memfs();
        let root = fs.root();
        root.create_file("x", 0o644).await.unwrap();
        assert!(matches!(
            root.create_file("x", 0o644).await,
            Err(FsError::AlreadyExists(_))
        ));
        assert!(matches!(
            root.create_dir("x", 0o755).await,
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let (fs, store) = memfs();
        let root = fs.root();
        for bad in ["", ".", "..", "a/b"] {
            assert!(matches!(
                root.create_file(bad, 0o644).await,
                Err(FsError::InvalidName(_))
            ));
        }
        assert_eq!(store.count(Region::Metadata).await, 0);
    }

    #[tokio::test]
    async fn removing_a_file_drops_its_blob() {
        let (fs, store) = memfs();
        let (_, handle) = fs.root().create_file("f", 0o644).await.unwrap();
        handle.write(b"payload", 0).await.unwrap();
        assert_eq!(store.count(Region::Blocks).await, 1);

        fs.root().remove_entry("f").await.unwrap();
        assert_eq!(store.count(Region::Blocks).await, 0);
        assert_eq!(store.count(Region::Metadata).await, 0);
    }

    #[tokio::test]
    async fn removing_nonempty_directory_is_rejected() {
        let (fs, _) = memfs();
        let root = fs.root();
        let d = root.create_dir("d", 0o755).await.unwrap();
        d.create_file("f", 0o644).await.unwrap();

        let err = root.remove_entry("d").await.err().unwrap();
        assert!(matches!(err, FsError::NotEmpty(_)));
        assert_eq!(err.errno(), libc::ENOTEMPTY);

        d.remove_entry("f").await.unwrap();
        root.remove_entry("d").await.unwrap();
        assert!(matches!(root.lookup("d").await, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn removing_missing_entry_is_not_found() {
        let (fs, _) = memfs();
        assert!(matches!(
            fs.root().remove_entry("ghost").await,
            Err(FsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn directory_mode_change_persists() {
        let (fs, _) = memfs();
        let mut d = fs.root().create_dir("d", 0o755).await.unwrap();
        d.set_attr(AttrChange {
            mode: Some(0o700),
            size: None,
        })
        .await
        .unwrap();
        let fresh = fs.root().lookup("d").await.unwrap();
        assert_eq!(fresh.attr().perm, 0o700);

        let mut root = fs.root();
        let attr = root
            .set_attr(AttrChange {
                mode: Some(0o700),
                size: None,
            })
            .await
            .unwrap();
        assert_eq!(attr.perm, 0o755);
    }

    #[tokio::test]
    async fn handle_on_directory_lists_children() {
        let (fs, _) = memfs();
        let d = fs.root().create_dir("d", 0o755).await.unwrap();
        d.create_file("one", 0o644).await.unwrap();
        let handle = d.open();
        let entries = handle.list_children().await.unwrap();
        assert_eq!(names(&entries), HashSet::from(["one".to_string()]));
    }

    #[tokio::test]
    async fn store_failures_surface_without_retry() {
        let (fs, faulty) = faulty_fs();
        let root = fs.root();

        faulty.fail_puts(Region::Metadata, true);
        let err = root.create_dir("d", 0o755).await.err().unwrap();
        assert!(matches!(err, FsError::Store(_)));
        assert_eq!(err.errno(), libc::EIO);
        assert_eq!(faulty.put_attempts(Region::Metadata), 1);
        faulty.fail_puts(Region::Metadata, false);

        faulty.fail_queries(true);
        assert!(matches!(root.list_children().await, Err(FsError::Store(_))));
    }

    #[tokio::test]
    async fn malformed_children_are_skipped() {
        let (fs, store) = memfs();
        fs.root().create_file("ok", 0o644).await.unwrap();
        let broken = InodeRecord {
            name: String::new(),
            parent: "/".into(),
            ..Default::default()
        };
        fs.store()
            .put_value(Region::Metadata, "/broken", &broken)
            .await
            .unwrap();
        assert_eq!(store.count(Region::Metadata).await, 2);

        let entries = fs.root().list_children().await.unwrap();
        assert_eq!(names(&entries), HashSet::from(["ok".to_string()]));
    }
}
