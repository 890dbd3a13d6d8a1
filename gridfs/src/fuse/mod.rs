//! FUSE adapter.
//!
//! `GridFuse` implements the rfuse3 raw `Filesystem` trait on top of [`GridFs`].
//! The kernel addresses entries by inode number and open files by handle
//! number; both are translated here into paths and [`FileHandle`]s:
//! - `inode`: per-session inode number <-> path table.
//! - `mount`: session setup and teardown.
//! - `stats`: operation counters served by the diagnostics endpoint.
//!
//! Request handling lives in inherent methods that speak vfs types; the trait
//! impl only converts to and from rfuse3 reply structs.
pub mod inode;
pub mod mount;
pub mod stats;

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use rfuse3::Result as FuseResult;
use rfuse3::raw::Filesystem;
use rfuse3::raw::Request;
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, ReplyAttr, ReplyCreated, ReplyData, ReplyDirectory,
    ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs, ReplyWrite,
};
use rfuse3::{Errno, FileType as FuseFileType, SetAttr, Timestamp};
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::meta::path;
use crate::vfs::{
    AttrChange, DirEntry, DirNode, FileAttr as VfsFileAttr, FileHandle, FileType as VfsFileType,
    FsError, GridFs, MAX_BLOB_SIZE, Node,
};
use inode::{InodeTable, ROOT_INODE};
use stats::{Op, OpStats};

const MAX_WRITE: u32 = MAX_BLOB_SIZE as u32;
const TTL: Duration = Duration::from_secs(1);
const BLOCK_SIZE: u32 = 4096;

pub struct GridFuse {
    fs: GridFs,
    inodes: InodeTable,
    open: RwLock<HashMap<u64, Arc<FileHandle>>>,
    stats: Arc<OpStats>,
}

impl GridFuse {
    pub fn new(fs: GridFs) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
            open: RwLock::new(HashMap::new()),
            stats: Arc::new(OpStats::new()),
        }
    }

    pub fn fs(&self) -> &GridFs {
        &self.fs
    }

    /// Shared counters; clone before the adapter is moved into a session.
    pub fn stats(&self) -> Arc<OpStats> {
        Arc::clone(&self.stats)
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub async fn open_handles(&self) -> usize {
        self.open.read().await.len()
    }

    fn fail(&self, op: &str, err: FsError) -> Errno {
        self.stats.record_error();
        match &err {
            FsError::NotFound(_) => debug!(op, error = %err, "request failed"),
            _ => warn!(op, error = %err, "request failed"),
        }
        err.errno().into()
    }

    /// Names that are not valid UTF-8 fail with EINVAL.
    fn name_str<'n>(&self, op: &str, name: &'n OsStr) -> FuseResult<&'n str> {
        name.to_str().ok_or_else(|| {
            self.fail(op, FsError::InvalidName(name.to_string_lossy().into_owned()))
        })
    }

    async fn path_of(&self, ino: u64) -> FuseResult<String> {
        match self.inodes.path_of(ino).await {
            Some(p) => Ok(p),
            None => Err(libc::ENOENT.into()),
        }
    }

    async fn node_of(&self, op: &str, ino: u64) -> FuseResult<Node> {
        let full = self.path_of(ino).await?;
        match self.fs.resolve(&full).await {
            Ok(node) => Ok(node),
            Err(e) => {
                if matches!(e, FsError::NotFound(_)) {
                    self.inodes.forget_path(&full).await;
                }
                Err(self.fail(op, e))
            }
        }
    }

    async fn dir_of(&self, op: &str, ino: u64) -> FuseResult<DirNode> {
        self.node_of(op, ino)
            .await?
            .into_dir()
            .map_err(|e| self.fail(op, e))
    }

    async fn register(&self, handle: FileHandle) -> u64 {
        let fh = handle.id();
        let mut open = self.open.write().await;
        open.insert(fh, Arc::new(handle));
        self.stats.set_open_handles(open.len());
        fh
    }

    async fn handle(&self, fh: u64) -> Option<Arc<FileHandle>> {
        self.open.read().await.get(&fh).cloned()
    }

    /// Handle for `fh`, or a fresh one for `ino` if the kernel sent a handle
    /// number this session never issued.
    async fn handle_or_open(&self, op: &str, ino: u64, fh: u64) -> FuseResult<Arc<FileHandle>> {
        if let Some(h) = self.handle(fh).await {
            return Ok(h);
        }
        debug!(op, ino, fh, "unknown handle, opening by inode");
        let file = self
            .node_of(op, ino)
            .await?
            .into_file()
            .map_err(|e| self.fail(op, e))?;
        Ok(Arc::new(file.open()))
    }

    async fn release_handle(&self, fh: u64) {
        let mut open = self.open.write().await;
        open.remove(&fh);
        self.stats.set_open_handles(open.len());
    }

    pub async fn lookup_entry(&self, parent: u64, name: &str) -> FuseResult<(u64, VfsFileAttr)> {
        self.stats.record(Op::Lookup);
        let dir = self.dir_of("lookup", parent).await?;
        let node = dir.lookup(name).await.map_err(|e| self.fail("lookup", e))?;
        let ino = self.inodes.ino_for(&node.path()).await;
        Ok((ino, node.attr()))
    }

    pub async fn get_attr(&self, ino: u64) -> FuseResult<VfsFileAttr> {
        self.stats.record(Op::Getattr);
        Ok(self.node_of("getattr", ino).await?.attr())
    }

    pub async fn set_attr(&self, ino: u64, change: AttrChange) -> FuseResult<VfsFileAttr> {
        self.stats.record(Op::Setattr);
        let mut node = self.node_of("setattr", ino).await?;
        if change.mode.is_none() && change.size.is_none() {
            return Ok(node.attr());
        }
        node.set_attr(change)
            .await
            .map_err(|e| self.fail("setattr", e))
    }

    pub async fn make_dir(
        &self,
        parent: u64,
        name: &str,
        mode: u32,
    ) -> FuseResult<(u64, VfsFileAttr)> {
        self.stats.record(Op::Mkdir);
        let dir = self.dir_of("mkdir", parent).await?;
        let child = dir
            .create_dir(name, mode)
            .await
            .map_err(|e| self.fail("mkdir", e))?;
        let ino = self.inodes.ino_for(&child.path()).await;
        Ok((ino, child.attr()))
    }

    pub async fn create_file(
        &self,
        parent: u64,
        name: &str,
        mode: u32,
    ) -> FuseResult<(u64, u64, VfsFileAttr)> {
        self.stats.record(Op::Create);
        let dir = self.dir_of("create", parent).await?;
        let (file, handle) = dir
            .create_file(name, mode)
            .await
            .map_err(|e| self.fail("create", e))?;
        let ino = self.inodes.ino_for(&file.path()).await;
        let fh = self.register(handle).await;
        Ok((ino, fh, file.attr()))
    }

    /// Remove `name` from `parent`. `want_dir` selects rmdir semantics.
    pub async fn remove(&self, parent: u64, name: &str, want_dir: bool) -> FuseResult<()> {
        self.stats.record(Op::Remove);
        let op = if want_dir { "rmdir" } else { "unlink" };
        let dir = self.dir_of(op, parent).await?;
        let target = dir.lookup(name).await.map_err(|e| self.fail(op, e))?;
        match (target.kind(), want_dir) {
            (VfsFileType::Dir, false) => {
                return Err(self.fail(op, FsError::IsADirectory(target.path())));
            }
            (VfsFileType::File, true) => {
                return Err(self.fail(op, FsError::NotADirectory(target.path())));
            }
            _ => {}
        }
        dir.remove_entry(name).await.map_err(|e| self.fail(op, e))?;
        self.inodes.forget_path(&target.path()).await;
        Ok(())
    }

    pub async fn open_file(&self, ino: u64) -> FuseResult<u64> {
        self.stats.record(Op::Open);
        let file = self
            .node_of("open", ino)
            .await?
            .into_file()
            .map_err(|e| self.fail("open", e))?;
        Ok(self.register(file.open()).await)
    }

    pub async fn open_dir(&self, ino: u64) -> FuseResult<u64> {
        let dir = self.dir_of("opendir", ino).await?;
        Ok(self.register(dir.open()).await)
    }

    /// Bytes `[offset, offset + size)` of the file, clipped to its length.
    pub async fn read_range(&self, ino: u64, fh: u64, offset: u64, size: u32) -> FuseResult<Bytes> {
        self.stats.record(Op::Read);
        let handle = self.handle_or_open("read", ino, fh).await?;
        let data = handle
            .read(offset)
            .await
            .map_err(|e| self.fail("read", e))?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(size as usize).min(data.len());
        self.stats.add_read_bytes(end - start);
        Ok(data.slice(start..end))
    }

    pub async fn write_data(&self, ino: u64, fh: u64, offset: u64, data: &[u8]) -> FuseResult<u32> {
        self.stats.record(Op::Write);
        let handle = self.handle_or_open("write", ino, fh).await?;
        let n = handle
            .write(data, offset)
            .await
            .map_err(|e| self.fail("write", e))?;
        self.stats.add_written_bytes(n);
        u32::try_from(n).map_err(|_| libc::EFBIG.into())
    }

    pub async fn close(&self, fh: u64) {
        self.release_handle(fh).await;
    }

    /// Children of directory `ino`, read through its open handle when there is one.
    pub async fn list_dir(&self, ino: u64, fh: u64) -> FuseResult<(String, Vec<DirEntry>)> {
        self.stats.record(Op::Readdir);
        let dir_path = self.path_of(ino).await?;
        let entries = match self.handle(fh).await {
            Some(h) if h.path() == dir_path => h.list_children().await,
            _ => self.dir_of("readdir", ino).await?.list_children().await,
        };
        let entries = entries.map_err(|e| self.fail("readdir", e))?;
        Ok((dir_path, entries))
    }

    async fn child_ino(&self, dir_path: &str, name: &str) -> u64 {
        self.inodes.ino_for(&path::join(dir_path, name)).await
    }
}

impl Filesystem for GridFuse {
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        info!("fuse session initialised");
        let max_write = NonZeroU32::new(MAX_WRITE).unwrap_or(NonZeroU32::MIN);
        Ok(ReplyInit { max_write })
    }

    async fn destroy(&self, _req: Request) {
        let mut open = self.open.write().await;
        if !open.is_empty() {
            debug!(count = open.len(), "dropping open handles on destroy");
        }
        open.clear();
        self.stats.set_open_handles(0);
        info!("fuse session destroyed");
    }

    async fn lookup(&self, req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        let name = self.name_str("lookup", name)?;
        let (ino, attr) = self.lookup_entry(parent, name).await?;
        Ok(ReplyEntry {
            ttl: TTL,
            attr: to_fuse_attr(ino, &attr, req.uid, req.gid),
            generation: 0,
        })
    }

    // Inode numbers live until their path is removed, so lookup counts are not tracked.
    async fn forget(&self, _req: Request, _inode: u64, _nlookup: u64) {}

    async fn batch_forget(&self, _req: Request, _inodes: &[(u64, u64)]) {}

    // Requests are short store round trips and are never cancelled midway.
    async fn interrupt(&self, _req: Request, _unique: u64) -> FuseResult<()> {
        Ok(())
    }

    async fn getattr(
        &self,
        req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        let attr = self.get_attr(ino).await?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: to_fuse_attr(ino, &attr, req.uid, req.gid),
        })
    }

    // Only mode and size are stored; ownership and timestamps are accepted and dropped.
    async fn setattr(
        &self,
        req: Request,
        ino: u64,
        _fh: Option<u64>,
        set_attr: SetAttr,
    ) -> FuseResult<ReplyAttr> {
        let change = AttrChange {
            mode: set_attr.mode,
            size: set_attr.size,
        };
        let attr = self.set_attr(ino, change).await?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: to_fuse_attr(ino, &attr, req.uid, req.gid),
        })
    }

    async fn mkdir(
        &self,
        req: Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
    ) -> FuseResult<ReplyEntry> {
        let name = self.name_str("mkdir", name)?;
        let (ino, attr) = self.make_dir(parent, name, mode & !umask).await?;
        Ok(ReplyEntry {
            ttl: TTL,
            attr: to_fuse_attr(ino, &attr, req.uid, req.gid),
            generation: 0,
        })
    }

    async fn create(
        &self,
        req: Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _flags: u32,
    ) -> FuseResult<ReplyCreated> {
        let name = self.name_str("create", name)?;
        let (ino, fh, attr) = self.create_file(parent, name, mode).await?;
        Ok(ReplyCreated {
            ttl: TTL,
            attr: to_fuse_attr(ino, &attr, req.uid, req.gid),
            generation: 0,
            fh,
            flags: 0,
        })
    }

    async fn unlink(&self, _req: Request, parent: u64, name: &OsStr) -> FuseResult<()> {
        let name = self.name_str("unlink", name)?;
        self.remove(parent, name, false).await
    }

    async fn rmdir(&self, _req: Request, parent: u64, name: &OsStr) -> FuseResult<()> {
        let name = self.name_str("rmdir", name)?;
        self.remove(parent, name, true).await
    }

    async fn open(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        let fh = self.open_file(ino).await?;
        Ok(ReplyOpen { fh, flags: 0 })
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        let fh = self.open_dir(ino).await?;
        Ok(ReplyOpen { fh, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        let data = self.read_range(ino, fh, offset, size).await?;
        Ok(ReplyData { data })
    }

    async fn write(
        &self,
        _req: Request,
        ino: u64,
        fh: u64,
        offset: u64,
        data: &[u8],
        _write_flags: u32,
        _flags: u32,
    ) -> FuseResult<ReplyWrite> {
        let written = self.write_data(ino, fh, offset, data).await?;
        Ok(ReplyWrite { written })
    }

    async fn release(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        self.close(fh).await;
        Ok(())
    }

    async fn releasedir(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        _flags: u32,
    ) -> FuseResult<()> {
        self.close(fh).await;
        Ok(())
    }

    // Writes are already in the store by the time they are acknowledged.
    async fn flush(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _lock_owner: u64,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn fsync(&self, _req: Request, _inode: u64, _fh: u64, _datasync: bool) -> FuseResult<()> {
        Ok(())
    }

    async fn fsyncdir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _datasync: bool,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        let (dir_path, entries) = self.list_dir(ino, fh).await?;
        let parent_ino = self.inodes.parent_ino(&dir_path).await;

        // offset of each entry is the position of the one after it
        let mut all: Vec<DirectoryEntry> = Vec::with_capacity(entries.len() + 2);
        all.push(DirectoryEntry {
            inode: ino,
            kind: FuseFileType::Directory,
            name: OsString::from("."),
            offset: 1,
        });
        all.push(DirectoryEntry {
            inode: parent_ino,
            kind: FuseFileType::Directory,
            name: OsString::from(".."),
            offset: 2,
        });
        for (i, e) in entries.iter().enumerate() {
            all.push(DirectoryEntry {
                inode: self.child_ino(&dir_path, &e.name).await,
                kind: to_fuse_kind(e.kind),
                name: OsString::from(&e.name),
                offset: (i as i64) + 3,
            });
        }

        let start = usize::try_from(offset).unwrap_or(0).min(all.len());
        let rest: Vec<_> = all.split_off(start);
        let boxed: Self::DirEntryStream<'a> = Box::pin(stream::iter(rest.into_iter().map(Ok)));
        Ok(ReplyDirectory { entries: boxed })
    }

    async fn readdirplus<'a>(
        &'a self,
        req: Request,
        ino: u64,
        fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        let (dir_path, entries) = self.list_dir(ino, fh).await?;
        let self_attr = self.node_of("readdirplus", ino).await?.attr();
        let parent_ino = self.inodes.parent_ino(&dir_path).await;
        let parent_attr = match path::split(&dir_path) {
            Some((parent, _)) => self
                .fs
                .resolve(&parent)
                .await
                .map(|n| n.attr())
                .unwrap_or_else(|_| self_attr.clone()),
            None => self_attr.clone(),
        };

        let plus = |inode: u64, name: &str, attr: &VfsFileAttr, offset: i64| DirectoryEntryPlus {
            inode,
            generation: 0,
            kind: to_fuse_kind(attr.kind),
            name: OsString::from(name),
            offset,
            attr: to_fuse_attr(inode, attr, req.uid, req.gid),
            entry_ttl: TTL,
            attr_ttl: TTL,
        };

        let mut all: Vec<DirectoryEntryPlus> = Vec::with_capacity(entries.len() + 2);
        all.push(plus(ino, ".", &self_attr, 1));
        all.push(plus(parent_ino, "..", &parent_attr, 2));
        for (i, e) in entries.iter().enumerate() {
            let child = self.child_ino(&dir_path, &e.name).await;
            all.push(plus(child, &e.name, &e.attr, (i as i64) + 3));
        }

        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(all.len());
        let rest: Vec<_> = all.split_off(start);
        let boxed: Self::DirEntryPlusStream<'a> =
            Box::pin(stream::iter(rest.into_iter().map(Ok)));
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    // Capacity is whatever the store has; report placeholders.
    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        Ok(ReplyStatFs {
            blocks: 0,
            bfree: 0,
            bavail: 0,
            files: self.inodes.len().await as u64,
            ffree: u64::MAX,
            bsize: BLOCK_SIZE,
            namelen: 255,
            frsize: BLOCK_SIZE,
        })
    }
}

fn to_fuse_kind(kind: VfsFileType) -> FuseFileType {
    match kind {
        VfsFileType::Dir => FuseFileType::Directory,
        VfsFileType::File => FuseFileType::RegularFile,
    }
}

/// Kernel attributes for `attr`. Records keep no owner or timestamps, so
/// entries belong to the caller and report the current time.
fn to_fuse_attr(ino: u64, attr: &VfsFileAttr, uid: u32, gid: u32) -> rfuse3::raw::reply::FileAttr {
    let now = Timestamp::from(SystemTime::now());
    let nlink = match attr.kind {
        VfsFileType::Dir => 2,
        VfsFileType::File => 1,
    };
    rfuse3::raw::reply::FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: now,
        mtime: now,
        ctime: now,
        #[cfg(target_os = "macos")]
        crtime: now,
        kind: to_fuse_kind(attr.kind),
        perm: (attr.perm & 0o7777) as u16,
        nlink,
        uid,
        gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: BLOCK_SIZE,
    }
}


#[cfg(all(test, target_os = "linux"))]
mod mount_tests {
    use super::*;
    use crate::fuse::mount::{MountSettings, mount_gridfs};
    use crate::store::{InMemoryStore, StoreClient};
    use std::fs;
    use std::io::Write;

    // Mount smoke test; needs /dev/fuse and fusermount3. Set GRIDFS_FUSE_TEST=1.
    #[tokio::test]
    async fn smoke_mount_and_basic_ops() {
        if std::env::var("GRIDFS_FUSE_TEST").ok().as_deref() != Some("1") {
            eprintln!("skip fuse mount test: set GRIDFS_FUSE_TEST=1 to enable");
            return;
        }

        let fs = GridFs::new(StoreClient::new(InMemoryStore::new()));
        let mnt = tempfile::tempdir().expect("tmp mount");
        let mnt_path = mnt.path().to_path_buf();

        let settings = MountSettings {
            unprivileged: true,
            allow_other: false,
        };
        let handle = match mount_gridfs(GridFuse::new(fs), &mnt_path, &settings).await {
            Ok(h) => h,
            Err(e) => {
                eprintln!("skip fuse test: mount failed: {}", e);
                return;
            }
        };

        tokio::time::sleep(Duration::from_millis(2000)).await;

        let dir = mnt_path.join("a");
        fs::create_dir(&dir).expect("mkdir");
        let file_path = dir.join("hello.txt");
        {
            let mut f = fs::File::create(&file_path).expect("create");
            f.write_all(b"hello gridfs").expect("write");
        }
        let content = fs::read(&file_path).expect("read");
        assert_eq!(content, b"hello gridfs");

        let names: Vec<_> = fs::read_dir(&dir)
            .expect("readdir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("hello.txt")]);

        fs::remove_file(&file_path).expect("unlink");
        fs::remove_dir(&dir).expect("rmdir");

        if let Err(e) = handle.unmount().await {
            eprintln!("unmount error: {}", e);
        }
    }
}
