//! Attribute types and the directory/file variant returned by resolution.

use super::dir::DirNode;
use super::error::{FsError, Result};
use super::file::FileNode;
use crate::meta::InodeRecord;
use crate::meta::inode::DEFAULT_DIR_PERM;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    File,
    Dir,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAttr {
    /// Record id assigned at creation (0 for the implicit root).
    pub id: u64,
    pub size: u64,
    /// Permission bits only.
    pub perm: u32,
    pub kind: FileType,
}

impl From<&InodeRecord> for FileAttr {
    fn from(rec: &InodeRecord) -> Self {
        let perm = rec.mode & 0o7777;
        if rec.is_directory {
            FileAttr {
                id: rec.id,
                size: 0,
                perm: if perm == 0 { DEFAULT_DIR_PERM } else { perm },
                kind: FileType::Dir,
            }
        } else {
            FileAttr {
                id: rec.id,
                size: rec.size,
                perm,
                kind: FileType::File,
            }
        }
    }
}

/// One child as reported by a directory listing.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileType,
    pub attr: FileAttr,
}

impl From<&InodeRecord> for DirEntry {
    fn from(rec: &InodeRecord) -> Self {
        let attr = FileAttr::from(rec);
        DirEntry {
            name: rec.name.clone(),
            kind: attr.kind,
            attr,
        }
    }
}

/// Requested attribute changes; `None` leaves a field untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct AttrChange {
    pub mode: Option<u32>,
    pub size: Option<u64>,
}

/// A resolved entry.
#[derive(Clone)]
pub enum Node {
    Dir(DirNode),
    File(FileNode),
}

impl Node {
    pub fn attr(&self) -> FileAttr {
        match self {
            Node::Dir(d) => d.attr(),
            Node::File(f) => f.attr(),
        }
    }

    pub fn kind(&self) -> FileType {
        match self {
            Node::Dir(_) => FileType::Dir,
            Node::File(_) => FileType::File,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Node::Dir(d) => d.path(),
            Node::File(f) => f.path(),
        }
    }

    pub fn into_dir(self) -> Result<DirNode> {
        match self {
            Node::Dir(d) => Ok(d),
            Node::File(f) => Err(FsError::NotADirectory(f.path())),
        }
    }

    pub fn into_file(self) -> Result<FileNode> {
        match self {
            Node::File(f) => Ok(f),
            Node::Dir(d) => Err(FsError::IsADirectory(d.path())),
        }
    }

    pub async fn set_attr(&mut self, change: AttrChange) -> Result<FileAttr> {
        match self {
            Node::Dir(d) => d.set_attr(change).await,
            Node::File(f) => f.set_attr(change).await,
        }
    }
}
