//! VFS layer (virtual filesystem)
//!
//! Responsibilities:
//! - Model the tree as request-scoped views (`DirNode`, `FileNode`, `FileHandle`)
//!   built on demand from records fetched out of the `metadata` region.
//! - Translate every operation into backing-store calls; the store is the only
//!   source of truth and nothing is cached between operations.
//! - Allocate process-unique ids for new records and open handles.
//!
//! Submodules:
//! - `fs`: the filesystem root owning the store client and the allocator
//! - `handles`: the handle/id allocator
//! - `node`: attribute types and the directory/file node variant
//! - `dir`, `file`, `file_handle`: per-entry operations
//! - `error`: error kinds and their errno mapping
pub mod dir;
pub mod error;
pub mod file;
pub mod file_handle;
pub mod fs;
pub mod handles;
pub mod node;

#[cfg(test)]
pub(crate) mod test_support;

pub use dir::DirNode;
pub use error::{FsError, Result};
pub use file::{FileNode, MAX_BLOB_SIZE};
pub use file_handle::FileHandle;
pub use fs::GridFs;
pub use handles::HandleAllocator;
pub use node::{AttrChange, DirEntry, FileAttr, FileType, Node};
