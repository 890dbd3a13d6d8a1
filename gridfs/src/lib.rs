//! gridfs: a FUSE filesystem whose tree and file contents live in a remote
//! key-value store.
//!
//! - `store`: region-scoped get/put/remove/query over a backing store
//! - `meta`: the persisted inode record and path helpers
//! - `vfs`: directory, file and handle operations over the store
//! - `fuse`: rfuse3 adapter and mount helpers
//! - `daemon`: diagnostics HTTP endpoint
//! - `config`: command line and YAML configuration

pub mod config;
pub mod daemon;
pub mod fuse;
pub mod meta;
pub mod store;
pub mod vfs;
