//! Metadata schema
//!
//! Responsibilities:
//! - Define the `InodeRecord` persisted in the `metadata` region, one per entry,
//!   keyed by the entry's full path.
//! - Provide the path arithmetic that turns `(parent, name)` pairs into the
//!   canonical keys used by both regions.
//!
//! Submodules:
//! - `inode`: the serializable record
//! - `path`: full-path join/split/normalize helpers
pub mod inode;
pub mod path;

pub use inode::InodeRecord;
