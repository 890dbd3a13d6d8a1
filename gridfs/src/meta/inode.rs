//! The metadata unit stored per entry.

use serde::{Deserialize, Serialize};

use super::path;

/// Permission bits reported for directories whose stored mode is zero.
pub const DEFAULT_DIR_PERM: u32 = 0o755;

/// One filesystem entry as persisted in the `metadata` region.
///
/// The record is keyed by `join(parent, name)`; `mode` holds permission bits
/// only, the entry type lives in `is_directory`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InodeRecord {
    pub name: String,
    pub parent: String,
    pub size: u64,
    pub is_directory: bool,
    pub mode: u32,
    pub id: u64,
}

impl InodeRecord {
    /// Implicit record for "/". It is never written to the store.
    pub fn root() -> Self {
        Self {
            name: path::ROOT.to_string(),
            parent: String::new(),
            is_directory: true,
            mode: DEFAULT_DIR_PERM,
            ..Default::default()
        }
    }

    pub fn new_dir(parent: &str, name: &str, mode: u32, id: u64) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.to_string(),
            size: 0,
            is_directory: true,
            mode: mode & 0o7777,
            id,
        }
    }

    pub fn new_file(parent: &str, name: &str, mode: u32, id: u64) -> Self {
        Self {
            is_directory: false,
            ..Self::new_dir(parent, name, mode, id)
        }
    }

    /// Canonical key of this entry in both regions.
    pub fn full_path(&self) -> String {
        path::join(&self.parent, &self.name)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_empty() && self.name == path::ROOT
    }

    /// Basic shape check against the key the record was fetched under.
    pub fn is_consistent_with(&self, key: &str) -> bool {
        path::is_valid_name(&self.name) && self.parent.starts_with('/') && self.full_path() == key
    }
}
