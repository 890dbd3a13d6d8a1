//! Process-wide id allocator for new records and open handles.

use std::sync::atomic::{AtomicU64, Ordering};

/// Strictly increasing ids starting at 1. Not persisted: a restart begins again,
/// so ids are only unique within one mounting process.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    last: AtomicU64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Most recently issued id, 0 if none.
    pub fn last_id(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}
