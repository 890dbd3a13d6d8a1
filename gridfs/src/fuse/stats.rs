//! Operation counters exposed by the diagnostics endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct OpStats {
    lookups: AtomicU64,
    getattrs: AtomicU64,
    setattrs: AtomicU64,
    mkdirs: AtomicU64,
    creates: AtomicU64,
    removes: AtomicU64,
    opens: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    readdirs: AtomicU64,
    errors: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    open_handles: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lookups: u64,
    pub getattrs: u64,
    pub setattrs: u64,
    pub mkdirs: u64,
    pub creates: u64,
    pub removes: u64,
    pub opens: u64,
    pub reads: u64,
    pub writes: u64,
    pub readdirs: u64,
    pub errors: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub open_handles: u64,
}

#[derive(Clone, Copy, Debug)]
pub enum Op {
    Lookup,
    Getattr,
    Setattr,
    Mkdir,
    Create,
    Remove,
    Open,
    Read,
    Write,
    Readdir,
}

impl OpStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, op: Op) {
        let counter = match op {
            Op::Lookup => &self.lookups,
            Op::Getattr => &self.getattrs,
            Op::Setattr => &self.setattrs,
            Op::Mkdir => &self.mkdirs,
            Op::Create => &self.creates,
            Op::Remove => &self.removes,
            Op::Open => &self.opens,
            Op::Read => &self.reads,
            Op::Write => &self.writes,
            Op::Readdir => &self.readdirs,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_read_bytes(&self, n: usize) {
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_written_bytes(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn set_open_handles(&self, n: usize) {
        self.open_handles.store(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            lookups: load(&self.lookups),
            getattrs: load(&self.getattrs),
            setattrs: load(&self.setattrs),
            mkdirs: load(&self.mkdirs),
            creates: load(&self.creates),
            removes: load(&self.removes),
            opens: load(&self.opens),
            reads: load(&self.reads),
            writes: load(&self.writes),
            readdirs: load(&self.readdirs),
            errors: load(&self.errors),
            bytes_read: load(&self.bytes_read),
            bytes_written: load(&self.bytes_written),
            open_handles: load(&self.open_handles),
        }
    }
}
