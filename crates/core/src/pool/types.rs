use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

use crate::task::TaskKind;

/// Point-in-time view of one pool, served by the status API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub name: String,
    pub kind: TaskKind,
    pub topic: String,
    pub running: bool,
    pub active_tasks: u64,
    pub concurrency_limit: usize,
    pub total_processed: u64,
    pub total_retried: u64,
    pub total_failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    pub running: AtomicBool,
    pub active: AtomicU64,
    pub total_processed: AtomicU64,
    pub total_retried: AtomicU64,
    pub total_failed: AtomicU64,
}

impl PoolStats {
    pub fn to_status(&self, name: &str, kind: TaskKind, concurrency_limit: usize) -> PoolStatus {
        PoolStatus {
            name: name.to_string(),
            kind,
            topic: kind.topic().to_string(),
            running: self.running.load(Ordering::SeqCst),
            active_tasks: self.active.load(Ordering::SeqCst),
            concurrency_limit,
            total_processed: self.total_processed.load(Ordering::SeqCst),
            total_retried: self.total_retried.load(Ordering::SeqCst),
            total_failed: self.total_failed.load(Ordering::SeqCst),
        }
    }
}
