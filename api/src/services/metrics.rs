//! Model call counters exposed on /health

use std::sync::atomic::{AtomicU64, Ordering};

/// Approximate count of outbound model calls. Owned by application state and
/// handed to the analyzer and report generator.
#[derive(Debug, Default)]
pub struct ApiCallCounter {
    calls: AtomicU64,
}

impl ApiCallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}
