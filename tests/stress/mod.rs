//! Stress tests for the backpressure engine.
//!
//! ## What We Test
//!
//! - **High volume**: Hundreds of thousands of tasks through one pool
//! - **High contention**: Many threads racing on the breaker and the bucket
//! - **Overload**: Producers outrunning the workers, with shedding and resizing
//! - **State consistency**: Counters that add up after the dust settles

pub mod circuitbreaker;
pub mod engine;
pub mod pool;
pub mod ratelimiter;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Utility: Track peak concurrent operations
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn enter(&self) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
