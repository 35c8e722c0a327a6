//! End-to-end tests for `backpressure::Engine`.
//!
//! Test organization:
//! - end_to_end.rs: Concurrency bound, hand-off queue, pool invariants
//! - shutdown.rs: Draining and the shutdown deadline
//! - config.rs: Plain configuration and validation
//! - events.rs: Listener wiring through the engine builder

mod config;
mod events;
mod shutdown;

use backpressure::CapacityControlConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Control loop that samples rarely and never resizes.
pub fn quiet_control() -> CapacityControlConfig {
    CapacityControlConfig {
        enabled: false,
        interval: Duration::from_secs(3600),
        ..CapacityControlConfig::default()
    }
}

/// Tracks how many task bodies run at once.
#[derive(Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
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
