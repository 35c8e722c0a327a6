//! Core infrastructure for backpressure.
//!
//! This crate provides shared functionality used across all backpressure components:
//! - Event system for observability
//! - Task priorities and the load snapshot consumed by the shedder
//! - A unified error type for every rejection the engine can produce
//! - A clock abstraction so time-driven components can be tested deterministically

pub mod clock;
pub mod error;
pub mod events;
pub mod load;
pub mod priority;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{BackpressureError, ConfigError};
pub use events::{BackpressureEvent, EventListener, EventListeners, FnListener};
pub use load::LoadMetrics;
pub use priority::Priority;
