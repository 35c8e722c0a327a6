//! Property-based tests for the backpressure primitives.
//!
//! Run with: cargo test --test property_tests
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold across all components.

pub mod rate_limiter;
pub mod shedder;
