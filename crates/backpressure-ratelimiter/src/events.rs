use backpressure_core::BackpressureEvent;
use std::time::{Duration, Instant};

/// Events emitted by the rate limiter.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A token was taken.
    PermitAcquired {
        /// Name of the rate limiter instance.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Whole tokens left after this acquisition.
        remaining: usize,
    },
    /// No token was available.
    PermitRejected {
        /// Name of the rate limiter instance.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Time until the next token accrues, if the bucket refills at all.
        retry_after: Option<Duration>,
    },
}

impl BackpressureEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::PermitAcquired { .. } => "permit_acquired",
            RateLimiterEvent::PermitRejected { .. } => "permit_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::PermitAcquired { timestamp, .. }
            | RateLimiterEvent::PermitRejected { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RateLimiterEvent::PermitAcquired { pattern_name, .. }
            | RateLimiterEvent::PermitRejected { pattern_name, .. } => pattern_name,
        }
    }
}
