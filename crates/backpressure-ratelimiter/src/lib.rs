//! Token bucket rate limiting for the backpressure engine.
//!
//! The limiter bounds the *rate* at which work is admitted, independently of
//! how much work runs concurrently.
//!
//! # Features
//!
//! - **Lazy refill**: tokens are credited on access from elapsed time, so no
//!   timer task exists that could leak
//! - **Non-blocking**: [`RateLimiter::try_acquire`] answers immediately; callers
//!   that want to wait compose it with their own timeout
//! - **Event system**: Observability through rate limiter events
//!
//! # Examples
//!
//! ```
//! use backpressure_ratelimiter::RateLimiter;
//!
//! // Bursts of up to 20, sustained 5 per second.
//! let limiter = RateLimiter::builder()
//!     .capacity(20.0)
//!     .refill_rate(5.0)
//!     .name("ingest")
//!     .build()
//!     .unwrap();
//!
//! for _ in 0..20 {
//!     assert!(limiter.try_acquire());
//! }
//! assert!(!limiter.try_acquire());
//! ```

mod config;
mod error;
mod events;
mod limiter;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use error::RateLimiterError;
pub use events::RateLimiterEvent;

use crate::limiter::TokenBucket;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// A token bucket rate limiter.
///
/// All state lives behind one short-lived lock that is held only for the
/// read-modify-write of the bucket.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Creates a new configuration builder.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Takes one token if one is available.
    pub fn try_acquire(&self) -> bool {
        self.check().is_ok()
    }

    /// Takes one token, reporting when the next one is due on rejection.
    pub fn check(&self) -> Result<(), RateLimiterError> {
        let now = self.config.clock.now();
        let (result, remaining) = {
            let mut bucket = self.bucket();
            let result = bucket.try_take(now);
            (result, bucket.available(now))
        };

        match result {
            Ok(()) => {
                self.config
                    .event_listeners
                    .emit(&RateLimiterEvent::PermitAcquired {
                        pattern_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        remaining: remaining as usize,
                    });

                #[cfg(feature = "metrics")]
                {
                    counter!("ratelimiter_calls_total", "ratelimiter" => self.config.name.clone(), "result" => "permitted").increment(1);
                    gauge!("ratelimiter_available_tokens", "ratelimiter" => self.config.name.clone())
                        .set(remaining);
                }

                Ok(())
            }
            Err(retry_after) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    ratelimiter = %self.config.name,
                    ?retry_after,
                    "rate limit exceeded"
                );

                self.config
                    .event_listeners
                    .emit(&RateLimiterEvent::PermitRejected {
                        pattern_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        retry_after,
                    });

                #[cfg(feature = "metrics")]
                counter!("ratelimiter_calls_total", "ratelimiter" => self.config.name.clone(), "result" => "rejected").increment(1);

                Err(RateLimiterError::RateLimitExceeded { retry_after })
            }
        }
    }

    /// Returns the tokens available right now, including fractional accrual.
    pub fn available_tokens(&self) -> f64 {
        let now = self.config.clock.now();
        self.bucket().available(now)
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> f64 {
        self.bucket().capacity()
    }

    /// Returns the configured refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        self.bucket().refill_rate()
    }

    /// Returns the instance name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn bucket(&self) -> MutexGuard<'_, TokenBucket> {
        // The bucket is always left consistent, so a poisoned lock is still usable.
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.config.name)
            .field("capacity", &self.config.capacity)
            .field("refill_rate", &self.config.refill_rate)
            .finish()
    }
}
