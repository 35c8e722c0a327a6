use crate::events::RateLimiterEvent;
use crate::limiter::TokenBucket;
use crate::RateLimiter;
use backpressure_core::error::ConfigError;
use backpressure_core::events::{EventListeners, FnListener};
use backpressure_core::{SharedClock, SystemClock};
use std::sync::Mutex;
use std::time::Duration;

/// Configuration for the rate limiter.
pub struct RateLimiterConfig {
    pub(crate) capacity: f64,
    pub(crate) refill_rate: f64,
    pub(crate) clock: SharedClock,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

impl RateLimiterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }
}

/// Builder for [`RateLimiter`].
pub struct RateLimiterConfigBuilder {
    capacity: f64,
    refill_rate: f64,
    clock: Option<SharedClock>,
    event_listeners: EventListeners<RateLimiterEvent>,
    name: String,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - capacity: 100 tokens
    /// - refill_rate: 100 tokens/second
    /// - clock: system clock
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            capacity: 100.0,
            refill_rate: 100.0,
            clock: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the bucket capacity, i.e. the largest burst that can be admitted at once.
    ///
    /// Must be positive.
    pub fn capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of tokens credited per second.
    ///
    /// Zero turns the bucket into a one-time burst of `capacity` acquisitions.
    pub fn refill_rate(mut self, per_second: f64) -> Self {
        self.refill_rate = per_second;
        self
    }

    /// Convenience for `refill_rate(n / period)`.
    pub fn refill(self, tokens: f64, period: Duration) -> Self {
        let secs = period.as_secs_f64();
        let rate = if secs > 0.0 { tokens / secs } else { f64::NAN };
        self.refill_rate(rate)
    }

    /// Sets the time source. Defaults to the system clock.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the name for this rate limiter instance (used in events and metrics).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when a token is taken.
    ///
    /// # Callback Signature
    /// `Fn(usize)` - Called with the number of whole tokens left.
    ///
    /// # Example
    /// ```rust
    /// use backpressure_ratelimiter::RateLimiter;
    ///
    /// let limiter = RateLimiter::builder()
    ///     .capacity(10.0)
    ///     .on_permit_acquired(|remaining| {
    ///         if remaining == 0 {
    ///             println!("bucket drained");
    ///         }
    ///     })
    ///     .build()
    ///     .unwrap();
    /// assert!(limiter.try_acquire());
    /// ```
    pub fn on_permit_acquired<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RateLimiterEvent| {
            if let RateLimiterEvent::PermitAcquired { remaining, .. } = event {
                f(*remaining);
            }
        }));
        self
    }

    /// Registers a callback when no token is available.
    ///
    /// # Callback Signature
    /// `Fn(Option<Duration>)` - Called with the time until the next token, or
    /// `None` when the bucket never refills.
    pub fn on_permit_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<Duration>) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RateLimiterEvent| {
            if let RateLimiterEvent::PermitRejected { retry_after, .. } = event {
                f(*retry_after);
            }
        }));
        self
    }

    /// Adds already-built listeners, e.g. ones collected by an engine builder.
    pub fn event_listeners(mut self, listeners: EventListeners<RateLimiterEvent>) -> Self {
        self.event_listeners.extend(listeners);
        self
    }

    /// Validates the configuration and builds the rate limiter.
    pub fn build(self) -> Result<RateLimiter, ConfigError> {
        if !self.capacity.is_finite() || self.capacity <= 0.0 {
            return Err(ConfigError::new(
                "capacity",
                format!("must be a positive number, got {}", self.capacity),
            ));
        }
        if !self.refill_rate.is_finite() || self.refill_rate < 0.0 {
            return Err(ConfigError::new(
                "refill_rate",
                format!("must be zero or positive, got {}", self.refill_rate),
            ));
        }

        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let bucket = TokenBucket::new(self.capacity, self.refill_rate, clock.now());
        let config = RateLimiterConfig {
            capacity: self.capacity,
            refill_rate: self.refill_rate,
            clock,
            event_listeners: self.event_listeners,
            name: self.name,
        };

        Ok(RateLimiter {
            bucket: Mutex::new(bucket),
            config,
        })
    }
}
