use std::time::{Duration, Instant};

/// Token bucket state.
///
/// Refill is computed lazily from the time elapsed since `last_refill`
/// whenever the bucket is touched; nothing runs in the background.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    /// Maximum number of tokens the bucket can hold.
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    /// Currently available tokens, always within `0..=capacity`.
    tokens: f64,
    /// Last time tokens were credited.
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub(crate) fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Credits tokens for the time elapsed since the last refill.
    fn refill(&mut self, now: Instant) {
        // A clock that reads earlier than last_refill credits nothing.
        let elapsed = now.saturating_duration_since(self.last_refill);
        if self.refill_rate > 0.0 {
            self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        }
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Takes one token if available.
    ///
    /// On rejection returns the time until one token will have accrued, or
    /// `None` when the bucket never refills. A wait too long for `Duration`
    /// saturates at `Duration::MAX`.
    pub(crate) fn try_take(&mut self, now: Instant) -> Result<(), Option<Duration>> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        if self.refill_rate > 0.0 {
            let missing = 1.0 - self.tokens;
            let wait = Duration::try_from_secs_f64(missing / self.refill_rate)
                .unwrap_or(Duration::MAX);
            Err(Some(wait))
        } else {
            Err(None)
        }
    }

    /// Returns the available tokens as of `now`.
    pub(crate) fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    pub(crate) fn capacity(&self) -> f64 {
        self.capacity
    }

    pub(crate) fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}
