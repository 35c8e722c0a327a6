use backpressure_core::BackpressureError;
use std::time::Duration;

/// Errors that can occur when using the rate limiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateLimiterError {
    /// No token was available.
    #[error("rate limit exceeded")]
    RateLimitExceeded {
        /// Time until the next token accrues; `None` if the bucket never refills.
        retry_after: Option<Duration>,
    },
}

impl<E> From<RateLimiterError> for BackpressureError<E> {
    fn from(err: RateLimiterError) -> Self {
        match err {
            RateLimiterError::RateLimitExceeded { retry_after } => {
                BackpressureError::RateLimited { retry_after }
            }
        }
    }
}
