//! Concurrency gate composed of a token bucket and a counting semaphore.

use crate::error::AdmissionError;
use backpressure_core::ConfigError;
use backpressure_ratelimiter::RateLimiter;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Bounds how many tasks execute at once and, optionally, how fast they start.
///
/// `acquire` consults the rate limiter first. A missing token is a hard
/// rejection: the caller is never queued behind the limiter. Only then does
/// it wait for one of `max_concurrency` slots.
///
/// # Examples
///
/// ```
/// use backpressure_pool::AdmissionController;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let admission = AdmissionController::builder()
///     .max_concurrency(2)
///     .build()
///     .unwrap();
///
/// let token = CancellationToken::new();
/// let mut ticket = admission.acquire(&token).await.unwrap();
/// assert_eq!(admission.in_flight(), 1);
///
/// ticket.release().unwrap();
/// assert!(ticket.release().is_err());
/// assert_eq!(admission.in_flight(), 0);
/// # }
/// ```
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    rate_limiter: Option<Arc<RateLimiter>>,
    name: Arc<str>,
}

impl AdmissionController {
    /// Creates a new builder.
    pub fn builder() -> AdmissionControllerBuilder {
        AdmissionControllerBuilder::new()
    }

    /// Waits for a concurrency slot.
    ///
    /// Returns [`AdmissionError::RateLimited`] immediately when the rate
    /// limiter refuses, and [`AdmissionError::Cancelled`] if `cancel` fires
    /// first. A cancelled wait never holds a slot.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Ticket, AdmissionError> {
        self.check_rate()?;

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.cancelled()),
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit,
        };

        permit
            .map(|permit| self.ticket(permit))
            .map_err(|_| AdmissionError::Closed)
    }

    /// Waits at most `timeout` for a concurrency slot.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Ticket, AdmissionError> {
        self.check_rate()?;

        match tokio::time::timeout(timeout, Arc::clone(&self.semaphore).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(self.ticket(permit)),
            Ok(Err(_)) => Err(AdmissionError::Closed),
            Err(_) => {
                #[cfg(feature = "metrics")]
                counter!("admission_rejections_total", "admission" => self.name.to_string(), "reason" => "timeout").increment(1);
                Err(AdmissionError::Timeout)
            }
        }
    }

    /// Takes a slot only if one is free right now.
    pub fn try_acquire(&self) -> Result<Ticket, AdmissionError> {
        self.check_rate()?;

        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(self.ticket(permit)),
            Err(TryAcquireError::NoPermits) => Err(AdmissionError::Saturated {
                max_concurrency: self.max_concurrency,
            }),
            Err(TryAcquireError::Closed) => Err(AdmissionError::Closed),
        }
    }

    /// Number of outstanding tickets.
    pub fn in_flight(&self) -> usize {
        self.max_concurrency
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured concurrency bound.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// The rate limiter consulted before each acquisition, if any.
    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.rate_limiter.as_deref()
    }

    /// Refuses all future acquisitions and wakes current waiters with
    /// [`AdmissionError::Closed`]. Outstanding tickets stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    fn check_rate(&self) -> Result<(), AdmissionError> {
        match &self.rate_limiter {
            Some(limiter) => limiter.check().map_err(|err| {
                #[cfg(feature = "metrics")]
                counter!("admission_rejections_total", "admission" => self.name.to_string(), "reason" => "rate_limited").increment(1);
                AdmissionError::from(err)
            }),
            None => Ok(()),
        }
    }

    fn cancelled(&self) -> AdmissionError {
        #[cfg(feature = "tracing")]
        tracing::debug!(admission = %self.name, "admission wait cancelled");

        #[cfg(feature = "metrics")]
        counter!("admission_rejections_total", "admission" => self.name.to_string(), "reason" => "cancelled").increment(1);

        AdmissionError::Cancelled
    }

    fn ticket(&self, permit: OwnedSemaphorePermit) -> Ticket {
        #[cfg(feature = "metrics")]
        gauge!("admission_in_flight", "admission" => self.name.to_string())
            .set(self.in_flight() as f64);

        Ticket {
            permit: Some(permit),
            name: Arc::clone(&self.name),
        }
    }
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("name", &self.name)
            .field("max_concurrency", &self.max_concurrency)
            .field("in_flight", &self.in_flight())
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish()
    }
}

/// One occupied concurrency slot.
///
/// Release it explicitly with [`Ticket::release`]; a ticket dropped without
/// being released frees its slot as well.
#[must_use = "dropping a ticket releases its slot immediately"]
pub struct Ticket {
    permit: Option<OwnedSemaphorePermit>,
    name: Arc<str>,
}

impl Ticket {
    /// Frees the slot.
    ///
    /// A second call does not touch the semaphore and returns
    /// [`AdmissionError::DoubleRelease`].
    pub fn release(&mut self) -> Result<(), AdmissionError> {
        match self.permit.take() {
            Some(permit) => {
                drop(permit);
                Ok(())
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    admission = %self.name,
                    "admission ticket released twice; this is a bug in the caller"
                );

                #[cfg(feature = "metrics")]
                counter!("admission_double_release_total", "admission" => self.name.to_string())
                    .increment(1);

                Err(AdmissionError::DoubleRelease)
            }
        }
    }

    /// Returns true once the slot has been freed.
    pub fn is_released(&self) -> bool {
        self.permit.is_none()
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("admission", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Builder for [`AdmissionController`].
pub struct AdmissionControllerBuilder {
    max_concurrency: usize,
    rate_limiter: Option<RateLimiter>,
    name: String,
}

impl Default for AdmissionControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionControllerBuilder {
    /// Creates a new builder.
    ///
    /// Defaults:
    /// - max_concurrency: 16
    /// - rate_limiter: none
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            max_concurrency: 16,
            rate_limiter: None,
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the maximum number of outstanding tickets.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Puts a rate limiter in front of the semaphore.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Give this controller a human-readable name for observability.
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Validates the configuration and builds the controller.
    pub fn build(self) -> Result<AdmissionController, ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::new("max_concurrency", "must be at least 1"));
        }
        if self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigError::new(
                "max_concurrency",
                format!("must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }

        Ok(AdmissionController {
            semaphore: Arc::new(Semaphore::new(self.max_concurrency)),
            max_concurrency: self.max_concurrency,
            rate_limiter: self.rate_limiter.map(Arc::new),
            name: Arc::from(self.name),
        })
    }
}
