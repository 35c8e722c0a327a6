//! Adaptive capacity control.
//!
//! A [`CapacityController`] sizes a worker pool with Little's law:
//!
//! ```text
//! workers = ceil(arrival_rate * service_time * safety_multiplier)
//! ```
//!
//! clamped to `[min_workers, max_workers]`. After a resize, further resizes
//! are held back until the cooldown has elapsed so the pool does not
//! oscillate.
//!
//! The controller also owns the load snapshot: every observation replaces
//! the published [`LoadMetrics`] wholesale, and readers such as the load
//! shedder only ever see complete snapshots.
//!
//! The pool is reached through the [`CapacityTarget`] trait, so the
//! controller can drive anything that can report load and change its size.
//!
//! # Examples
//!
//! ```
//! use backpressure_capacity::{CapacityController, CapacityTarget, LoadSample};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Default)]
//! struct Fixed(AtomicUsize);
//!
//! impl CapacityTarget for Fixed {
//!     fn sample(&self) -> LoadSample {
//!         LoadSample { workers: self.workers(), ..LoadSample::default() }
//!     }
//!     fn workers(&self) -> usize {
//!         self.0.load(Ordering::SeqCst)
//!     }
//!     fn resize(&self, n: usize) -> usize {
//!         self.0.store(n, Ordering::SeqCst);
//!         n
//!     }
//! }
//!
//! let target = Arc::new(Fixed(AtomicUsize::new(1)));
//! let controller = CapacityController::builder()
//!     .min_workers(1)
//!     .max_workers(32)
//!     .build(Arc::clone(&target))
//!     .unwrap();
//!
//! // 100 tasks/s, 50ms each, 1.5x headroom: ceil(7.5) = 8 workers.
//! assert_eq!(controller.tick(100.0, Duration::from_millis(50)), Some(8));
//! assert_eq!(target.workers(), 8);
//! ```
//!
//! # Feature Flags
//!
//! - `metrics`: target workers, arrival rate, resize counts
//! - `tracing`: resize and cooldown logs

mod config;
mod events;

pub use config::{CapacityControllerConfig, CapacityControllerConfigBuilder};
pub use events::CapacityEvent;

use backpressure_core::LoadMetrics;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Raw readings taken from a [`CapacityTarget`].
///
/// `offered` and `rejected` are running totals; the controller turns them
/// into rates by differencing consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSample {
    /// Total tasks offered since start.
    pub offered: u64,
    /// Total tasks rejected since start.
    pub rejected: u64,
    /// Tasks waiting in the queue.
    pub queue_depth: usize,
    /// Configured queue capacity.
    pub queue_capacity: usize,
    /// Live workers.
    pub workers: usize,
    /// Workers executing a task.
    pub busy: usize,
    /// Outstanding admission tickets.
    pub in_flight: usize,
    /// Mean execution time of recent tasks.
    pub mean_service: Duration,
    /// 99th percentile latency of recent tasks.
    pub p99_latency: Duration,
}

/// Something the controller can observe and resize.
pub trait CapacityTarget: Send + Sync {
    /// Reads the current load.
    fn sample(&self) -> LoadSample;

    /// Current worker target.
    fn workers(&self) -> usize;

    /// Requests `n` workers and returns the target actually applied.
    fn resize(&self, n: usize) -> usize;
}

/// Result of one observation.
#[derive(Debug, Clone)]
pub struct Observation {
    /// The snapshot that was published.
    pub metrics: Arc<LoadMetrics>,
    /// Tasks offered per second since the previous observation. `None` when
    /// no time has passed.
    pub arrival_rate: Option<f64>,
    /// Mean service time reported by the target.
    pub service_time: Duration,
}

#[derive(Debug)]
struct Window {
    last_offered: u64,
    last_rejected: u64,
    last_sample_at: Instant,
    last_resize: Option<Instant>,
}

/// Periodic Little's law controller for a worker pool.
pub struct CapacityController {
    config: CapacityControllerConfig,
    target: Arc<dyn CapacityTarget>,
    snapshot: RwLock<Arc<LoadMetrics>>,
    window: Mutex<Window>,
}

impl CapacityController {
    /// Creates a new configuration builder.
    pub fn builder() -> CapacityControllerConfigBuilder {
        CapacityControllerConfigBuilder::new()
    }

    pub(crate) fn new(config: CapacityControllerConfig, target: Arc<dyn CapacityTarget>) -> Self {
        let baseline = target.sample();
        let now = config.clock.now();
        let snapshot = LoadMetrics {
            queue_depth: baseline.queue_depth,
            queue_capacity: baseline.queue_capacity,
            p99_latency: baseline.p99_latency,
            rejection_rate: 0.0,
            worker_utilization: utilization(baseline.busy, baseline.workers),
            workers: baseline.workers,
            busy_workers: baseline.busy,
            in_flight: baseline.in_flight,
            captured_at: now,
        };

        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            window: Mutex::new(Window {
                last_offered: baseline.offered,
                last_rejected: baseline.rejected,
                last_sample_at: now,
                last_resize: None,
            }),
            config,
            target,
        }
    }

    /// Worker count Little's law asks for, clamped to the configured bounds.
    ///
    /// Returns `None` for a negative or non-finite arrival rate.
    pub fn desired_workers(&self, arrival_rate: f64, service_time: Duration) -> Option<usize> {
        if !arrival_rate.is_finite() || arrival_rate < 0.0 {
            return None;
        }
        let (min, max) = (self.config.min_workers, self.config.max_workers);
        let estimate =
            (arrival_rate * service_time.as_secs_f64() * self.config.safety_multiplier).ceil();
        let n = if estimate >= max as f64 {
            max
        } else {
            estimate as usize
        };
        Some(n.clamp(min, max))
    }

    /// Resizes the target for the given load.
    ///
    /// Returns the new worker target, or `None` if nothing changed: the
    /// input was invalid, the estimate matched the current size, or the
    /// previous resize is still within the cooldown.
    pub fn tick(&self, arrival_rate: f64, service_time: Duration) -> Option<usize> {
        let desired = self.desired_workers(arrival_rate, service_time)?;
        let current = self.target.workers();
        if desired == current {
            return None;
        }

        let now = self.config.clock.now();
        let mut window = self.window();

        let last_resize = window.last_resize;
        if let Some(last) = last_resize {
            let since = now.saturating_duration_since(last);
            if since < self.config.cooldown {
                let remaining = self.config.cooldown - since;
                drop(window);

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    controller = %self.config.name,
                    current,
                    desired,
                    ?remaining,
                    "resize held back by cooldown"
                );

                self.config
                    .event_listeners
                    .emit(&CapacityEvent::ResizeSuppressed {
                        pattern_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        current,
                        desired,
                        remaining,
                    });
                return None;
            }
        }

        let to = self.target.resize(desired);
        if to == current {
            return None;
        }
        window.last_resize = Some(now);
        drop(window);

        #[cfg(feature = "tracing")]
        tracing::info!(
            controller = %self.config.name,
            from = current,
            to,
            arrival_rate,
            ?service_time,
            "capacity adjusted"
        );

        #[cfg(feature = "metrics")]
        {
            counter!("capacity_resizes_total", "controller" => self.config.name.clone(), "direction" => if to > current { "up" } else { "down" }).increment(1);
            gauge!("capacity_target_workers", "controller" => self.config.name.clone()).set(to as f64);
        }

        self.config.event_listeners.emit(&CapacityEvent::Resized {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            from: current,
            to,
            arrival_rate,
            service_time,
        });

        Some(to)
    }

    /// Samples the target and publishes a fresh snapshot.
    pub fn observe(&self) -> Observation {
        let sample = self.target.sample();
        let now = self.config.clock.now();

        let (arrival_rate, rejection_rate) = {
            let mut window = self.window();
            let offered = sample.offered.saturating_sub(window.last_offered);
            let rejected = sample.rejected.saturating_sub(window.last_rejected);
            let rejection_rate = if offered == 0 {
                0.0
            } else {
                (rejected as f64 / offered as f64).min(1.0)
            };

            let elapsed = now.saturating_duration_since(window.last_sample_at);
            if elapsed.is_zero() {
                // Keep the baseline so the counts carry into the next window.
                (None, rejection_rate)
            } else {
                window.last_offered = sample.offered;
                window.last_rejected = sample.rejected;
                window.last_sample_at = now;
                (Some(offered as f64 / elapsed.as_secs_f64()), rejection_rate)
            }
        };

        let metrics = Arc::new(LoadMetrics {
            queue_depth: sample.queue_depth,
            queue_capacity: sample.queue_capacity,
            p99_latency: sample.p99_latency,
            rejection_rate,
            worker_utilization: utilization(sample.busy, sample.workers),
            workers: sample.workers,
            busy_workers: sample.busy,
            in_flight: sample.in_flight,
            captured_at: now,
        });
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&metrics);

        #[cfg(feature = "metrics")]
        {
            let name = self.config.name.clone();
            if let Some(rate) = arrival_rate {
                gauge!("capacity_arrival_rate", "controller" => name.clone()).set(rate);
            }
            gauge!("capacity_rejection_rate", "controller" => name.clone()).set(rejection_rate);
            gauge!("capacity_worker_utilization", "controller" => name)
                .set(metrics.worker_utilization);
        }

        self.config.event_listeners.emit(&CapacityEvent::Sampled {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            arrival_rate,
            queue_depth: metrics.queue_depth,
            rejection_rate,
            worker_utilization: metrics.worker_utilization,
        });

        Observation {
            metrics,
            arrival_rate,
            service_time: sample.mean_service,
        }
    }

    /// One control step: observe, then resize from the observed rates.
    ///
    /// Returns the new worker target if the pool was resized.
    pub fn run_once(&self) -> Option<usize> {
        let observation = self.observe();
        if !self.config.resizing {
            return None;
        }
        let rate = observation.arrival_rate?;
        // Arrivals with no completed task yet say nothing about service time.
        if rate > 0.0 && observation.service_time.is_zero() {
            return None;
        }
        self.tick(rate, observation.service_time)
    }

    /// Runs [`run_once`](Self::run_once) every interval until `token` is cancelled.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                controller = %self.config.name,
                interval = ?self.config.interval,
                "capacity control loop started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        self.run_once();
                    }
                }
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(controller = %self.config.name, "capacity control loop stopped");
        })
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<LoadMetrics> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Lower bound for the worker target.
    pub fn min_workers(&self) -> usize {
        self.config.min_workers
    }

    /// Upper bound for the worker target.
    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    /// Sampling interval of the background loop.
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Minimum time between two resizes.
    pub fn cooldown(&self) -> Duration {
        self.config.cooldown
    }

    /// Headroom applied to the estimate.
    pub fn safety_multiplier(&self) -> f64 {
        self.config.safety_multiplier
    }

    /// Returns the controller name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn window(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CapacityController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacityController")
            .field("name", &self.config.name)
            .field("min_workers", &self.config.min_workers)
            .field("max_workers", &self.config.max_workers)
            .field("safety_multiplier", &self.config.safety_multiplier)
            .field("cooldown", &self.config.cooldown)
            .field("workers", &self.target.workers())
            .finish()
    }
}

fn utilization(busy: usize, workers: usize) -> f64 {
    if workers == 0 {
        0.0
    } else {
        (busy as f64 / workers as f64).min(1.0)
    }
}
