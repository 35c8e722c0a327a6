//! Priority-aware load shedding.
//!
//! The shedder rejects lower-priority work first once the system is busy.
//! Decisions are a pure function of a [`LoadMetrics`] snapshot, so they never
//! race with the producer of the snapshot.
//!
//! # Composite score
//!
//! ```text
//! score = max(
//!     w_queue       * queue_depth / queue_capacity,
//!     w_latency     * p99_latency / latency_target,
//!     w_utilization * worker_utilization,
//! )
//! ```
//!
//! A task is shed when `score >= threshold[priority]`. Critical work has no
//! threshold by default and is never shed.
//!
//! # Examples
//!
//! ```
//! use backpressure_core::{LoadMetrics, Priority};
//! use backpressure_shedder::LoadShedder;
//!
//! let shedder = LoadShedder::builder().build().unwrap();
//!
//! let mut load = LoadMetrics::idle(100, 4);
//! load.queue_depth = 60;
//!
//! assert!(!shedder.should_admit(Priority::Low, &load));
//! assert!(shedder.should_admit(Priority::Normal, &load));
//! assert!(shedder.should_admit(Priority::Critical, &load));
//! ```

mod config;
mod events;

pub use config::{LoadShedderConfig, LoadShedderConfigBuilder, ShedThresholds, ShedWeights};
pub use events::LoadShedderEvent;

use backpressure_core::{BackpressureError, LoadMetrics, Priority};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Outcome of a shedding decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShedDecision {
    /// Priority the decision was made for.
    pub priority: Priority,
    /// Whether the task may proceed.
    pub admitted: bool,
    /// Composite load score.
    pub score: f64,
    /// Threshold of the priority, `None` if it is never shed.
    pub threshold: Option<f64>,
}

impl ShedDecision {
    /// Converts a rejection into [`BackpressureError::ShedLoad`].
    pub fn into_result<E>(self) -> Result<(), BackpressureError<E>> {
        if self.admitted {
            Ok(())
        } else {
            Err(BackpressureError::ShedLoad {
                priority: self.priority,
                score: self.score,
            })
        }
    }
}

/// A priority-aware load shedder.
pub struct LoadShedder {
    config: LoadShedderConfig,
}

impl LoadShedder {
    /// Creates a new configuration builder.
    pub fn builder() -> LoadShedderConfigBuilder {
        LoadShedderConfigBuilder::new()
    }

    pub(crate) fn new(config: LoadShedderConfig) -> Self {
        Self { config }
    }

    /// Returns true if a task of `priority` should be admitted under `load`.
    pub fn should_admit(&self, priority: Priority, load: &LoadMetrics) -> bool {
        self.evaluate(priority, load).admitted
    }

    /// Makes a shedding decision and reports it.
    pub fn evaluate(&self, priority: Priority, load: &LoadMetrics) -> ShedDecision {
        let score = self.score(load);
        let threshold = self.config.thresholds.get(priority);
        let admitted = match threshold {
            Some(threshold) => score < threshold,
            None => true,
        };

        #[cfg(feature = "metrics")]
        gauge!("shedder_load_score", "shedder" => self.config.name.clone()).set(score);

        if let (false, Some(threshold)) = (admitted, threshold) {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                shedder = %self.config.name,
                %priority,
                score,
                threshold,
                "shedding task"
            );

            #[cfg(feature = "metrics")]
            counter!("shedder_shed_total", "shedder" => self.config.name.clone(), "priority" => priority.as_str()).increment(1);

            self.config
                .event_listeners
                .emit(&LoadShedderEvent::LoadShed {
                    pattern_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    priority,
                    score,
                    threshold,
                });
        }

        ShedDecision {
            priority,
            admitted,
            score,
            threshold,
        }
    }

    /// Computes the composite load score of a snapshot.
    pub fn score(&self, load: &LoadMetrics) -> f64 {
        let w = &self.config.weights;
        [
            w.queue * load.queue_ratio(),
            w.latency * load.latency_ratio(self.config.latency_target),
            w.utilization * load.worker_utilization,
        ]
        .into_iter()
        .filter(|signal| !signal.is_nan())
        .fold(0.0, f64::max)
    }

    /// Returns the configured thresholds.
    pub fn thresholds(&self) -> &ShedThresholds {
        &self.config.thresholds
    }

    /// Returns the latency that counts as full load.
    pub fn latency_target(&self) -> Duration {
        self.config.latency_target
    }

    /// Returns the instance name.
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

impl std::fmt::Debug for LoadShedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadShedder")
            .field("name", &self.config.name)
            .field("thresholds", &self.config.thresholds)
            .field("weights", &self.config.weights)
            .field("latency_target", &self.config.latency_target)
            .finish()
    }
}
