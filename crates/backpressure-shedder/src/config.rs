use crate::events::LoadShedderEvent;
use crate::LoadShedder;
use backpressure_core::error::ConfigError;
use backpressure_core::events::{EventListeners, FnListener};
use backpressure_core::Priority;
use std::time::Duration;

/// Per-priority shed thresholds.
///
/// A task is shed once the composite load score reaches the threshold of its
/// priority. `None` means the priority is never shed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ShedThresholds {
    /// Threshold for [`Priority::Low`]. Default: 0.5
    pub low: Option<f64>,
    /// Threshold for [`Priority::Normal`]. Default: 0.7
    pub normal: Option<f64>,
    /// Threshold for [`Priority::High`]. Default: 0.9
    pub high: Option<f64>,
    /// Threshold for [`Priority::Critical`]. Default: never
    pub critical: Option<f64>,
}

impl ShedThresholds {
    /// Returns the threshold for `priority`.
    pub fn get(&self, priority: Priority) -> Option<f64> {
        match priority {
            Priority::Low => self.low,
            Priority::Normal => self.normal,
            Priority::High => self.high,
            Priority::Critical => self.critical,
        }
    }

    /// Sets the threshold for `priority`.
    pub fn set(&mut self, priority: Priority, threshold: Option<f64>) {
        match priority {
            Priority::Low => self.low = threshold,
            Priority::Normal => self.normal = threshold,
            Priority::High => self.high = threshold,
            Priority::Critical => self.critical = threshold,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let mut previous: Option<f64> = None;
        for priority in Priority::ALL {
            let current = self.get(priority);
            if let Some(t) = current {
                if !t.is_finite() || t < 0.0 {
                    return Err(ConfigError::new(
                        "shed_thresholds",
                        format!("{priority} threshold must be finite and non-negative, got {t}"),
                    ));
                }
            }
            match (previous, current) {
                (Some(lower), Some(t)) if t < lower => {
                    return Err(ConfigError::new(
                        "shed_thresholds",
                        format!("{priority} threshold {t} is below a lower priority's {lower}"),
                    ));
                }
                (None, Some(_)) if priority != Priority::ALL[0] => {
                    return Err(ConfigError::new(
                        "shed_thresholds",
                        format!("{priority} is shed while a lower priority never is"),
                    ));
                }
                _ => {}
            }
            previous = current;
        }
        Ok(())
    }
}

impl Default for ShedThresholds {
    fn default() -> Self {
        Self {
            low: Some(0.5),
            normal: Some(0.7),
            high: Some(0.9),
            critical: None,
        }
    }
}

/// Per-signal weights of the composite load score.
///
/// The score is the maximum of the weighted signals, so a weight of `0.0`
/// disables a signal and a weight above `1.0` makes it trip earlier.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ShedWeights {
    /// Weight of `queue_depth / queue_capacity`. Default: 1.0
    pub queue: f64,
    /// Weight of `p99_latency / latency_target`. Default: 1.0
    pub latency: f64,
    /// Weight of worker utilization. Default: 1.0
    pub utilization: f64,
}

impl ShedWeights {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (name, w) in [
            ("queue", self.queue),
            ("latency", self.latency),
            ("utilization", self.utilization),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::new(
                    "shed_weights",
                    format!("{name} weight must be finite and non-negative, got {w}"),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ShedWeights {
    fn default() -> Self {
        Self {
            queue: 1.0,
            latency: 1.0,
            utilization: 1.0,
        }
    }
}

/// Configuration for the load shedder.
pub struct LoadShedderConfig {
    pub(crate) thresholds: ShedThresholds,
    pub(crate) weights: ShedWeights,
    pub(crate) latency_target: Duration,
    pub(crate) event_listeners: EventListeners<LoadShedderEvent>,
    pub(crate) name: String,
}

impl LoadShedderConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> LoadShedderConfigBuilder {
        LoadShedderConfigBuilder::new()
    }
}

/// Builder for [`LoadShedder`].
pub struct LoadShedderConfigBuilder {
    thresholds: ShedThresholds,
    weights: ShedWeights,
    latency_target: Duration,
    event_listeners: EventListeners<LoadShedderEvent>,
    name: String,
}

impl Default for LoadShedderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadShedderConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - thresholds: Low 0.5, Normal 0.7, High 0.9, Critical never
    /// - weights: 1.0 for every signal
    /// - latency_target: 500ms
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            thresholds: ShedThresholds::default(),
            weights: ShedWeights::default(),
            latency_target: Duration::from_millis(500),
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Replaces all thresholds.
    pub fn thresholds(mut self, thresholds: ShedThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Sets the threshold of a single priority. `None` disables shedding for it.
    pub fn threshold(mut self, priority: Priority, threshold: Option<f64>) -> Self {
        self.thresholds.set(priority, threshold);
        self
    }

    /// Sets the per-signal weights.
    pub fn weights(mut self, weights: ShedWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the P99 latency that counts as full load.
    ///
    /// A zero target disables the latency signal.
    pub fn latency_target(mut self, target: Duration) -> Self {
        self.latency_target = target;
        self
    }

    /// Give this shedder a human-readable name for observability.
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked whenever a task is shed.
    ///
    /// # Callback Signature
    /// `Fn(Priority, f64)` - Called with the rejected priority and the
    /// composite score that caused it.
    pub fn on_shed<F>(mut self, f: F) -> Self
    where
        F: Fn(Priority, f64) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(
            move |event: &LoadShedderEvent| match event {
                LoadShedderEvent::LoadShed {
                    priority, score, ..
                } => f(*priority, *score),
            },
        ));
        self
    }

    /// Adds already-built listeners.
    pub fn event_listeners(mut self, listeners: EventListeners<LoadShedderEvent>) -> Self {
        self.event_listeners.extend(listeners);
        self
    }

    /// Validates the configuration and builds the shedder.
    pub fn build(self) -> Result<LoadShedder, ConfigError> {
        self.thresholds.validate()?;
        self.weights.validate()?;

        Ok(LoadShedder::new(LoadShedderConfig {
            thresholds: self.thresholds,
            weights: self.weights,
            latency_target: self.latency_target,
            event_listeners: self.event_listeners,
            name: self.name,
        }))
    }
}
