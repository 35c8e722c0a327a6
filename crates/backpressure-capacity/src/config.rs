use crate::events::CapacityEvent;
use crate::{CapacityController, CapacityTarget};
use backpressure_core::error::ConfigError;
use backpressure_core::events::{EventListeners, FnListener};
use backpressure_core::{SharedClock, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the capacity controller.
pub struct CapacityControllerConfig {
    pub(crate) min_workers: usize,
    pub(crate) max_workers: usize,
    pub(crate) interval: Duration,
    pub(crate) safety_multiplier: f64,
    pub(crate) cooldown: Duration,
    pub(crate) resizing: bool,
    pub(crate) clock: SharedClock,
    pub(crate) event_listeners: EventListeners<CapacityEvent>,
    pub(crate) name: String,
}

/// Builder for [`CapacityController`].
pub struct CapacityControllerConfigBuilder {
    min_workers: usize,
    max_workers: usize,
    interval: Duration,
    safety_multiplier: f64,
    cooldown: Duration,
    resizing: bool,
    clock: Option<SharedClock>,
    event_listeners: EventListeners<CapacityEvent>,
    name: String,
}

impl Default for CapacityControllerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CapacityControllerConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - min_workers: 1
    /// - max_workers: 16
    /// - interval: 1 second
    /// - safety_multiplier: 1.5
    /// - cooldown: 10 seconds
    /// - resizing: enabled
    /// - clock: system clock
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            min_workers: 1,
            max_workers: 16,
            interval: Duration::from_secs(1),
            safety_multiplier: 1.5,
            cooldown: Duration::from_secs(10),
            resizing: true,
            clock: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the smallest worker count the controller will ask for.
    pub fn min_workers(mut self, n: usize) -> Self {
        self.min_workers = n;
        self
    }

    /// Sets the largest worker count the controller will ask for.
    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }

    /// Sets how often the background loop samples and resizes.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the headroom applied on top of the Little's law estimate.
    ///
    /// Must be at least 1.0.
    pub fn safety_multiplier(mut self, multiplier: f64) -> Self {
        self.safety_multiplier = multiplier;
        self
    }

    /// Sets the minimum time between two resizes.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Enables or disables resizing from the control loop.
    ///
    /// When disabled, [`CapacityController::run_once`] only observes and
    /// publishes snapshots. Explicit [`CapacityController::tick`] calls still
    /// resize.
    pub fn resizing(mut self, enabled: bool) -> Self {
        self.resizing = enabled;
        self
    }

    /// Sets the time source used for rates and the cooldown.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the name for this controller instance (used in events and metrics).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when the worker target changes.
    ///
    /// # Callback Signature
    /// `Fn(usize, usize)` - Called with the previous and the new target.
    pub fn on_resize<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &CapacityEvent| {
            if let CapacityEvent::Resized { from, to, .. } = event {
                f(*from, *to);
            }
        }));
        self
    }

    /// Registers a callback when a resize is held back by the cooldown.
    pub fn on_resize_suppressed<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &CapacityEvent| {
            if let CapacityEvent::ResizeSuppressed {
                current,
                desired,
                remaining,
                ..
            } = event
            {
                f(*current, *desired, *remaining);
            }
        }));
        self
    }

    /// Adds already-built listeners.
    pub fn event_listeners(mut self, listeners: EventListeners<CapacityEvent>) -> Self {
        self.event_listeners.extend(listeners);
        self
    }

    /// Validates the configuration and builds a controller for `target`.
    ///
    /// The target is sampled once here to establish the counter baseline.
    pub fn build<T>(self, target: Arc<T>) -> Result<CapacityController, ConfigError>
    where
        T: CapacityTarget + 'static,
    {
        if self.min_workers == 0 {
            return Err(ConfigError::new("min_workers", "must be at least 1"));
        }
        if self.max_workers < self.min_workers {
            return Err(ConfigError::new(
                "max_workers",
                format!(
                    "must be at least min_workers ({}), got {}",
                    self.min_workers, self.max_workers
                ),
            ));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::new("interval", "must be non-zero"));
        }
        if !self.safety_multiplier.is_finite() || self.safety_multiplier < 1.0 {
            return Err(ConfigError::new(
                "safety_multiplier",
                format!("must be a finite value >= 1.0, got {}", self.safety_multiplier),
            ));
        }

        let config = CapacityControllerConfig {
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            interval: self.interval,
            safety_multiplier: self.safety_multiplier,
            cooldown: self.cooldown,
            resizing: self.resizing,
            clock: self.clock.unwrap_or_else(SystemClock::shared),
            event_listeners: self.event_listeners,
            name: self.name,
        };

        Ok(CapacityController::new(config, target))
    }
}
