//! Event system for backpressure components.
//!
//! Every component (rate limiter, breaker, pool, shedder, capacity controller)
//! emits its own event enum through the same listener machinery. Events that
//! concern a single task carry its [`Priority`], so a listener can subscribe
//! to the work it cares about with [`EventListeners::add_for_priority`].

use crate::Priority;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// An event emitted by a backpressure component.
pub trait BackpressureEvent: Send + Sync + fmt::Debug {
    /// Short snake_case kind, e.g. `"task_rejected"`.
    fn event_type(&self) -> &'static str;

    /// When the event occurred.
    fn timestamp(&self) -> Instant;

    /// Name of the component instance that emitted the event.
    fn pattern_name(&self) -> &str;

    /// Priority of the task the event is about. `None` for component-level
    /// events such as resizes and state transitions.
    fn priority(&self) -> Option<Priority> {
        None
    }
}

/// Receives events of one kind.
pub trait EventListener<E: BackpressureEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Listeners registered on one component.
#[derive(Clone)]
pub struct EventListeners<E: BackpressureEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: BackpressureEvent> EventListeners<E> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Adds a listener that sees every event.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Adds a listener that only sees task events at `min` priority or above.
    ///
    /// Component-level events, which carry no priority, are not delivered.
    pub fn add_for_priority<L>(&mut self, min: Priority, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.add(PriorityFilter { min, inner: listener });
    }

    /// Appends every listener of `other`.
    pub fn extend(&mut self, other: EventListeners<E>) {
        self.listeners.extend(other.listeners);
    }

    /// Delivers `event` to every listener and returns how many panicked.
    ///
    /// A panicking listener does not stop delivery to the rest.
    pub fn emit(&self, event: &E) -> usize {
        self.listeners
            .iter()
            .filter(|listener| catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err())
            .count()
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: BackpressureEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BackpressureEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

struct PriorityFilter<L> {
    min: Priority,
    inner: L,
}

impl<E, L> EventListener<E> for PriorityFilter<L>
where
    E: BackpressureEvent,
    L: EventListener<E>,
{
    fn on_event(&self, event: &E) {
        if event.priority().is_some_and(|p| p >= self.min) {
            self.inner.on_event(event);
        }
    }
}

/// Listener backed by a closure.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _event: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: BackpressureEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
