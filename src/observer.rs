//! Observer hooks for resolution events.
//!
//! Observers see every resolution the engine performs, top-level and
//! nested, plus scope transitions. They are registered on the
//! [`ServiceCollection`](crate::ServiceCollection) before the container is
//! built and are called synchronously, so implementations should be cheap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::DiError;
use crate::Key;

/// Observer of resolution events.
///
/// Only [`resolving`](Self::resolving) and [`resolved`](Self::resolved) are
/// required; the other hooks default to doing nothing.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{DiObserver, Key, ServiceCollection, Resolver};
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Recorder {
///     seen: Mutex<Vec<String>>,
/// }
///
/// impl DiObserver for Recorder {
///     fn resolving(&self, _key: &Key) {}
///
///     fn resolved(&self, key: &Key, _duration: Duration) {
///         self.seen.lock().unwrap().push(key.to_string());
///     }
/// }
///
/// let recorder = Arc::new(Recorder::default());
/// let mut services = ServiceCollection::new();
/// services.instance(1u32).unwrap();
/// services.add_observer(recorder.clone());
///
/// let container = services.build();
/// container.resolve_sync::<u32>().unwrap();
/// assert_eq!(recorder.seen.lock().unwrap().as_slice(), ["u32"]);
/// ```
pub trait DiObserver: Send + Sync {
    /// Called before a key is looked up.
    fn resolving(&self, key: &Key);

    /// Called when a key was resolved, cached or freshly built.
    ///
    /// # Arguments
    ///
    /// * `key` - The resolved key
    /// * `duration` - Time elapsed since the matching `resolving` call
    fn resolved(&self, key: &Key, duration: Duration);

    /// Called when resolving a key failed.
    fn failed(&self, _key: &Key, _error: &DiError, _duration: Duration) {}

    /// Called after a scope frame was pushed.
    fn scope_entered(&self, _scope: &str) {}

    /// Called after a scope frame was popped and disposed.
    fn scope_exited(&self, _scope: &str) {}
}

/// Registered observers.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn DiObserver>>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self { observers: Vec::new() }
    }

    pub(crate) fn add(&mut self, observer: Arc<dyn DiObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    #[inline]
    pub(crate) fn resolving(&self, key: &Key) {
        for observer in &self.observers {
            observer.resolving(key);
        }
    }

    #[inline]
    pub(crate) fn resolved(&self, key: &Key, duration: Duration) {
        for observer in &self.observers {
            observer.resolved(key, duration);
        }
    }

    pub(crate) fn failed(&self, key: &Key, error: &DiError, duration: Duration) {
        for observer in &self.observers {
            observer.failed(key, error, duration);
        }
    }

    pub(crate) fn scope_entered(&self, scope: &str) {
        for observer in &self.observers {
            observer.scope_entered(scope);
        }
    }

    pub(crate) fn scope_exited(&self, scope: &str) {
        for observer in &self.observers {
            observer.scope_exited(scope);
        }
    }
}

/// Observer that forwards events to `tracing`.
///
/// Resolutions are emitted at `trace`, failures at `debug`, and scope
/// transitions at `debug`, each carrying a `source` field.
///
/// ```
/// use ferrous_ioc::{ServiceCollection, LoggingObserver};
/// use std::sync::Arc;
///
/// let mut services = ServiceCollection::new();
/// services.add_observer(Arc::new(LoggingObserver::with_prefix("billing")));
/// let container = services.build();
/// ```
pub struct LoggingObserver {
    prefix: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self { prefix: "ferrous-ioc".to_string() }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl DiObserver for LoggingObserver {
    fn resolving(&self, key: &Key) {
        tracing::trace!(source = %self.prefix, key = %key, "resolving");
    }

    fn resolved(&self, key: &Key, duration: Duration) {
        tracing::trace!(source = %self.prefix, key = %key, ?duration, "resolved");
    }

    fn failed(&self, key: &Key, error: &DiError, duration: Duration) {
        tracing::debug!(source = %self.prefix, key = %key, ?duration, error = %error, "resolution failed");
    }

    fn scope_entered(&self, scope: &str) {
        tracing::debug!(source = %self.prefix, scope, "scope entered");
    }

    fn scope_exited(&self, scope: &str) {
        tracing::debug!(source = %self.prefix, scope, "scope exited");
    }
}

/// Observer that counts resolutions and failures.
#[derive(Default)]
pub struct MetricsObserver {
    resolutions: AtomicU64,
    failures: AtomicU64,
    total_nanos: AtomicU64,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution_count(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn total_resolution_time(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }

    /// Mean time of successful resolutions, `None` before the first one.
    pub fn average_resolution_time(&self) -> Option<Duration> {
        let count = self.resolution_count();
        if count == 0 {
            return None;
        }
        Some(Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed) / count))
    }

    pub fn reset(&self) {
        self.resolutions.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.total_nanos.store(0, Ordering::Relaxed);
    }
}

impl DiObserver for MetricsObserver {
    fn resolving(&self, _key: &Key) {}

    fn resolved(&self, _key: &Key, duration: Duration) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    fn failed(&self, _key: &Key, _error: &DiError, _duration: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key_of_type;

    #[test]
    fn metrics_observer_counts() {
        let observer = MetricsObserver::new();
        let key = key_of_type::<String>();
        assert!(observer.average_resolution_time().is_none());

        observer.resolved(&key, Duration::from_millis(10));
        observer.resolved(&key, Duration::from_millis(20));
        observer.failed(&key, &DiError::not_found(key), Duration::from_millis(1));

        assert_eq!(observer.resolution_count(), 2);
        assert_eq!(observer.failure_count(), 1);
        assert_eq!(observer.average_resolution_time(), Some(Duration::from_millis(15)));

        observer.reset();
        assert_eq!(observer.resolution_count(), 0);
        assert_eq!(observer.failure_count(), 0);
    }

    #[test]
    fn observers_fan_out() {
        let metrics = Arc::new(MetricsObserver::new());
        let mut observers = Observers::new();
        assert!(!observers.has_observers());
        observers.add(metrics.clone());
        observers.add(Arc::new(LoggingObserver::new()));
        assert_eq!(observers.len(), 2);

        let key = key_of_type::<u8>();
        observers.resolving(&key);
        observers.resolved(&key, Duration::from_micros(5));
        observers.scope_entered("request");
        observers.scope_exited("request");
        assert_eq!(metrics.resolution_count(), 1);
    }
}
