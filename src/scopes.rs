//! Named scope hierarchy and the per-handle stack of scope frames.
//!
//! Scopes are ordered from longest-lived to shortest-lived. The order is
//! static: it is fixed when the container is built and drives the
//! registration-time lifetime validation. At run time a [`ScopeManager`]
//! keeps a stack of [`ScopeFrame`]s, one per `enter`, each caching the
//! instances of its scope and the hooks that dispose them.

use std::collections::BTreeSet;
use std::fmt;

use ahash::AHashMap;

use crate::error::{DiError, DiResult};
use crate::internal::DisposeBag;
use crate::key::Key;
use crate::lifetime::{DEFAULT_SCOPE, SINGLETON_SCOPE, TRANSIENT_SCOPE};
use crate::registration::{AnyArc, Built};

/// Default hierarchy, longest-lived first.
pub const DEFAULT_HIERARCHY: [&str; 5] = [SINGLETON_SCOPE, "session", "request", DEFAULT_SCOPE, TRANSIENT_SCOPE];

/// Ordered scope names plus the set of names accepted for registration.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::scopes::ScopeHierarchy;
///
/// let hierarchy = ScopeHierarchy::default();
/// assert!(hierarchy.can_depend_on("request", "singleton"));
/// assert!(!hierarchy.can_depend_on("session", "request"));
/// assert!(hierarchy.validate_name("tenant").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeHierarchy {
    order: Vec<String>,
    valid: BTreeSet<String>,
}

impl Default for ScopeHierarchy {
    fn default() -> Self {
        Self::new(DEFAULT_HIERARCHY.iter().copied())
    }
}

impl ScopeHierarchy {
    /// Hierarchy with the given order, longest-lived first.
    pub fn new<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut hierarchy = ScopeHierarchy { order: Vec::new(), valid: BTreeSet::new() };
        hierarchy.valid.insert(SINGLETON_SCOPE.to_string());
        hierarchy.valid.insert(TRANSIENT_SCOPE.to_string());
        hierarchy.define(order);
        hierarchy
    }

    /// Replaces the ordering. Every listed name becomes valid; names that
    /// were valid before stay valid.
    pub fn define<I, S>(&mut self, order: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = order.into_iter().map(Into::into).collect();
        self.valid.extend(self.order.iter().cloned());
    }

    /// Accepts `name` for registration and `enter` without ranking it.
    pub fn register_scope(&mut self, name: impl Into<String>) {
        self.valid.insert(name.into());
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.valid.contains(name)
    }

    /// Fails with a configuration error listing the known scopes.
    pub fn validate_name(&self, name: &str) -> DiResult<()> {
        if self.is_valid(name) {
            return Ok(());
        }
        let available: Vec<&str> = self.valid.iter().map(String::as_str).collect();
        Err(DiError::configuration(format!(
            "Invalid scope '{}'. Available scopes: {}",
            name,
            available.join(", ")
        )))
    }

    /// Position in the ordering; lower lives longer.
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|s| s == name)
    }

    /// True unless `dependency` is strictly shorter-lived than `dependent`.
    ///
    /// Scopes missing from the ordering are unconstrained.
    pub fn can_depend_on(&self, dependent: &str, dependency: &str) -> bool {
        match (self.rank(dependent), self.rank(dependency)) {
            (Some(outer), Some(inner)) => inner <= outer,
            _ => true,
        }
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Every accepted scope name, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.valid.iter().map(String::as_str)
    }

    /// Singleton and transient are lifetimes, not enterable scopes.
    pub fn is_pseudo_scope(name: &str) -> bool {
        name == SINGLETON_SCOPE || name == TRANSIENT_SCOPE
    }
}

/// Instances created inside one entered scope, with their dispose hooks.
pub struct ScopeFrame {
    name: String,
    instances: AHashMap<Key, AnyArc>,
    disposers: DisposeBag,
}

impl ScopeFrame {
    fn new(name: &str) -> Self {
        ScopeFrame { name: name.to_string(), instances: AHashMap::new(), disposers: DisposeBag::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.instances.contains_key(key)
    }

    /// Runs the dispose hooks in reverse creation order and drops the instances.
    pub fn dispose(mut self) {
        tracing::debug!(scope = %self.name, instances = self.instances.len(), "disposing scope frame");
        self.disposers.run_all_blocking(&self.name);
        self.instances.clear();
    }

    /// Like [`dispose`](Self::dispose), awaiting async hooks.
    pub async fn dispose_async(mut self) {
        tracing::debug!(scope = %self.name, instances = self.instances.len(), "disposing scope frame");
        self.disposers.run_all(&self.name).await;
        self.instances.clear();
    }
}

impl fmt::Debug for ScopeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeFrame")
            .field("name", &self.name)
            .field("instances", &self.instances.len())
            .field("disposers", &self.disposers.len())
            .finish()
    }
}

/// Stack of active scope frames.
///
/// A manager belongs to one logical unit of work and is not meant to be
/// mutated from several threads at once; [`Scope`](crate::Scope) wraps it
/// in a lock only to be `Sync`.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::scopes::{ScopeHierarchy, ScopeManager};
/// use ferrous_ioc::{AnyArc, key_of_type};
/// use std::sync::Arc;
///
/// let mut scopes = ScopeManager::new(Arc::new(ScopeHierarchy::default()));
/// let key = key_of_type::<String>();
/// let make = |s: &str| Arc::new(s.to_string()) as AnyArc;
///
/// // Not active yet.
/// assert!(scopes.resolve_scoped(key, "request", || Ok(make("a"))).is_err());
///
/// scopes.enter("request").unwrap();
/// let first = scopes.resolve_scoped(key, "request", || Ok(make("a"))).unwrap();
/// let again = scopes.resolve_scoped(key, "request", || Ok(make("b"))).unwrap();
/// assert!(Arc::ptr_eq(&first, &again));
/// scopes.exit("request").unwrap().dispose();
/// ```
pub struct ScopeManager {
    hierarchy: std::sync::Arc<ScopeHierarchy>,
    frames: Vec<ScopeFrame>,
}

impl ScopeManager {
    pub fn new(hierarchy: std::sync::Arc<ScopeHierarchy>) -> Self {
        ScopeManager { hierarchy, frames: Vec::new() }
    }

    pub fn hierarchy(&self) -> &ScopeHierarchy {
        &self.hierarchy
    }

    /// Pushes a fresh frame for `name`.
    pub fn enter(&mut self, name: &str) -> DiResult<()> {
        if ScopeHierarchy::is_pseudo_scope(name) {
            return Err(DiError::scope(format!("'{}' is a lifetime, not an enterable scope", name)));
        }
        if !self.hierarchy.is_valid(name) {
            return Err(DiError::scope(format!("Unknown scope '{}'", name)));
        }
        self.frames.push(ScopeFrame::new(name));
        tracing::debug!(scope = name, depth = self.frames.len(), "scope entered");
        Ok(())
    }

    /// Pops the innermost frame, which must belong to `name`.
    ///
    /// The frame is returned undisposed so the caller can dispose it
    /// synchronously or asynchronously.
    pub fn exit(&mut self, name: &str) -> DiResult<ScopeFrame> {
        match self.frames.last() {
            Some(top) if top.name == name => {}
            Some(top) => {
                return Err(DiError::scope(format!(
                    "Cannot exit scope '{}': innermost active scope is '{}'",
                    name, top.name
                )))
            }
            None => return Err(DiError::scope(format!("Cannot exit scope '{}': no scope is active", name))),
        }
        let frame = self.pop().ok_or_else(|| DiError::scope(format!("Scope '{}' not active", name)))?;
        tracing::debug!(scope = name, depth = self.frames.len(), "scope exited");
        Ok(frame)
    }

    /// Pops the innermost frame whatever its name.
    pub fn pop(&mut self) -> Option<ScopeFrame> {
        self.frames.pop()
    }

    fn frame(&self, scope: &str) -> DiResult<&ScopeFrame> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.name == scope)
            .ok_or_else(|| DiError::scope(format!("Scope '{}' not active", scope)))
    }

    fn frame_mut(&mut self, scope: &str) -> DiResult<&mut ScopeFrame> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| f.name == scope)
            .ok_or_else(|| DiError::scope(format!("Scope '{}' not active", scope)))
    }

    /// Instance cached for `key` in the innermost frame of `scope`.
    ///
    /// Fails with a scope error when no frame of `scope` is active.
    pub fn cached(&self, key: &Key, scope: &str) -> DiResult<Option<AnyArc>> {
        Ok(self.frame(scope)?.instances.get(key).cloned())
    }

    /// Caches a freshly built instance. If the frame already holds one for
    /// `key`, that instance wins and the new one is dropped undisposed.
    pub(crate) fn store(&mut self, key: Key, scope: &str, built: Built) -> DiResult<AnyArc> {
        let frame = self.frame_mut(scope)?;
        if let Some(existing) = frame.instances.get(&key) {
            return Ok(existing.clone());
        }
        frame.instances.insert(key, built.value.clone());
        if let Some(disposer) = built.disposer {
            frame.disposers.push(disposer);
        }
        Ok(built.value)
    }

    /// Cached instance of `key` in `scope`, created with `factory` on a miss.
    ///
    /// The manager stays borrowed while `factory` runs, so the factory must
    /// not resolve further scoped services through it.
    pub fn resolve_scoped<F>(&mut self, key: Key, scope: &str, factory: F) -> DiResult<AnyArc>
    where
        F: FnOnce() -> DiResult<AnyArc>,
    {
        if let Some(hit) = self.cached(&key, scope)? {
            return Ok(hit);
        }
        let value = factory()?;
        self.store(key, scope, Built { value, disposer: None })
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.frames.iter().any(|f| f.name == name)
    }

    /// Active scope names, outermost first.
    pub fn active(&self) -> Vec<&str> {
        self.frames.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl fmt::Debug for ScopeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeManager").field("active", &self.active()).finish()
    }
}
