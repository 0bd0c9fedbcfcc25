//! Service registry and type-erased constructors.

use std::any::{Any, TypeId};
use std::sync::Arc;

use ahash::AHashMap;

use crate::arguments::Arguments;
use crate::descriptors::ServiceDescriptor;
use crate::error::{DiError, DiResult, ProviderError};
use crate::internal::{BoxFuture, Disposer};
use crate::key::Key;

/// Type-erased shared instance. Trait objects are stored as `Arc<Arc<dyn Trait>>`.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// A freshly constructed instance together with its cleanup hook.
pub(crate) struct Built {
    pub(crate) value: AnyArc,
    pub(crate) disposer: Option<Disposer>,
}

pub(crate) type SyncCtor = Arc<dyn Fn(&Arguments) -> Result<Built, ProviderError> + Send + Sync>;
pub(crate) type AsyncCtor =
    Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<Built, ProviderError>> + Send + Sync>;

/// How a descriptor builds its instance.
#[derive(Clone)]
pub(crate) enum Constructor {
    Sync(SyncCtor),
    /// Suspends; only the async entry points may invoke it
    Async(AsyncCtor),
}

pub(crate) fn downcast_concrete<T: Send + Sync + 'static>(key: Key, value: AnyArc) -> DiResult<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| DiError::type_mismatch(std::any::type_name::<T>()).resolving(key))
}

pub(crate) fn downcast_trait<T: ?Sized + Send + Sync + 'static>(
    key: Key,
    value: AnyArc,
) -> DiResult<Arc<T>> {
    value
        .downcast::<Arc<T>>()
        .map(|outer| (*outer).clone())
        .map_err(|_| DiError::type_mismatch(std::any::type_name::<T>()).resolving(key))
}

/// Registry of provider descriptors.
///
/// Holds the primary key map plus tag, concrete-type and scope indices, all
/// updated together. Registration order is preserved for listing. The
/// registry is filled during bootstrap and read-only once the container is
/// built, so it carries no locking of its own.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Arguments, Injectable, ProviderError, ServiceCollection, key_of_type};
/// use ferrous_ioc::conditions::Condition;
///
/// struct Mailer;
/// impl Injectable for Mailer {
///     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
///         Ok(Mailer)
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add::<Mailer>().tagged("io").when(Condition::from(false)).register().unwrap();
///
/// let registry = services.registry();
/// assert!(registry.lookup(&key_of_type::<Mailer>()).is_some());
/// // Registered, but unavailable while its condition is false.
/// assert!(!registry.has(&key_of_type::<Mailer>()));
/// assert!(registry.find_by_tag("io").is_empty());
/// ```
#[derive(Default, Clone)]
pub struct Registry {
    entries: AHashMap<Key, Arc<ServiceDescriptor>>,
    order: Vec<Key>,
    by_tag: AHashMap<String, Vec<Key>>,
    by_type: AHashMap<TypeId, Vec<Key>>,
    by_scope: AHashMap<String, Vec<Key>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor.
    ///
    /// Fails with a registration error when the key (including its name) is
    /// already registered, unless `allow_override` is set, in which case the
    /// previous descriptor is replaced and returned.
    pub fn register(
        &mut self,
        descriptor: ServiceDescriptor,
        allow_override: bool,
    ) -> DiResult<Option<Arc<ServiceDescriptor>>> {
        let key = descriptor.key;
        if self.entries.contains_key(&key) && !allow_override {
            return Err(DiError::registration(
                Some(key),
                format!("component '{}' is already registered", key),
            ));
        }
        Ok(self.insert(Arc::new(descriptor)))
    }

    /// Inserts or replaces, keeping every index consistent with the primary map.
    pub(crate) fn insert(&mut self, descriptor: Arc<ServiceDescriptor>) -> Option<Arc<ServiceDescriptor>> {
        let key = descriptor.key;
        let previous = self.detach(&key);
        if previous.is_none() {
            self.order.push(key);
        }
        for tag in &descriptor.tags {
            self.by_tag.entry(tag.clone()).or_default().push(key);
        }
        if let Some(id) = descriptor.concrete.type_identity() {
            self.by_type.entry(id).or_default().push(key);
        }
        self.by_scope
            .entry(descriptor.lifetime.scope_name().to_string())
            .or_default()
            .push(key);
        self.entries.insert(key, descriptor);
        previous
    }

    /// Removes `key` from the primary map and indices, but not from `order`.
    fn detach(&mut self, key: &Key) -> Option<Arc<ServiceDescriptor>> {
        let previous = self.entries.remove(key)?;
        for tag in &previous.tags {
            remove_from_index(&mut self.by_tag, tag.as_str(), key);
        }
        if let Some(id) = previous.concrete.type_identity() {
            if let Some(keys) = self.by_type.get_mut(&id) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    self.by_type.remove(&id);
                }
            }
        }
        remove_from_index(&mut self.by_scope, previous.lifetime.scope_name(), key);
        Some(previous)
    }

    /// Available descriptor for `key`.
    ///
    /// Fails with not-found when absent, and with condition-failed when the
    /// descriptor exists but its condition is false.
    pub fn get(&self, key: &Key) -> DiResult<Arc<ServiceDescriptor>> {
        let descriptor = self.entries.get(key).ok_or_else(|| DiError::not_found(*key))?;
        if !descriptor.matches_condition() {
            return Err(DiError::condition_failed(*key));
        }
        Ok(descriptor.clone())
    }

    /// Raw lookup, ignoring conditions.
    pub fn lookup(&self, key: &Key) -> Option<&Arc<ServiceDescriptor>> {
        self.entries.get(key)
    }

    /// True when `key` is registered and its condition holds.
    pub fn has(&self, key: &Key) -> bool {
        self.entries.get(key).map_or(false, |d| d.matches_condition())
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<Arc<ServiceDescriptor>> {
        self.collect(self.by_tag.get(tag))
    }

    /// Descriptors whose provider produces the concrete type `T`.
    pub fn find_by_type<T: 'static>(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.find_by_type_id(TypeId::of::<T>())
    }

    pub fn find_by_type_id(&self, id: TypeId) -> Vec<Arc<ServiceDescriptor>> {
        self.collect(self.by_type.get(&id))
    }

    /// Descriptors whose lifetime maps to `scope`, e.g. `"singleton"` or `"request"`.
    pub fn find_by_scope(&self, scope: &str) -> Vec<Arc<ServiceDescriptor>> {
        self.collect(self.by_scope.get(scope))
    }

    fn collect(&self, keys: Option<&Vec<Key>>) -> Vec<Arc<ServiceDescriptor>> {
        let Some(keys) = keys else {
            return Vec::new();
        };
        let mut found: Vec<Arc<ServiceDescriptor>> = keys
            .iter()
            .filter_map(|k| self.entries.get(k))
            .filter(|d| d.matches_condition())
            .cloned()
            .collect();
        found.sort_by_key(|d| self.position(&d.key));
        found
    }

    fn position(&self, key: &Key) -> usize {
        self.order.iter().position(|k| k == key).unwrap_or(usize::MAX)
    }

    /// Removes `key`; false when it was not registered.
    pub fn remove(&mut self, key: &Key) -> bool {
        if self.detach(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.by_tag.clear();
        self.by_type.clear();
        self.by_scope.clear();
    }

    /// Every descriptor in registration order, conditions ignored.
    pub fn list_all(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.order.iter().filter_map(|k| self.entries.get(k)).cloned().collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn remove_from_index(index: &mut AHashMap<String, Vec<Key>>, name: &str, key: &Key) {
    if let Some(keys) = index.get_mut(name) {
        keys.retain(|k| k != key);
        if keys.is_empty() {
            index.remove(name);
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.order.iter()).finish()
    }
}
