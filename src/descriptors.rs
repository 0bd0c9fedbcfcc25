//! Service descriptors for registration, introspection and diagnostics.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::conditions::Condition;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::params::{AutoConstruct, AutoCreate, ParamDescriptor};
use crate::registration::{Built, Constructor};

/// Registered metadata describing how to produce and cache one key.
///
/// Descriptors are immutable once registered and shared as
/// `Arc<ServiceDescriptor>` between the registry and the resolver.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Arguments, Injectable, Lifetime, ProviderError, ServiceCollection, key_of_type};
///
/// struct Database;
/// impl Injectable for Database {
///     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
///         Ok(Database)
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services
///     .add::<Database>()
///     .singleton()
///     .tagged("infrastructure")
///     .tagged("storage")
///     .register()
///     .unwrap();
///
/// let descriptor = services.registry().lookup(&key_of_type::<Database>()).unwrap();
/// assert_eq!(descriptor.lifetime(), &Lifetime::Singleton);
/// assert!(descriptor.has_all_tags(["infrastructure", "storage"]));
/// assert!(!descriptor.has_any_tag(["web"]));
/// ```
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub(crate) key: Key,
    pub(crate) concrete: Key,
    pub(crate) provider_id: TypeId,
    pub(crate) constructor: Constructor,
    pub(crate) params: Arc<[ParamDescriptor]>,
    pub(crate) lifetime: Lifetime,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) condition: Option<Condition>,
    pub(crate) lazy: bool,
    pub(crate) metadata: HashMap<String, Arc<dyn Any + Send + Sync>>,
    pub(crate) is_factory: bool,
}

impl ServiceDescriptor {
    pub(crate) fn new(
        key: Key,
        concrete: Key,
        provider_id: TypeId,
        constructor: Constructor,
        params: Vec<ParamDescriptor>,
    ) -> Self {
        Self {
            key,
            concrete,
            provider_id,
            constructor,
            params: params.into(),
            lifetime: Lifetime::Transient,
            tags: BTreeSet::new(),
            condition: None,
            lazy: false,
            metadata: HashMap::new(),
            is_factory: false,
        }
    }

    /// Transient descriptor synthesized for an unregistered constructible type.
    pub(crate) fn synthesized(auto: &AutoCreate) -> Self {
        let constructor = match auto.construct {
            AutoConstruct::Sync(construct) => Constructor::Sync(Arc::new(move |args| {
                construct(args).map(|value| Built { value, disposer: None })
            })),
            AutoConstruct::Async(construct) => Constructor::Async(Arc::new(move |args| {
                let fut = construct(args);
                Box::pin(async move { fut.await.map(|value| Built { value, disposer: None }) })
            })),
        };
        Self::new(auto.concrete, auto.concrete, auto.provider_id, constructor, auto.parameters())
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// Concrete type produced by the provider.
    pub fn concrete(&self) -> Key {
        self.concrete
    }

    /// Identity used to cache analyzer decisions for this provider.
    pub fn provider_id(&self) -> TypeId {
        self.provider_id
    }

    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    pub fn name(&self) -> Option<&'static str> {
        self.key.service_name()
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// False for an empty tag set.
    pub fn has_any_tag<'t>(&self, tags: impl IntoIterator<Item = &'t str>) -> bool {
        tags.into_iter().any(|t| self.tags.contains(t))
    }

    /// True for an empty tag set.
    pub fn has_all_tags<'t>(&self, tags: impl IntoIterator<Item = &'t str>) -> bool {
        tags.into_iter().all(|t| self.tags.contains(t))
    }

    /// Evaluates the registration condition; no condition means available.
    pub fn matches_condition(&self) -> bool {
        self.condition.as_ref().map_or(true, Condition::evaluate)
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    /// Excluded from warm-up. Resolution is unaffected.
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn is_factory(&self) -> bool {
        self.is_factory
    }

    /// True when the provider can only be built by the async entry points.
    pub fn is_async(&self) -> bool {
        matches!(self.constructor, Constructor::Async(_))
    }

    pub fn metadata(&self, key: &str) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.metadata.get(key)
    }

    pub fn metadata_keys(&self) -> impl Iterator<Item = &str> {
        self.metadata.keys().map(String::as_str)
    }

    /// Snapshot for introspection.
    pub fn info(&self) -> ComponentInfo {
        ComponentInfo {
            key: self.key,
            concrete: self.concrete.display_name(),
            lifetime: self.lifetime.clone(),
            name: self.name(),
            tags: self.tags.iter().cloned().collect(),
            lazy: self.lazy,
            is_factory: self.is_factory,
            is_async: self.is_async(),
            condition_met: self.matches_condition(),
            parameters: self.params.iter().map(|p| p.name).collect(),
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .field("concrete", &self.concrete.display_name())
            .field("lifetime", &self.lifetime)
            .field("tags", &self.tags)
            .field("lazy", &self.lazy)
            .field("is_factory", &self.is_factory)
            .field("async", &self.is_async())
            .finish()
    }
}

/// Introspection view of one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    pub key: Key,
    pub concrete: &'static str,
    pub lifetime: Lifetime,
    pub name: Option<&'static str>,
    pub tags: Vec<String>,
    pub lazy: bool,
    pub is_factory: bool,
    pub is_async: bool,
    pub condition_met: bool,
    pub parameters: Vec<&'static str>,
}

impl fmt::Display for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} [{}]", self.key, self.concrete, self.lifetime)?;
        if !self.tags.is_empty() {
            write!(f, " tags={}", self.tags.join(","))?;
        }
        if !self.condition_met {
            f.write_str(" (condition not met)")?;
        }
        Ok(())
    }
}
