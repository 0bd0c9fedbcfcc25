//! The built container and its scope handles.
//!
//! This module contains the [`Container`] type produced by
//! [`ServiceCollection::build`](crate::ServiceCollection::build), the
//! [`Scope`] handles it hands out, and the resolution engine both share.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};

use crate::analyzer::{AnalysisView, Analyzer, DependencyNode, DEFAULT_TREE_DEPTH};
use crate::arguments::{Arguments, Overrides, Request};
use crate::config::ContainerOptions;
use crate::descriptors::{ComponentInfo, ServiceDescriptor};
use crate::error::DiResult;
use crate::generics::GenericBinder;
use crate::internal::{BoxFuture, DisposeBag, SingletonCache};
use crate::key::{key_of_trait, key_of_type, Key};
use crate::lazy::Lazy;
use crate::lifetime::Lifetime;
use crate::observer::Observers;
use crate::params::{AutoCreate, ParamDescriptor};
use crate::registration::{AnyArc, Registry};
use crate::scopes::ScopeHierarchy;
use crate::traits::ResolverCore;
use crate::validation::{validate_registry, ValidationReport};

mod context;
mod engine;
mod scope;

pub(crate) use engine::Engine;
pub use scope::{Scope, ScopeGuard};

/// Frozen registry plus every cache that lives as long as the container.
pub(crate) struct ContainerInner {
    registry: Registry,
    binder: GenericBinder,
    analyzer: Analyzer,
    hierarchy: Arc<ScopeHierarchy>,
    singletons: SingletonCache,
    root_disposers: Mutex<DisposeBag>,
    /// Descriptors made up for auto-created types, reused across resolutions
    synthesized: RwLock<AHashMap<Key, Arc<ServiceDescriptor>>>,
    observers: Observers,
    options: ContainerOptions,
}

impl ContainerInner {
    fn synthesized(&self, auto: &AutoCreate) -> Arc<ServiceDescriptor> {
        if let Some(descriptor) = self.synthesized.read().get(&auto.concrete) {
            return descriptor.clone();
        }
        self.synthesized
            .write()
            .entry(auto.concrete)
            .or_insert_with(|| Arc::new(ServiceDescriptor::synthesized(auto)))
            .clone()
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        let pending = self.root_disposers.get_mut().len();
        if pending > 0 {
            tracing::warn!(
                pending,
                "container dropped with undisposed singletons; call clear_singletons or dispose_all first"
            );
        }
    }
}

/// Built, thread-safe container.
///
/// The registry is read-only once the container is built. Cloning is cheap:
/// clones share the registry, the singleton cache and the analyzer cache.
///
/// # Lifetime Behavior
///
/// - **Singleton**: created at most once per key, shared by every clone and scope
/// - **Scoped**: cached in the innermost active frame of that scope, see [`Scope`]
/// - **Transient**: created on every resolution
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Arguments, Injectable, ParamDescriptor, ProviderError, Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// struct Database {
///     url: String,
/// }
///
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// impl Injectable for UserService {
///     fn parameters() -> Vec<ParamDescriptor> {
///         vec![ParamDescriptor::service::<Database>("db")]
///     }
///
///     fn construct(args: &Arguments) -> Result<Self, ProviderError> {
///         Ok(UserService { db: args.get("db")? })
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.instance(Database { url: "postgres://localhost".to_string() }).unwrap();
/// services.transient::<UserService>().unwrap();
///
/// let container = services.build();
/// let first = container.resolve_sync::<UserService>().unwrap();
/// let second = container.resolve_sync::<UserService>().unwrap();
/// assert!(!Arc::ptr_eq(&first, &second));
/// assert!(Arc::ptr_eq(&first.db, &second.db));
/// assert_eq!(first.db.url, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub(crate) fn new(
        registry: Registry,
        binder: GenericBinder,
        hierarchy: ScopeHierarchy,
        observers: Observers,
        options: ContainerOptions,
    ) -> Self {
        tracing::debug!(components = registry.len(), bindings = binder.len(), "container built");
        let inner = ContainerInner {
            analyzer: Analyzer::new(options.analyzer_cache_capacity),
            registry,
            binder,
            hierarchy: Arc::new(hierarchy),
            singletons: SingletonCache::new(),
            root_disposers: Mutex::new(DisposeBag::default()),
            synthesized: RwLock::new(AHashMap::new()),
            observers,
            options,
        };
        Container { inner: Arc::new(inner) }
    }

    fn engine(&self) -> Engine<'_> {
        Engine::new(&self.inner, None)
    }

    /// Creates a scope handle with no active frames.
    ///
    /// Scoped registrations resolve only while a frame for their scope is
    /// entered on the handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_ioc::{Arguments, Injectable, ProviderError, Resolver, ServiceCollection};
    /// use std::sync::Arc;
    ///
    /// #[derive(Debug)]
    /// struct RequestId;
    /// impl Injectable for RequestId {
    ///     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
    ///         Ok(RequestId)
    ///     }
    /// }
    ///
    /// let mut services = ServiceCollection::new();
    /// services.scoped::<RequestId>("request").unwrap();
    /// let container = services.build();
    ///
    /// let scope = container.create_scope();
    /// assert!(scope.resolve_sync::<RequestId>().unwrap_err().is_scope_error());
    ///
    /// scope.enter("request").unwrap();
    /// let a = scope.resolve_sync::<RequestId>().unwrap();
    /// let b = scope.resolve_sync::<RequestId>().unwrap();
    /// assert!(Arc::ptr_eq(&a, &b));
    /// scope.exit("request").unwrap();
    /// ```
    pub fn create_scope(&self) -> Scope {
        Scope::new(self.clone())
    }

    /// Creates a scope handle and enters `name` on it.
    pub fn enter_scope(&self, name: &str) -> DiResult<Scope> {
        let scope = self.create_scope();
        scope.enter(name)?;
        Ok(scope)
    }

    /// Deferred handle to `T`, resolved on first use.
    pub fn lazy<T: Send + Sync + 'static>(&self) -> Lazy<T> {
        Lazy::concrete(key_of_type::<T>(), Arc::downgrade(&self.inner))
    }

    pub fn lazy_named<T: Send + Sync + 'static>(&self, name: &'static str) -> Lazy<T> {
        Lazy::concrete(key_of_type::<T>().named(name), Arc::downgrade(&self.inner))
    }

    pub fn lazy_trait<T: ?Sized + Send + Sync + 'static>(&self) -> Lazy<T> {
        Lazy::trait_object(key_of_trait::<T>(), Arc::downgrade(&self.inner))
    }

    /// Introspection view of the registration under `key`.
    pub fn component_info(&self, key: &Key) -> Option<ComponentInfo> {
        self.inner.registry.lookup(key).map(|d| d.info())
    }

    /// Every registration, in registration order.
    pub fn list_components(&self) -> Vec<ComponentInfo> {
        self.inner.registry.list_all().iter().map(|d| d.info()).collect()
    }

    pub fn is_registered(&self, key: &Key) -> bool {
        self.inner.registry.has(key)
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    pub fn scope_hierarchy(&self) -> &ScopeHierarchy {
        &self.inner.hierarchy
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.inner.analyzer
    }

    /// Number of singletons created so far.
    pub fn singleton_count(&self) -> usize {
        self.inner.singletons.ready_count()
    }

    /// Forgets singletons, analyzer decisions, generic-binding choices and
    /// auto-creation descriptors. Nothing is disposed.
    pub fn clear_caches(&self) {
        self.inner.singletons.clear();
        self.inner.analyzer.clear_cache();
        self.inner.binder.clear_cache();
        self.inner.synthesized.write().clear();
        tracing::debug!("container caches cleared");
    }

    /// Runs singleton dispose hooks in reverse creation order, then drops the singletons.
    ///
    /// Async hooks are spawned on the current tokio runtime, or skipped with
    /// a warning outside one. Use [`clear_singletons_async`](Self::clear_singletons_async)
    /// to await them.
    pub fn clear_singletons(&self) {
        let mut bag = self.inner.root_disposers.lock().take();
        bag.run_all_blocking("container");
        self.inner.singletons.clear();
    }

    pub async fn clear_singletons_async(&self) {
        let mut bag = self.inner.root_disposers.lock().take();
        bag.run_all("container").await;
        self.inner.singletons.clear();
    }

    /// Disposes every singleton, awaiting async hooks, and clears all caches.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_ioc::{Arguments, AsyncDispose, Injectable, ProviderError, Resolver, ServiceCollection};
    /// use std::sync::atomic::{AtomicBool, Ordering};
    /// use std::sync::Arc;
    ///
    /// static CLOSED: AtomicBool = AtomicBool::new(false);
    ///
    /// struct Client;
    /// impl Injectable for Client {
    ///     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
    ///         Ok(Client)
    ///     }
    /// }
    ///
    /// #[async_trait::async_trait]
    /// impl AsyncDispose for Client {
    ///     async fn dispose(&self) {
    ///         CLOSED.store(true, Ordering::SeqCst);
    ///     }
    /// }
    ///
    /// # tokio_test();
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn tokio_test() {
    /// let mut services = ServiceCollection::new();
    /// services.add::<Client>().singleton().with_async_dispose().register().unwrap();
    /// let container = services.build();
    /// container.resolve_async::<Client>().await.unwrap();
    ///
    /// container.dispose_all().await;
    /// assert!(CLOSED.load(Ordering::SeqCst));
    /// assert_eq!(container.singleton_count(), 0);
    /// # }
    /// ```
    pub async fn dispose_all(&self) {
        self.clear_singletons_async().await;
        self.clear_caches();
    }

    fn warm_up_keys(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.inner
            .registry
            .list_all()
            .into_iter()
            .filter(|d| matches!(d.lifetime(), Lifetime::Singleton) && !d.is_lazy() && d.matches_condition())
            .collect()
    }

    /// Creates every eager singleton whose condition holds.
    ///
    /// Singletons with a suspending provider are left to
    /// [`warm_up_async`](Self::warm_up_async). Returns the number resolved.
    pub fn warm_up(&self) -> DiResult<usize> {
        let mut count = 0;
        for descriptor in self.warm_up_keys() {
            if descriptor.is_async() {
                tracing::debug!(key = %descriptor.key(), "warm-up skips suspending provider");
                continue;
            }
            self.resolve_request(&Request::from(descriptor.key()))?;
            count += 1;
        }
        tracing::debug!(count, "singletons warmed up");
        Ok(count)
    }

    pub async fn warm_up_async(&self) -> DiResult<usize> {
        let mut count = 0;
        for descriptor in self.warm_up_keys() {
            self.resolve_request_async(&Request::from(descriptor.key())).await?;
            count += 1;
        }
        tracing::debug!(count, "singletons warmed up");
        Ok(count)
    }

    /// Static dependency tree of the registration under `key`.
    pub fn dependency_tree(&self, key: Key) -> DependencyNode {
        self.dependency_tree_with_depth(key, DEFAULT_TREE_DEPTH)
    }

    pub fn dependency_tree_with_depth(&self, key: Key, max_depth: usize) -> DependencyNode {
        let view = AnalysisView::new(&self.inner.registry, &self.inner.binder);
        Analyzer::dependency_tree(key, None, view, max_depth)
    }

    /// Static check of the whole registry; nothing is resolved.
    pub fn validate(&self) -> ValidationReport {
        validate_registry(&self.inner.registry, &self.inner.binder)
    }

    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        let mut s = String::new();
        s.push_str("=== Container ===\n");
        for info in self.list_components() {
            s.push_str(&format!("  {}\n", info));
        }
        s.push_str(&format!(
            "singletons: {} created, {} pending dispose\n",
            self.singleton_count(),
            self.inner.root_disposers.lock().len()
        ));
        s.push_str(&format!("analyzer: {:?}\n", self.inner.analyzer));
        s.push_str(&format!("generic bindings: {}\n", self.inner.binder.len()));
        s
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("components", &self.inner.registry.len())
            .field("singletons", &self.singleton_count())
            .finish()
    }
}

impl ResolverCore for Container {
    fn resolve_request(&self, request: &Request) -> DiResult<AnyArc> {
        self.engine().resolve_request(request)
    }

    fn resolve_request_async<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, DiResult<AnyArc>> {
        Box::pin(async move { Engine::new(&self.inner, None).resolve_request_async(request).await })
    }

    fn assemble(&self, provider: Key, params: &[ParamDescriptor], overrides: &Overrides) -> DiResult<Arguments> {
        self.engine().assemble(provider, params, overrides)
    }

    fn assemble_async<'a>(
        &'a self,
        provider: Key,
        params: &'a [ParamDescriptor],
        overrides: &'a Overrides,
    ) -> BoxFuture<'a, DiResult<Arguments>> {
        Box::pin(async move { Engine::new(&self.inner, None).assemble_async(provider, params, overrides).await })
    }
}
