//! Fluent registration builder.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::arguments::Arguments;
use crate::conditions::Condition;
use crate::descriptors::ServiceDescriptor;
use crate::error::{DiError, DiResult, ProviderError};
use crate::internal::{BoxFuture, Disposer};
use crate::key::{key_of_trait, key_of_type, Key};
use crate::lifetime::Lifetime;
use crate::params::ParamDescriptor;
use crate::registration::{AnyArc, Built, Constructor};
use crate::traits::{AsyncDispose, AsyncInitialize, Dispose, Initialize};

use super::ServiceCollection;

type SyncSource<T> = Arc<dyn Fn(&Arguments) -> Result<Arc<T>, ProviderError> + Send + Sync>;
type AsyncSource<T> = Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<Arc<T>, ProviderError>> + Send + Sync>;
type Expose<T> = Arc<dyn Fn(Arc<T>) -> AnyArc + Send + Sync>;

/// Where the raw instance comes from.
pub(crate) enum Source<T> {
    Sync(SyncSource<T>),
    Async(AsyncSource<T>),
}

enum Init<T> {
    Sync(fn(&T) -> Result<(), ProviderError>),
    Async(fn(Arc<T>) -> BoxFuture<'static, Result<(), ProviderError>>),
}

/// Steps applied to a freshly built instance: initializers, dispose hook
/// capture and conversion to the registered key's storage form.
struct Finisher<T> {
    key: Key,
    inits: Vec<Init<T>>,
    dispose: Option<fn(Arc<T>) -> Disposer>,
    expose: Expose<T>,
}

impl<T: Send + Sync + 'static> Finisher<T> {
    fn is_async(&self) -> bool {
        self.inits.iter().any(|init| matches!(init, Init::Async(_)))
    }

    fn init_failed(&self, err: ProviderError) -> ProviderError {
        Box::new(DiError::resolution(self.key, format!("Failed to initialize {}: {}", self.key, err)))
    }

    fn complete(&self, value: Arc<T>) -> Built {
        let disposer = self.dispose.map(|hook| hook(value.clone()));
        Built { value: (self.expose)(value), disposer }
    }

    fn finish(&self, value: Arc<T>) -> Result<Built, ProviderError> {
        for init in &self.inits {
            match init {
                Init::Sync(hook) => hook(&value).map_err(|e| self.init_failed(e))?,
                Init::Async(_) => {
                    return Err(Box::new(DiError::resolution(
                        self.key,
                        format!("cannot synchronously resolve a suspending provider {}; use resolve_async", self.key),
                    )))
                }
            }
        }
        Ok(self.complete(value))
    }

    async fn finish_async(&self, value: Arc<T>) -> Result<Built, ProviderError> {
        for init in &self.inits {
            match init {
                Init::Sync(hook) => hook(&value).map_err(|e| self.init_failed(e))?,
                Init::Async(hook) => hook(value.clone()).await.map_err(|e| self.init_failed(e))?,
            }
        }
        Ok(self.complete(value))
    }
}

/// Builder returned by the `add*` methods of [`ServiceCollection`].
///
/// Nothing is registered until [`register`](Self::register) is called.
/// The default lifetime is transient, except for instances, which are
/// always singletons.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Arguments, Injectable, Key, ProviderError, Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Injectable for English {
///     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
///         Ok(English)
///     }
/// }
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".into()
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services
///     .add::<English>()
///     .singleton()
///     .named("en")
///     .tagged("i18n")
///     .as_trait::<dyn Greeter>(|english| english)
///     .register()
///     .unwrap();
///
/// let container = services.build();
/// let greeter = container.resolve_trait_named_sync::<dyn Greeter>("en").unwrap();
/// assert_eq!(greeter.greet(), "hello");
/// ```
pub struct RegistrationBuilder<'c, T: Send + Sync + 'static> {
    services: &'c mut ServiceCollection,
    key: Key,
    concrete: Key,
    provider_id: TypeId,
    params: Vec<ParamDescriptor>,
    source: Source<T>,
    lifetime: Lifetime,
    tags: BTreeSet<String>,
    condition: Option<Condition>,
    lazy: bool,
    metadata: HashMap<String, Arc<dyn Any + Send + Sync>>,
    is_factory: bool,
    is_instance: bool,
    inits: Vec<Init<T>>,
    dispose: Option<fn(Arc<T>) -> Disposer>,
    expose: Expose<T>,
}

impl<'c, T: Send + Sync + 'static> RegistrationBuilder<'c, T> {
    pub(crate) fn new(
        services: &'c mut ServiceCollection,
        provider_id: TypeId,
        params: Vec<ParamDescriptor>,
        source: Source<T>,
    ) -> Self {
        RegistrationBuilder {
            services,
            key: key_of_type::<T>(),
            concrete: key_of_type::<T>(),
            provider_id,
            params,
            source,
            lifetime: Lifetime::Transient,
            tags: BTreeSet::new(),
            condition: None,
            lazy: false,
            metadata: HashMap::new(),
            is_factory: false,
            is_instance: false,
            inits: Vec::new(),
            dispose: None,
            expose: Arc::new(|value: Arc<T>| value as AnyArc),
        }
    }

    pub(crate) fn factory(mut self) -> Self {
        self.is_factory = true;
        self
    }

    pub(crate) fn instance(mut self) -> Self {
        self.is_instance = true;
        self.lifetime = Lifetime::Singleton;
        self
    }

    pub(crate) fn with_key(mut self, key: Key) -> Self {
        self.key = key;
        self
    }

    pub fn singleton(mut self) -> Self {
        self.lifetime = Lifetime::Singleton;
        self
    }

    /// Caches one instance per active frame of `scope`.
    pub fn scoped(mut self, scope: &str) -> Self {
        self.lifetime = Lifetime::scoped(scope);
        self
    }

    pub fn transient(mut self) -> Self {
        self.lifetime = Lifetime::Transient;
        self
    }

    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Registers under `key:name`, leaving the unnamed key free.
    pub fn named(mut self, name: &'static str) -> Self {
        self.key = self.key.named(name);
        self
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Makes the registration available only while `condition` holds.
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Excludes a singleton from [`Container::warm_up`](crate::Container::warm_up).
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn with_metadata<V: Any + Send + Sync>(mut self, key: impl Into<String>, value: V) -> Self {
        self.metadata.insert(key.into(), Arc::new(value));
        self
    }

    /// Runs [`Dispose::dispose`] when the owning scope or container disposes the instance.
    pub fn with_dispose(mut self) -> Self
    where
        T: Dispose,
    {
        self.dispose = Some(|value: Arc<T>| Disposer::sync(move || value.dispose()));
        self
    }

    pub fn with_async_dispose(mut self) -> Self
    where
        T: AsyncDispose,
    {
        self.dispose = Some(|value: Arc<T>| Disposer::asynchronous(move || async move { value.dispose().await }));
        self
    }

    /// Runs [`Initialize::initialize`] after construction, before caching.
    pub fn with_initialize(mut self) -> Self
    where
        T: Initialize,
    {
        self.inits.push(Init::Sync(|value: &T| value.initialize()));
        self
    }

    /// Like [`with_initialize`](Self::with_initialize); the service becomes async-only.
    pub fn with_async_initialize(mut self) -> Self
    where
        T: AsyncInitialize,
    {
        self.inits.push(Init::Async(|value: Arc<T>| -> BoxFuture<'static, Result<(), ProviderError>> {
            Box::pin(async move { value.initialize().await })
        }));
        self
    }

    /// Registers under the trait-object key of `U`, keeping any name.
    ///
    /// `cast` performs the unsizing, usually just `|value| value`.
    pub fn as_trait<U: ?Sized + Send + Sync + 'static>(mut self, cast: fn(Arc<T>) -> Arc<U>) -> Self {
        self.key = key_of_trait::<U>().with_name(self.key.service_name());
        self.expose = Arc::new(move |value: Arc<T>| Arc::new(cast(value)) as AnyArc);
        self
    }

    /// Registers under a string token, keeping any name.
    pub fn as_token(mut self, token: &'static str) -> Self {
        self.key = Key::token(token).with_name(self.key.service_name());
        self
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// Validates and adds the registration.
    ///
    /// Fails on a duplicate key (unless overrides are allowed), an unknown
    /// scope name, a lifetime-hierarchy violation, or an instance registered
    /// with a non-singleton lifetime. A failed registration leaves the
    /// collection unchanged.
    pub fn register(self) -> DiResult<&'c mut ServiceCollection> {
        if self.is_instance && !self.lifetime.is_singleton() {
            return Err(DiError::configuration(format!(
                "instance registration {} must be a singleton, not {}",
                self.key, self.lifetime
            )));
        }
        let finisher = Arc::new(Finisher {
            key: self.key,
            inits: self.inits,
            dispose: self.dispose,
            expose: self.expose,
        });
        let constructor = compose(self.source, finisher);
        let mut descriptor = ServiceDescriptor::new(self.key, self.concrete, self.provider_id, constructor, self.params);
        descriptor.lifetime = self.lifetime;
        descriptor.tags = self.tags;
        descriptor.condition = self.condition;
        descriptor.lazy = self.lazy;
        descriptor.metadata = self.metadata;
        descriptor.is_factory = self.is_factory;
        self.services.insert_descriptor(descriptor)?;
        Ok(self.services)
    }
}

fn compose<T: Send + Sync + 'static>(source: Source<T>, finisher: Arc<Finisher<T>>) -> Constructor {
    match source {
        Source::Sync(make) if !finisher.is_async() => {
            Constructor::Sync(Arc::new(move |args: &Arguments| -> Result<Built, ProviderError> {
                finisher.finish(make(args)?)
            }))
        }
        Source::Sync(make) => Constructor::Async(Arc::new(
            move |args: Arguments| -> BoxFuture<'static, Result<Built, ProviderError>> {
                let made = make(&args);
                let finisher = finisher.clone();
                Box::pin(async move { finisher.finish_async(made?).await })
            },
        )),
        Source::Async(make) => Constructor::Async(Arc::new(
            move |args: Arguments| -> BoxFuture<'static, Result<Built, ProviderError>> {
                let pending = make(args);
                let finisher = finisher.clone();
                Box::pin(async move { finisher.finish_async(pending.await?).await })
            },
        )),
    }
}
