//! Resolver traits for service resolution.

use std::future::{Future, IntoFuture};
use std::sync::Arc;

use crate::arguments::{Arguments, Overrides, Request};
use crate::error::{DiError, DiResult, ProviderError};
use crate::internal::BoxFuture;
use crate::key::{key_of_trait, key_of_type, Key};
use crate::params::{GenericType, ParamDescriptor};
use crate::registration::{downcast_concrete, downcast_trait, AnyArc};
use crate::traits::{AsyncInjectable, Injectable};

/// Object-safe core of service resolution.
///
/// Implemented by [`Container`](crate::Container) and
/// [`Scope`](crate::Scope). Each call starts a fresh resolution context, so
/// cycle detection is per call tree and never shared between threads.
///
/// Most users should use the [`Resolver`] trait instead, which provides
/// typed generic methods built on top of this trait.
pub trait ResolverCore: Send + Sync {
    /// Resolves a request synchronously.
    ///
    /// # Returns
    ///
    /// * `Ok(AnyArc)` - the instance; trait objects are stored as `Arc<Arc<dyn Trait>>`
    /// * `Err(DiError)` - not found, condition failed, cycle, provider failure,
    ///   or a provider that can only be built asynchronously
    fn resolve_request(&self, request: &Request) -> DiResult<AnyArc>;

    /// Resolves a request, awaiting providers that suspend.
    fn resolve_request_async<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, DiResult<AnyArc>>;

    /// Assembles arguments for an arbitrary parameter table, as if it
    /// belonged to a provider registered under `provider`.
    fn assemble(
        &self,
        provider: Key,
        params: &[ParamDescriptor],
        overrides: &Overrides,
    ) -> DiResult<Arguments>;

    fn assemble_async<'a>(
        &'a self,
        provider: Key,
        params: &'a [ParamDescriptor],
        overrides: &'a Overrides,
    ) -> BoxFuture<'a, DiResult<Arguments>>;
}

/// Typed resolution API.
///
/// Every synchronous method has a `_async` twin that shares the same
/// algorithm; the only difference is whether a suspending provider is
/// awaited or rejected. [`resolve`](Resolver::resolve) picks one based on
/// the caller's execution context.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// trait Logger: Send + Sync {
///     fn log(&self, msg: &str);
/// }
///
/// struct ConsoleLogger;
/// impl Logger for ConsoleLogger {
///     fn log(&self, msg: &str) {
///         println!("LOG: {}", msg);
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.instance(42usize).unwrap();
/// services.instance_trait::<dyn Logger>(Arc::new(ConsoleLogger)).unwrap();
///
/// let container = services.build();
/// assert_eq!(*container.resolve_sync::<usize>().unwrap(), 42);
/// container.resolve_trait_sync::<dyn Logger>().unwrap().log("resolved");
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves a concrete registered type.
    fn resolve_sync<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve_request_sync::<T>(&Request::of::<T>())
    }

    /// Resolves the registration of `T` named `name`.
    fn resolve_named_sync<T: Send + Sync + 'static>(&self, name: &'static str) -> DiResult<Arc<T>> {
        self.resolve_request_sync::<T>(&Request::of::<T>().named(name))
    }

    /// Resolves `T`, overriding named parameters of its provider.
    fn resolve_sync_with<T: Send + Sync + 'static>(&self, overrides: Overrides) -> DiResult<Arc<T>> {
        self.resolve_request_sync::<T>(&Request::of::<T>().with_overrides(overrides))
    }

    /// Resolves `T`, constructing it when it is not registered.
    fn resolve_injectable_sync<T: Injectable>(&self) -> DiResult<Arc<T>> {
        self.resolve_request_sync::<T>(&Request::injectable::<T>())
    }

    fn resolve_trait_sync<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve_trait_request_sync::<T>(&Request::trait_object::<T>())
    }

    fn resolve_trait_named_sync<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &'static str,
    ) -> DiResult<Arc<T>> {
        self.resolve_trait_request_sync::<T>(&Request::trait_object::<T>().named(name))
    }

    /// Resolves a value registered under a string token.
    fn resolve_token_sync<T: Send + Sync + 'static>(&self, token: &'static str) -> DiResult<Arc<T>> {
        self.resolve_request_sync::<T>(&Request::token(token))
    }

    /// Resolves a parameterized abstract type through its generic bindings.
    fn resolve_generic_sync<T: ?Sized + Send + Sync + 'static>(
        &self,
        generic: GenericType,
    ) -> DiResult<Arc<T>> {
        self.resolve_trait_request_sync::<T>(&Request::generic(generic))
    }

    /// Like [`resolve_sync`](Self::resolve_sync), but `None` when `T` is
    /// unregistered or its condition is false.
    fn try_resolve_sync<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        absent_as_none(key_of_type::<T>(), self.resolve_sync::<T>())
    }

    fn resolve_request_sync<T: Send + Sync + 'static>(&self, request: &Request) -> DiResult<Arc<T>> {
        downcast_concrete::<T>(request.key(), self.resolve_request(request)?)
    }

    fn resolve_trait_request_sync<T: ?Sized + Send + Sync + 'static>(
        &self,
        request: &Request,
    ) -> DiResult<Arc<T>> {
        downcast_trait::<T>(request.key(), self.resolve_request(request)?)
    }

    fn resolve_async<T: Send + Sync + 'static>(&self) -> BoxFuture<'_, DiResult<Arc<T>>> {
        self.resolve_request_async_as::<T>(Request::of::<T>())
    }

    fn resolve_named_async<T: Send + Sync + 'static>(
        &self,
        name: &'static str,
    ) -> BoxFuture<'_, DiResult<Arc<T>>> {
        self.resolve_request_async_as::<T>(Request::of::<T>().named(name))
    }

    fn resolve_async_with<T: Send + Sync + 'static>(
        &self,
        overrides: Overrides,
    ) -> BoxFuture<'_, DiResult<Arc<T>>> {
        self.resolve_request_async_as::<T>(Request::of::<T>().with_overrides(overrides))
    }

    fn resolve_injectable_async<T: Injectable>(&self) -> BoxFuture<'_, DiResult<Arc<T>>> {
        self.resolve_request_async_as::<T>(Request::injectable::<T>())
    }

    /// Resolves `T` whose constructor suspends, constructing it when unregistered.
    fn resolve_async_injectable<T: AsyncInjectable>(&self) -> BoxFuture<'_, DiResult<Arc<T>>> {
        self.resolve_request_async_as::<T>(Request::injectable_async::<T>())
    }

    fn resolve_trait_async<T: ?Sized + Send + Sync + 'static>(&self) -> BoxFuture<'_, DiResult<Arc<T>>> {
        self.resolve_trait_request_async_as::<T>(Request::trait_object::<T>())
    }

    fn resolve_generic_async<T: ?Sized + Send + Sync + 'static>(
        &self,
        generic: GenericType,
    ) -> BoxFuture<'_, DiResult<Arc<T>>> {
        self.resolve_trait_request_async_as::<T>(Request::generic(generic))
    }

    fn try_resolve_async<T: Send + Sync + 'static>(&self) -> BoxFuture<'_, DiResult<Option<Arc<T>>>> {
        Box::pin(async move { absent_as_none(key_of_type::<T>(), self.resolve_async::<T>().await) })
    }

    fn resolve_request_async_as<T: Send + Sync + 'static>(
        &self,
        request: Request,
    ) -> BoxFuture<'_, DiResult<Arc<T>>> {
        Box::pin(async move {
            let value = self.resolve_request_async(&request).await?;
            downcast_concrete::<T>(request.key(), value)
        })
    }

    fn resolve_trait_request_async_as<T: ?Sized + Send + Sync + 'static>(
        &self,
        request: Request,
    ) -> BoxFuture<'_, DiResult<Arc<T>>> {
        Box::pin(async move {
            let value = self.resolve_request_async(&request).await?;
            downcast_trait::<T>(request.key(), value)
        })
    }

    /// Resolves `T` from whichever context the caller runs in.
    ///
    /// Inside a tokio runtime the result is pending and must be awaited;
    /// elsewhere it is resolved synchronously on the spot. An async caller
    /// is never blocked.
    ///
    /// ```
    /// # use ferrous_ioc::{Resolver, ServiceCollection};
    /// let mut services = ServiceCollection::new();
    /// services.instance(7u8).unwrap();
    /// let container = services.build();
    ///
    /// // No runtime here: resolved immediately.
    /// assert_eq!(*container.resolve::<u8>().into_ready().unwrap(), 7);
    /// ```
    fn resolve<T: Send + Sync + 'static>(&self) -> Resolution<'_, T> {
        let key = key_of_type::<T>();
        if tokio::runtime::Handle::try_current().is_ok() {
            Resolution::pending(key, self.resolve_async::<T>())
        } else {
            Resolution::ready(key, self.resolve_sync::<T>())
        }
    }

    /// Trait-object flavour of [`resolve`](Self::resolve).
    fn resolve_trait<T: ?Sized + Send + Sync + 'static>(&self) -> Resolution<'_, T> {
        let key = key_of_trait::<T>();
        if tokio::runtime::Handle::try_current().is_ok() {
            Resolution::pending(key, self.resolve_trait_async::<T>())
        } else {
            Resolution::ready(key, self.resolve_trait_sync::<T>())
        }
    }

    /// Resolves `params` the way a provider's parameters are resolved, then invokes `f`.
    ///
    /// ```
    /// use ferrous_ioc::{Overrides, ParamDescriptor, Resolver, ServiceCollection};
    ///
    /// let mut services = ServiceCollection::new();
    /// services.instance(String::from("db://main")).unwrap();
    /// let container = services.build();
    ///
    /// let params = [
    ///     ParamDescriptor::service::<String>("url"),
    ///     ParamDescriptor::builtin::<u32>("retries").with_default(3u32),
    /// ];
    /// let summary = container
    ///     .call(&params, &Overrides::new().with("retries", 5u32), |args| {
    ///         Ok(format!("{} x{}", args.get::<String>("url")?, args.value::<u32>("retries")?))
    ///     })
    ///     .unwrap();
    /// assert_eq!(summary, "db://main x5");
    /// ```
    fn call<R, F>(&self, params: &[ParamDescriptor], overrides: &Overrides, f: F) -> DiResult<R>
    where
        F: FnOnce(&Arguments) -> Result<R, ProviderError>,
    {
        let provider = Key::token("call");
        let args = self.assemble(provider, params, overrides)?;
        f(&args).map_err(|e| provider_error(provider, e))
    }

    /// Async twin of [`call`](Self::call); `f` may suspend.
    fn call_async<'a, R, F, Fut>(
        &'a self,
        params: &'a [ParamDescriptor],
        overrides: &'a Overrides,
        f: F,
    ) -> BoxFuture<'a, DiResult<R>>
    where
        R: Send + 'a,
        F: FnOnce(Arguments) -> Fut + Send + 'a,
        Fut: Future<Output = Result<R, ProviderError>> + Send + 'a,
    {
        Box::pin(async move {
            let provider = Key::token("call");
            let args = self.assemble_async(provider, params, overrides).await?;
            f(args).await.map_err(|e| provider_error(provider, e))
        })
    }
}

impl<R: ResolverCore + ?Sized> Resolver for R {}

/// Keeps a [`DiError`] raised inside a provider as-is, wraps anything else.
pub(crate) fn provider_error(key: Key, err: ProviderError) -> DiError {
    match err.downcast::<DiError>() {
        Ok(inner) => *inner,
        Err(other) => DiError::provider_failed(key, other),
    }
}

fn absent_as_none<T>(key: Key, result: DiResult<Arc<T>>) -> DiResult<Option<Arc<T>>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.trail().is_empty() && is_absence_of(&err, &key) => Ok(None),
        Err(err) => Err(err),
    }
}

/// True when `err` reports that `key` itself is unavailable.
pub(crate) fn is_absence_of(err: &DiError, key: &Key) -> bool {
    match err.kind() {
        crate::ErrorKind::NotFound { key: missing } | crate::ErrorKind::ConditionFailed { key: missing } => {
            missing == key
        }
        _ => false,
    }
}

/// Outcome of [`Resolver::resolve`]: ready now, or pending on an async caller.
///
/// Implements [`IntoFuture`], so async callers simply `.await` it.
pub struct Resolution<'a, T: ?Sized> {
    key: Key,
    state: ResolutionState<'a, T>,
}

enum ResolutionState<'a, T: ?Sized> {
    Ready(DiResult<Arc<T>>),
    Pending(BoxFuture<'a, DiResult<Arc<T>>>),
}

impl<'a, T: ?Sized + Send + Sync + 'a> Resolution<'a, T> {
    fn ready(key: Key, result: DiResult<Arc<T>>) -> Self {
        Resolution { key, state: ResolutionState::Ready(result) }
    }

    fn pending(key: Key, future: BoxFuture<'a, DiResult<Arc<T>>>) -> Self {
        Resolution { key, state: ResolutionState::Pending(future) }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ResolutionState::Ready(_))
    }

    /// The synchronous result. Fails when the resolution is pending, i.e.
    /// the caller runs inside an async runtime and has to await instead.
    pub fn into_ready(self) -> DiResult<Arc<T>> {
        match self.state {
            ResolutionState::Ready(result) => result,
            ResolutionState::Pending(_) => Err(DiError::resolution(
                self.key,
                format!("{} was requested from an async context; await the resolution", self.key),
            )),
        }
    }
}

impl<'a, T: ?Sized + Send + Sync + 'a> IntoFuture for Resolution<'a, T> {
    type Output = DiResult<Arc<T>>;
    type IntoFuture = BoxFuture<'a, DiResult<Arc<T>>>;

    fn into_future(self) -> Self::IntoFuture {
        match self.state {
            ResolutionState::Ready(result) => Box::pin(async move { result }),
            ResolutionState::Pending(future) => future,
        }
    }
}
