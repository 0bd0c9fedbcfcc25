//! Service collection module for dependency injection.
//!
//! This module contains the [`ServiceCollection`] used during bootstrap to
//! register providers, and the fluent [`RegistrationBuilder`] behind it.
//! Registration is not synchronized: it is meant to happen on one thread
//! before [`ServiceCollection::build`] freezes everything into a
//! [`Container`].

use std::any::TypeId;
use std::sync::Arc;

use crate::arguments::Arguments;
use crate::async_factories::AsyncFactory;
use crate::config::ContainerOptions;
use crate::descriptors::ServiceDescriptor;
use crate::error::{DiResult, ProviderError};
use crate::generics::{GenericBinder, GenericBinding};
use crate::internal::BoxFuture;
use crate::key::{key_of_trait, Key};
use crate::observer::{DiObserver, Observers};
use crate::params::ParamDescriptor;
use crate::provider::Container;
use crate::registration::Registry;
use crate::scopes::ScopeHierarchy;
use crate::traits::{AsyncInjectable, Injectable};
use crate::validation::check_lifetimes;

mod builder;
pub mod module_system;

pub use builder::RegistrationBuilder;
use builder::Source;
pub use module_system::*;

/// Mutable registration surface, frozen by [`build`](Self::build).
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Arguments, Injectable, ParamDescriptor, ProviderError, Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// struct Config {
///     database_url: String,
/// }
///
/// struct Repository {
///     config: Arc<Config>,
/// }
///
/// impl Injectable for Repository {
///     fn parameters() -> Vec<ParamDescriptor> {
///         vec![ParamDescriptor::service::<Config>("config")]
///     }
///
///     fn construct(args: &Arguments) -> Result<Self, ProviderError> {
///         Ok(Repository { config: args.get("config")? })
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services
///     .instance(Config { database_url: "postgres://localhost".to_string() })
///     .unwrap()
///     .singleton::<Repository>()
///     .unwrap();
///
/// let container = services.build();
/// let repository = container.resolve_sync::<Repository>().unwrap();
/// assert_eq!(repository.config.database_url, "postgres://localhost");
/// ```
pub struct ServiceCollection {
    registry: Registry,
    binder: GenericBinder,
    hierarchy: ScopeHierarchy,
    observers: Observers,
    options: ContainerOptions,
}

impl ServiceCollection {
    /// Creates an empty collection with default options.
    pub fn new() -> Self {
        let options = ContainerOptions::default();
        Self {
            registry: Registry::new(),
            binder: GenericBinder::new(options.generic_ambiguity),
            hierarchy: options.scope_hierarchy(),
            observers: Observers::new(),
            options,
        }
    }

    /// Creates an empty collection with `options`, which are validated first.
    ///
    /// ```rust
    /// use ferrous_ioc::{ContainerOptions, ServiceCollection};
    ///
    /// let services = ServiceCollection::with_options(ContainerOptions::default().with_max_depth(16)).unwrap();
    /// assert_eq!(services.options().max_depth, 16);
    /// assert!(ServiceCollection::with_options(ContainerOptions::default().with_max_depth(0)).is_err());
    /// ```
    pub fn with_options(options: ContainerOptions) -> DiResult<Self> {
        options.validate()?;
        let mut services = Self::new();
        services.binder.set_policy(options.generic_ambiguity);
        services.hierarchy = options.scope_hierarchy();
        services.options = options;
        Ok(services)
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    // ----- builders -----

    /// Starts a registration of `T`, built through [`Injectable::construct`].
    pub fn add<T: Injectable>(&mut self) -> RegistrationBuilder<'_, T> {
        let source = Source::Sync(Arc::new(|args: &Arguments| T::construct(args).map(Arc::new)));
        RegistrationBuilder::new(self, TypeId::of::<T>(), T::parameters(), source)
    }

    /// Starts a registration of `T`, built through [`AsyncInjectable::construct`].
    pub fn add_async<T: AsyncInjectable>(&mut self) -> RegistrationBuilder<'_, T> {
        let source = Source::Async(Arc::new(
            |args: Arguments| -> BoxFuture<'static, Result<Arc<T>, ProviderError>> {
                Box::pin(async move { T::construct(args).await.map(Arc::new) })
            },
        ));
        RegistrationBuilder::new(self, TypeId::of::<T>(), T::parameters(), source)
    }

    /// Starts a registration of `T` produced by `factory` from `params`.
    ///
    /// ```rust
    /// use ferrous_ioc::{ParamDescriptor, Resolver, ServiceCollection};
    ///
    /// struct Endpoint(String);
    ///
    /// let mut services = ServiceCollection::new();
    /// services
    ///     .add_factory(vec![ParamDescriptor::builtin::<u16>("port").with_default(8080u16)], |args| {
    ///         Ok(Endpoint(format!("localhost:{}", args.value::<u16>("port")?)))
    ///     })
    ///     .singleton()
    ///     .register()
    ///     .unwrap();
    ///
    /// let container = services.build();
    /// assert_eq!(container.resolve_sync::<Endpoint>().unwrap().0, "localhost:8080");
    /// ```
    pub fn add_factory<T, F>(&mut self, params: Vec<ParamDescriptor>, factory: F) -> RegistrationBuilder<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> Result<T, ProviderError> + Send + Sync + 'static,
    {
        let source = Source::Sync(Arc::new(move |args: &Arguments| factory(args).map(Arc::new)));
        RegistrationBuilder::new(self, TypeId::of::<F>(), params, source).factory()
    }

    /// Starts a registration of `T` produced by a suspending factory.
    pub fn add_async_factory<T, F>(&mut self, params: Vec<ParamDescriptor>, factory: F) -> RegistrationBuilder<'_, T>
    where
        T: Send + Sync + 'static,
        F: AsyncFactory<T>,
    {
        let factory = Arc::new(factory);
        let source = Source::Async(Arc::new(
            move |args: Arguments| -> BoxFuture<'static, Result<Arc<T>, ProviderError>> {
                let factory = factory.clone();
                Box::pin(async move { factory.create(args).await.map(Arc::new) })
            },
        ));
        RegistrationBuilder::new(self, TypeId::of::<F>(), params, source).factory()
    }

    /// Starts a registration of a pre-built singleton.
    pub fn add_instance<T: Send + Sync + 'static>(&mut self, value: T) -> RegistrationBuilder<'_, T> {
        let value = Arc::new(value);
        let source = Source::Sync(Arc::new(move |_: &Arguments| Ok(value.clone())));
        RegistrationBuilder::new(self, TypeId::of::<T>(), Vec::new(), source).instance()
    }

    // ----- shorthands -----

    pub fn singleton<T: Injectable>(&mut self) -> DiResult<&mut Self> {
        self.add::<T>().singleton().register()
    }

    pub fn scoped<T: Injectable>(&mut self, scope: &str) -> DiResult<&mut Self> {
        self.add::<T>().scoped(scope).register()
    }

    pub fn transient<T: Injectable>(&mut self) -> DiResult<&mut Self> {
        self.add::<T>().transient().register()
    }

    /// Registers a transient factory.
    pub fn factory<T, F>(&mut self, params: Vec<ParamDescriptor>, factory: F) -> DiResult<&mut Self>
    where
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> Result<T, ProviderError> + Send + Sync + 'static,
    {
        self.add_factory(params, factory).register()
    }

    /// Registers a transient suspending factory.
    pub fn async_factory<T, F>(&mut self, params: Vec<ParamDescriptor>, factory: F) -> DiResult<&mut Self>
    where
        T: Send + Sync + 'static,
        F: AsyncFactory<T>,
    {
        self.add_async_factory(params, factory).register()
    }

    /// Registers `value` as the singleton for its type.
    pub fn instance<T: Send + Sync + 'static>(&mut self, value: T) -> DiResult<&mut Self> {
        self.add_instance(value).register()
    }

    /// Registers a trait-object singleton under the key of `U`.
    pub fn instance_trait<U: ?Sized + Send + Sync + 'static>(&mut self, value: Arc<U>) -> DiResult<&mut Self> {
        self.add_instance(value).with_key(key_of_trait::<U>()).register()
    }

    /// Registers a named value under a string token.
    ///
    /// ```rust
    /// use ferrous_ioc::{Resolver, ServiceCollection};
    ///
    /// let mut services = ServiceCollection::new();
    /// services.token("database_url", String::from("sqlite::memory:")).unwrap();
    /// let container = services.build();
    /// assert_eq!(*container.resolve_token_sync::<String>("database_url").unwrap(), "sqlite::memory:");
    /// ```
    pub fn token<T: Send + Sync + 'static>(&mut self, token: &'static str, value: T) -> DiResult<&mut Self> {
        self.add_instance(value).as_token(token).register()
    }

    // ----- generics and scopes -----

    /// Adds a binding from a parameterized abstract type to a concrete implementation.
    ///
    /// Registrations that may be served through the new binding are checked
    /// against the scope hierarchy; on a violation the binding is dropped.
    pub fn bind_generic(&mut self, binding: GenericBinding) -> DiResult<&mut Self> {
        let generic = binding.generic();
        self.binder.register_binding(binding);
        if let Err(err) = check_lifetimes(&self.registry, &self.binder, &self.hierarchy) {
            self.binder.pop_binding(&generic);
            tracing::debug!(generic = %generic, error = %err, "generic binding rolled back");
            return Err(err);
        }
        Ok(self)
    }

    /// Accepts `name` as a scope outside the hierarchy ordering.
    pub fn register_scope(&mut self, name: impl Into<String>) -> &mut Self {
        self.hierarchy.register_scope(name);
        self
    }

    /// Replaces the scope ordering, longest-lived first.
    ///
    /// Existing registrations are checked against the new ordering; on a
    /// violation the previous hierarchy is kept.
    pub fn define_scope_hierarchy<I, S>(&mut self, order: I) -> DiResult<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let previous = self.hierarchy.clone();
        self.hierarchy.define(order);
        if let Err(err) = check_lifetimes(&self.registry, &self.binder, &self.hierarchy) {
            self.hierarchy = previous;
            return Err(err);
        }
        Ok(self)
    }

    pub fn scope_hierarchy(&self) -> &ScopeHierarchy {
        &self.hierarchy
    }

    // ----- registry access -----

    pub(crate) fn insert_descriptor(&mut self, descriptor: ServiceDescriptor) -> DiResult<()> {
        let key = descriptor.key();
        let lifetime = descriptor.lifetime().clone();
        let previous = self.registry.register(descriptor, self.options.allow_override)?;
        if let Err(err) = check_lifetimes(&self.registry, &self.binder, &self.hierarchy) {
            match previous {
                // Replacing in place keeps the original registration order.
                Some(previous) => {
                    self.registry.insert(previous);
                }
                None => {
                    self.registry.remove(&key);
                }
            }
            tracing::debug!(key = %key, error = %err, "registration rolled back");
            return Err(err);
        }
        tracing::debug!(key = %key, %lifetime, replaced = previous.is_some(), "component registered");
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.registry.contains_key(key)
    }

    pub fn remove(&mut self, key: &Key) -> bool {
        self.registry.remove(key)
    }

    pub fn clear(&mut self) {
        self.registry.clear();
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Adds an observer notified of every resolution of the built container.
    pub fn add_observer(&mut self, observer: Arc<dyn DiObserver>) -> &mut Self {
        self.observers.add(observer);
        self
    }

    /// Freezes the registrations into a [`Container`].
    pub fn build(self) -> Container {
        Container::new(self.registry, self.binder, self.hierarchy, self.observers, self.options)
    }
}

impl Default for ServiceCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("registry", &self.registry)
            .field("bindings", &self.binder.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}
