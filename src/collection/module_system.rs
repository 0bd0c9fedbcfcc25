//! Grouping registrations into reusable modules.
//!
//! A module bundles the registrations of one feature area (persistence,
//! messaging, HTTP clients) so an application can compose them at bootstrap.

use crate::error::DiResult;

use super::ServiceCollection;

/// A bundle of registrations applied to a [`ServiceCollection`].
///
/// # Example
///
/// ```rust
/// use ferrous_ioc::{
///     Arguments, DiResult, Injectable, ParamDescriptor, ProviderError, Resolver, ServiceCollection,
///     ServiceCollectionExt, ServiceModule,
/// };
/// use std::sync::Arc;
///
/// struct UserConfig {
///     page_size: usize,
/// }
///
/// struct UserService {
///     config: Arc<UserConfig>,
/// }
///
/// impl Injectable for UserService {
///     fn parameters() -> Vec<ParamDescriptor> {
///         vec![ParamDescriptor::service::<UserConfig>("config")]
///     }
///
///     fn construct(args: &Arguments) -> Result<Self, ProviderError> {
///         Ok(UserService { config: args.get("config")? })
///     }
/// }
///
/// struct UserModule;
///
/// impl ServiceModule for UserModule {
///     fn register_services(self, services: &mut ServiceCollection) -> DiResult<()> {
///         services.instance(UserConfig { page_size: 50 })?.scoped::<UserService>("request")?;
///         Ok(())
///     }
/// }
///
/// # fn main() -> DiResult<()> {
/// let container = ServiceCollection::new().add_module(UserModule)?.build();
/// let scope = container.enter_scope("request")?;
/// assert_eq!(scope.resolve_sync::<UserService>()?.config.page_size, 50);
/// # Ok(())
/// # }
/// ```
pub trait ServiceModule {
    /// Adds this module's registrations to `services`.
    fn register_services(self, services: &mut ServiceCollection) -> DiResult<()>;

    /// Name used in bootstrap logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

fn apply<M: ServiceModule>(services: &mut ServiceCollection, module: M) -> DiResult<()> {
    let name = module.name();
    let before = services.len();
    module.register_services(services).map_err(|err| {
        tracing::warn!(module = name, error = %err, "module registration failed");
        err
    })?;
    tracing::debug!(module = name, registered = services.len().saturating_sub(before), "module applied");
    Ok(())
}

/// Chains modules onto an owned collection.
pub trait ServiceCollectionExt {
    /// ```rust
    /// use ferrous_ioc::{DiResult, ServiceCollection, ServiceCollectionExt, ServiceModule};
    ///
    /// struct DatabaseModule;
    /// impl ServiceModule for DatabaseModule {
    ///     fn register_services(self, services: &mut ServiceCollection) -> DiResult<()> {
    ///         services.token("database_url", String::from("sqlite::memory:"))?;
    ///         Ok(())
    ///     }
    /// }
    ///
    /// struct CacheModule;
    /// impl ServiceModule for CacheModule {
    ///     fn register_services(self, services: &mut ServiceCollection) -> DiResult<()> {
    ///         services.token("cache_ttl", 300u64)?;
    ///         Ok(())
    ///     }
    /// }
    ///
    /// # fn main() -> DiResult<()> {
    /// let container = ServiceCollection::new()
    ///     .add_module(DatabaseModule)?
    ///     .add_module(CacheModule)?
    ///     .build();
    /// assert_eq!(container.list_components().len(), 2);
    /// # Ok(())
    /// # }
    /// ```
    fn add_module<M: ServiceModule>(self, module: M) -> DiResult<Self>
    where
        Self: Sized;
}

impl ServiceCollectionExt for ServiceCollection {
    fn add_module<M: ServiceModule>(mut self, module: M) -> DiResult<Self> {
        apply(&mut self, module)?;
        Ok(self)
    }
}

/// Applies modules to a borrowed collection.
pub trait ServiceCollectionModuleExt {
    fn add_module_mut<M: ServiceModule>(&mut self, module: M) -> DiResult<&mut Self>;
}

impl ServiceCollectionModuleExt for ServiceCollection {
    fn add_module_mut<M: ServiceModule>(&mut self, module: M) -> DiResult<&mut Self> {
        apply(self, module)?;
        Ok(self)
    }
}
