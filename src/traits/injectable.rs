//! Constructor traits for types the container can build on its own.

use crate::arguments::Arguments;
use crate::error::ProviderError;
use crate::params::ParamDescriptor;

/// A type that declares its constructor parameters and builds itself from them.
///
/// `parameters` is the explicit replacement for signature reflection: it
/// lists every constructor parameter with its declared type and default.
/// The resolver assembles the matching [`Arguments`] and calls `construct`.
///
/// Types implementing `Injectable` can be registered with
/// [`ServiceCollection::add`](crate::ServiceCollection::add) and are
/// auto-created (as transients) when referenced through
/// [`ParamDescriptor::inject`] without being registered.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Arguments, Injectable, ParamDescriptor, ProviderError, Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// struct Database;
///
/// impl Injectable for Database {
///     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
///         Ok(Database)
///     }
/// }
///
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// impl Injectable for UserService {
///     fn parameters() -> Vec<ParamDescriptor> {
///         vec![ParamDescriptor::inject::<Database>("db")]
///     }
///
///     fn construct(args: &Arguments) -> Result<Self, ProviderError> {
///         Ok(UserService { db: args.get("db")? })
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.singleton::<Database>().unwrap();
/// services.transient::<UserService>().unwrap();
///
/// let container = services.build();
/// let a = container.resolve_sync::<UserService>().unwrap();
/// let b = container.resolve_sync::<UserService>().unwrap();
/// assert!(!Arc::ptr_eq(&a, &b));
/// assert!(Arc::ptr_eq(&a.db, &b.db));
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Constructor parameters, in order. Defaults to none.
    fn parameters() -> Vec<ParamDescriptor> {
        Vec::new()
    }

    fn construct(args: &Arguments) -> Result<Self, ProviderError>;
}

/// A type whose constructor suspends, e.g. to open a connection.
///
/// Only the async entry points can build it; synchronous resolution fails
/// with a resolution error instead of blocking.
#[async_trait::async_trait]
pub trait AsyncInjectable: Sized + Send + Sync + 'static {
    fn parameters() -> Vec<ParamDescriptor> {
        Vec::new()
    }

    async fn construct(args: Arguments) -> Result<Self, ProviderError>;
}
