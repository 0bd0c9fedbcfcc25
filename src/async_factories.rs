//! Async factory support.
//!
//! Factories whose construction suspends (network handshakes, pool warm-up,
//! authentication) are registered through
//! [`ServiceCollection::add_async_factory`](crate::ServiceCollection::add_async_factory)
//! and can only be resolved through the async entry points.

use async_trait::async_trait;

use crate::arguments::Arguments;
use crate::error::ProviderError;

/// Builds a `T` from assembled arguments, possibly suspending.
///
/// Implemented for every `Fn(Arguments) -> impl Future<Output = Result<T, ProviderError>>`,
/// so plain async closures work.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Arguments, AsyncFactory, ParamDescriptor, ProviderError, Resolver, ServiceCollection};
/// use async_trait::async_trait;
///
/// struct DatabasePool {
///     connection_string: String,
/// }
///
/// struct PoolFactory;
///
/// #[async_trait]
/// impl AsyncFactory<DatabasePool> for PoolFactory {
///     async fn create(&self, args: Arguments) -> Result<DatabasePool, ProviderError> {
///         let url = args.get::<String>("url")?;
///         Ok(DatabasePool { connection_string: url.to_string() })
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut services = ServiceCollection::new();
/// services.instance(String::from("postgres://localhost")).unwrap();
/// services
///     .add_async_factory(vec![ParamDescriptor::service::<String>("url")], PoolFactory)
///     .singleton()
///     .register()
///     .unwrap();
///
/// let container = services.build();
/// let pool = container.resolve_async::<DatabasePool>().await.unwrap();
/// assert_eq!(pool.connection_string, "postgres://localhost");
/// assert!(container.resolve_sync::<DatabasePool>().is_err());
/// # }
/// ```
#[async_trait]
pub trait AsyncFactory<T: Send + Sync + 'static>: Send + Sync + 'static {
    async fn create(&self, args: Arguments) -> Result<T, ProviderError>;
}

#[async_trait]
impl<T, F, Fut> AsyncFactory<T> for F
where
    T: Send + Sync + 'static,
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<T, ProviderError>> + Send,
{
    async fn create(&self, args: Arguments) -> Result<T, ProviderError> {
        self(args).await
    }
}
