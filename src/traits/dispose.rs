//! Disposal traits for resource cleanup.

/// Synchronous teardown hook.
///
/// Opted into per registration with
/// [`with_dispose`](crate::RegistrationBuilder::with_dispose). Scoped
/// instances are disposed when their scope frame exits; singletons when the
/// container's singletons are cleared or disposed. Hooks run in reverse
/// creation order. A panicking hook is logged and does not stop the others.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Arguments, Dispose, Injectable, ProviderError, Resolver, ServiceCollection};
///
/// struct Cache;
///
/// impl Injectable for Cache {
///     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
///         Ok(Cache)
///     }
/// }
///
/// impl Dispose for Cache {
///     fn dispose(&self) {
///         println!("flushing cache");
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add::<Cache>().scoped("request").with_dispose().register().unwrap();
///
/// let container = services.build();
/// let scope = container.enter_scope("request").unwrap();
/// let _cache = scope.resolve_sync::<Cache>().unwrap();
/// scope.exit("request").unwrap(); // flushes
/// ```
pub trait Dispose: Send + Sync + 'static {
    fn dispose(&self);
}

/// Asynchronous teardown hook.
///
/// Awaited by the async disposal paths (`exit_async`, `dispose_all`).
/// Synchronous disposal hands the hook to the current tokio runtime, or
/// skips it with a warning when there is none.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::AsyncDispose;
/// use async_trait::async_trait;
///
/// struct DatabaseClient {
///     connection_id: String,
/// }
///
/// #[async_trait]
/// impl AsyncDispose for DatabaseClient {
///     async fn dispose(&self) {
///         println!("closing connection {}", self.connection_id);
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    async fn dispose(&self);
}
