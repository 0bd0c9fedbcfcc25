//! Post-construction initialization hooks.

use crate::error::ProviderError;

/// Runs right after construction, before the instance is cached or returned.
///
/// A failing hook turns the resolution into a resolution error and nothing
/// is cached.
pub trait Initialize: Send + Sync + 'static {
    fn initialize(&self) -> Result<(), ProviderError>;
}

/// Suspending variant of [`Initialize`].
///
/// Registering one makes the service asynchronous: it can then only be
/// resolved through the async entry points.
#[async_trait::async_trait]
pub trait AsyncInitialize: Send + Sync + 'static {
    async fn initialize(&self) -> Result<(), ProviderError>;
}
