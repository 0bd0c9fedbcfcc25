//! Scope handles and RAII scope guards.

use parking_lot::Mutex;

use crate::arguments::{Arguments, Overrides, Request};
use crate::error::DiResult;
use crate::internal::BoxFuture;
use crate::key::Key;
use crate::params::ParamDescriptor;
use crate::registration::AnyArc;
use crate::scopes::{ScopeFrame, ScopeManager};
use crate::traits::ResolverCore;

use super::{Container, Engine};

/// Resolution handle with its own stack of scope frames.
///
/// Singletons come from the root [`Container`]; scoped registrations are
/// cached in the innermost active frame of their scope and disposed when
/// that frame is exited. Frames belong to this handle only.
///
/// # Lifetime Behavior
///
/// - **Singleton**: resolved and cached in the root container, shared by all scopes
/// - **Scoped**: cached in the matching frame; resolving with no such frame is a scope error
/// - **Transient**: created on every resolution
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Arguments, Injectable, ProviderError, Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// struct Connection;
/// impl Injectable for Connection {
///     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
///         Ok(Connection)
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.scoped::<Connection>("request").unwrap();
/// let container = services.build();
///
/// let scope = container.enter_scope("request").unwrap();
/// let first = scope.resolve_sync::<Connection>().unwrap();
/// scope.exit("request").unwrap();
///
/// scope.enter("request").unwrap();
/// let second = scope.resolve_sync::<Connection>().unwrap();
/// assert!(!Arc::ptr_eq(&first, &second));
/// ```
pub struct Scope {
    root: Container,
    manager: Mutex<ScopeManager>,
}

impl Scope {
    pub(crate) fn new(root: Container) -> Self {
        let manager = ScopeManager::new(root.inner.hierarchy.clone());
        Scope { root, manager: Mutex::new(manager) }
    }

    /// The container this scope resolves singletons from.
    pub fn root(&self) -> &Container {
        &self.root
    }

    /// Pushes a frame for `name`.
    pub fn enter(&self, name: &str) -> DiResult<()> {
        let depth = {
            let mut manager = self.manager.lock();
            manager.enter(name)?;
            manager.depth()
        };
        tracing::debug!(scope = name, depth, "scope entered");
        self.root.inner.observers.scope_entered(name);
        Ok(())
    }

    /// Pops the innermost frame, which must be `name`, and disposes it.
    pub fn exit(&self, name: &str) -> DiResult<()> {
        let frame = self.manager.lock().exit(name)?;
        frame.dispose();
        self.exited(name);
        Ok(())
    }

    /// Like [`exit`](Self::exit), awaiting async dispose hooks.
    pub async fn exit_async(&self, name: &str) -> DiResult<()> {
        let frame = self.manager.lock().exit(name)?;
        frame.dispose_async().await;
        self.exited(name);
        Ok(())
    }

    fn exited(&self, name: &str) {
        tracing::debug!(scope = name, "scope exited");
        self.root.inner.observers.scope_exited(name);
    }

    /// Enters `name` and returns a guard that exits it when dropped.
    ///
    /// ```
    /// use ferrous_ioc::ServiceCollection;
    ///
    /// let container = ServiceCollection::new().build();
    /// let scope = container.create_scope();
    /// {
    ///     let _request = scope.enter_guard("request").unwrap();
    ///     assert!(scope.is_active("request"));
    /// }
    /// assert!(!scope.is_active("request"));
    /// ```
    pub fn enter_guard(&self, name: &str) -> DiResult<ScopeGuard<'_>> {
        self.enter(name)?;
        Ok(ScopeGuard { scope: self, name: name.to_string() })
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.manager.lock().is_active(name)
    }

    /// Active scope names, outermost first.
    pub fn active_scopes(&self) -> Vec<String> {
        self.manager.lock().active().into_iter().map(String::from).collect()
    }

    pub fn depth(&self) -> usize {
        self.manager.lock().depth()
    }

    fn engine(&self) -> Engine<'_> {
        Engine::new(&self.root.inner, Some(&self.manager))
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let manager = self.manager.get_mut();
        let mut frames: Vec<ScopeFrame> = Vec::new();
        while let Some(frame) = manager.pop() {
            frames.push(frame);
        }
        for frame in frames {
            let name = frame.name().to_string();
            frame.dispose();
            self.exited(&name);
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope").field("active", &self.active_scopes()).finish()
    }
}

impl ResolverCore for Scope {
    fn resolve_request(&self, request: &Request) -> DiResult<AnyArc> {
        self.engine().resolve_request(request)
    }

    fn resolve_request_async<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, DiResult<AnyArc>> {
        Box::pin(async move { self.engine().resolve_request_async(request).await })
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
        Box::pin(async move { self.engine().assemble_async(provider, params, overrides).await })
    }
}

/// Exits its scope frame, disposing it, when dropped.
pub struct ScopeGuard<'a> {
    scope: &'a Scope,
    name: String,
}

impl ScopeGuard<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.scope.exit(&self.name) {
            tracing::warn!(scope = %self.name, error = %err, "scope guard could not exit its frame");
        }
    }
}
