//! Deferred resolution handles.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

use crate::arguments::Request;
use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::provider::{ContainerInner, Engine};
use crate::registration::{downcast_concrete, downcast_trait, AnyArc};

thread_local! {
    static FORCING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static FORCING_TASK: Vec<usize>;
}

/// A dependency resolved on first use.
///
/// The handle remembers the key and holds only a weak reference to the
/// container that created it. The first successful [`value`](Self::value)
/// resolves and caches the instance; later reads never resolve again.
/// Once every clone of the owning container is gone, forcing an
/// unresolved handle fails with a resolution error instead of resolving.
///
/// Lazy handles resolve against the root container, so scoped services
/// cannot be deferred.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Arguments, Injectable, ProviderError, ServiceCollection};
///
/// struct Report;
/// impl Injectable for Report {
///     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
///         Ok(Report)
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.singleton::<Report>().unwrap();
/// let container = services.build();
///
/// let report = container.lazy::<Report>();
/// assert!(!report.is_resolved());
/// let first = report.value().unwrap();
/// assert!(report.is_resolved());
/// assert!(std::sync::Arc::ptr_eq(&first, &report.value().unwrap()));
/// ```
pub struct Lazy<T: ?Sized> {
    key: Key,
    owner: Weak<ContainerInner>,
    cell: OnceCell<Arc<T>>,
    extract: fn(Key, AnyArc) -> DiResult<Arc<T>>,
}

impl<T: Send + Sync + 'static> Lazy<T> {
    pub(crate) fn concrete(key: Key, owner: Weak<ContainerInner>) -> Self {
        Lazy { key, owner, cell: OnceCell::new(), extract: downcast_concrete::<T> }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Lazy<T> {
    pub(crate) fn trait_object(key: Key, owner: Weak<ContainerInner>) -> Self {
        Lazy { key, owner, cell: OnceCell::new(), extract: downcast_trait::<T> }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// True once a value has been resolved. Never triggers resolution.
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The instance, resolving it on first access.
    ///
    /// Fails when called on a thread that is driving a tokio runtime (use
    /// [`value_async`](Self::value_async) there), when the handle is forced
    /// again while it is being forced, and when the container is gone.
    pub fn value(&self) -> DiResult<Arc<T>> {
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(DiError::resolution(
                self.key,
                format!("Lazy<{}> cannot be forced synchronously inside an async runtime; use value_async", self.key),
            ));
        }
        let _forcing = ForceGuard::enter(self.id()).ok_or_else(|| self.circular())?;
        let owner = self.owner()?;
        let value = Engine::new(&owner, None)
            .resolve_request(&Request::from(self.key))
            .map_err(|err| self.reentered(err))?;
        self.publish(value)
    }

    /// Async twin of [`value`](Self::value); awaits suspending providers.
    pub async fn value_async(&self) -> DiResult<Arc<T>> {
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }
        let id = self.id();
        let mut forcing = FORCING_TASK.try_with(Clone::clone).unwrap_or_default();
        if forcing.contains(&id) {
            return Err(self.circular());
        }
        forcing.push(id);
        FORCING_TASK
            .scope(forcing, async {
                let owner = self.owner()?;
                let request = Request::from(self.key);
                let value = Engine::new(&owner, None)
                    .resolve_request_async(&request)
                    .await
                    .map_err(|err| self.reentered(err))?;
                self.publish(value)
            })
            .await
    }

    fn publish(&self, value: AnyArc) -> DiResult<Arc<T>> {
        let typed = (self.extract)(self.key, value)?;
        Ok(self.cell.get_or_init(|| typed).clone())
    }

    fn owner(&self) -> DiResult<Arc<ContainerInner>> {
        self.owner.upgrade().ok_or_else(|| {
            DiError::resolution(self.key, format!("cannot force Lazy<{}>: container has been dropped", self.key))
        })
    }

    fn circular(&self) -> DiError {
        DiError::resolution(self.key, format!("circular lazy resolution of {}", self.key))
    }

    /// A handle forced while its own singleton is being built reports the
    /// lazy cycle rather than the self-dependency.
    fn reentered(&self, err: DiError) -> DiError {
        let own = err.trail().is_empty()
            && matches!(err.cycle(), Some([first, last]) if *first == self.key && *last == self.key);
        if own {
            self.circular()
        } else {
            err
        }
    }

    fn id(&self) -> usize {
        self as *const Self as *const () as usize
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("key", &self.key)
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

/// Marks a handle as being forced on this thread.
struct ForceGuard(usize);

impl ForceGuard {
    fn enter(id: usize) -> Option<Self> {
        FORCING.with(|forcing| {
            let mut forcing = forcing.borrow_mut();
            if forcing.contains(&id) {
                None
            } else {
                forcing.push(id);
                Some(ForceGuard(id))
            }
        })
    }
}

impl Drop for ForceGuard {
    fn drop(&mut self) {
        FORCING.with(|forcing| forcing.borrow_mut().retain(|id| *id != self.0));
    }
}
