//! Service lifetime definitions.

use std::fmt;
use std::sync::Arc;

/// Scope-hierarchy name used for singleton lifetimes.
pub const SINGLETON_SCOPE: &str = "singleton";
/// Scope-hierarchy name used for transient lifetimes.
pub const TRANSIENT_SCOPE: &str = "transient";
/// Scope name used by [`Lifetime::scoped_default`].
pub const DEFAULT_SCOPE: &str = "default";

/// Service lifetimes controlling instance caching.
///
/// - **Singleton**: one instance per container, created at most once
/// - **Scoped**: one instance per active frame of the named scope
/// - **Transient**: a new instance on every resolution, never cached
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::Lifetime;
///
/// let request = Lifetime::scoped("request");
/// assert_eq!(request.scope_name(), "request");
/// assert_eq!(Lifetime::Singleton.scope_name(), "singleton");
/// assert!(request.is_scoped());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Single instance per container, cached until cleared
    Singleton,
    /// Single instance per frame of the named scope
    Scoped(Arc<str>),
    /// New instance per resolution
    Transient,
}

impl Lifetime {
    /// Scoped lifetime bound to `scope`.
    pub fn scoped(scope: impl AsRef<str>) -> Self {
        Lifetime::Scoped(Arc::from(scope.as_ref()))
    }

    /// Scoped lifetime bound to the `"default"` scope.
    pub fn scoped_default() -> Self {
        Lifetime::scoped(DEFAULT_SCOPE)
    }

    /// Name of this lifetime inside the scope hierarchy.
    pub fn scope_name(&self) -> &str {
        match self {
            Lifetime::Singleton => SINGLETON_SCOPE,
            Lifetime::Scoped(name) => name,
            Lifetime::Transient => TRANSIENT_SCOPE,
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, Lifetime::Singleton)
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self, Lifetime::Scoped(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Lifetime::Transient)
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Lifetime::Transient
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Scoped(name) => write!(f, "scoped({})", name),
            other => f.write_str(other.scope_name()),
        }
    }
}
