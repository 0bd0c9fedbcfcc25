//! Error types for the resolution engine.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::key::Key;

/// Error raised by a provider, constructor or lifecycle hook.
pub type ProviderError = Box<dyn StdError + Send + Sync>;

/// What went wrong.
///
/// The variants form a flat taxonomy. `NotFound`, `ConditionFailed`,
/// `Resolution`, `Circular`, `TypeMismatch` and `DepthExceeded` are all
/// resolution failures (see [`DiError::is_resolution_error`]); `Circular`
/// is the cycle-specific refinement of them.
#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// Duplicate key+name, or a provider that cannot be registered
    Registration {
        key: Option<Key>,
        message: String,
    },
    /// No descriptor for the key and it cannot be auto-created
    NotFound { key: Key },
    /// Descriptor exists but its condition evaluated false
    ConditionFailed { key: Key },
    /// Provider or hook failed, or the request cannot be served
    Resolution {
        key: Key,
        message: String,
        cause: Option<Arc<dyn StdError + Send + Sync>>,
    },
    /// Dependency cycle, starting and ending at the same key
    Circular { cycle: Vec<Key> },
    /// A parameter's declared type cannot be injected
    Injection {
        parameter: String,
        declared_type: String,
    },
    /// Scope not active, unbalanced enter/exit, unknown scope
    Scope { message: String },
    /// Invalid scope name, lifetime hierarchy violation, invalid builder use
    Configuration { message: String },
    /// Stored value is not of the requested type
    TypeMismatch { expected: &'static str },
    /// Maximum resolution depth exceeded
    DepthExceeded { depth: usize },
}

/// Resolution engine error.
///
/// Carries an [`ErrorKind`] and the trail of keys being resolved when the
/// failure surfaced, innermost first. Each frame a failure crosses appends
/// its key; the kind itself is never re-wrapped.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{DiError, ErrorKind, key_of_type};
///
/// struct Database;
/// struct UserService;
///
/// let err = DiError::not_found(key_of_type::<Database>())
///     .resolving(key_of_type::<UserService>());
///
/// assert!(err.is_resolution_error());
/// assert!(matches!(err.kind(), ErrorKind::NotFound { .. }));
/// assert_eq!(err.trail(), &[key_of_type::<UserService>()]);
/// assert!(err.to_string().contains("caused resolving"));
/// ```
#[derive(Debug, Clone)]
pub struct DiError {
    kind: ErrorKind,
    trail: Vec<Key>,
}

impl DiError {
    /// Wraps a kind with an empty trail.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, trail: Vec::new() }
    }

    pub fn registration(key: Option<Key>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Registration { key, message: message.into() })
    }

    pub fn not_found(key: Key) -> Self {
        Self::new(ErrorKind::NotFound { key })
    }

    pub fn condition_failed(key: Key) -> Self {
        Self::new(ErrorKind::ConditionFailed { key })
    }

    pub fn resolution(key: Key, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution { key, message: message.into(), cause: None })
    }

    /// Provider failure, keeping the original error as [`source`](StdError::source).
    pub fn provider_failed(key: Key, cause: ProviderError) -> Self {
        Self::new(ErrorKind::Resolution {
            key,
            message: format!("provider for {} failed: {}", key, cause),
            cause: Some(Arc::from(cause)),
        })
    }

    pub fn circular(cycle: Vec<Key>) -> Self {
        Self::new(ErrorKind::Circular { cycle })
    }

    pub fn injection(parameter: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self::new(ErrorKind::Injection {
            parameter: parameter.into(),
            declared_type: declared_type.into(),
        })
    }

    pub fn scope(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scope { message: message.into() })
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration { message: message.into() })
    }

    pub fn type_mismatch(expected: &'static str) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected })
    }

    pub fn depth_exceeded(depth: usize) -> Self {
        Self::new(ErrorKind::DepthExceeded { depth })
    }

    /// Records that this failure happened while resolving `key`.
    pub fn resolving(mut self, key: Key) -> Self {
        if self.trail.last() != Some(&key) {
            self.trail.push(key);
        }
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Keys being resolved when the failure surfaced, innermost first.
    pub fn trail(&self) -> &[Key] {
        &self.trail
    }

    /// The dependency cycle, for circular dependency errors.
    pub fn cycle(&self) -> Option<&[Key]> {
        match &self.kind {
            ErrorKind::Circular { cycle } => Some(cycle),
            _ => None,
        }
    }

    /// True for every failure of the resolution family, cycles included.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NotFound { .. }
                | ErrorKind::ConditionFailed { .. }
                | ErrorKind::Resolution { .. }
                | ErrorKind::Circular { .. }
                | ErrorKind::TypeMismatch { .. }
                | ErrorKind::DepthExceeded { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound { .. })
    }

    pub fn is_circular(&self) -> bool {
        matches!(self.kind, ErrorKind::Circular { .. })
    }

    pub fn is_scope_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Scope { .. })
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Configuration { .. })
    }

    pub fn is_registration_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Registration { .. })
    }

    pub fn is_injection_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Injection { .. })
    }
}

impl From<ErrorKind> for DiError {
    fn from(kind: ErrorKind) -> Self {
        DiError::new(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Registration { key: Some(key), message } => {
                write!(f, "Registration error for {}: {}", key, message)
            }
            ErrorKind::Registration { key: None, message } => {
                write!(f, "Registration error: {}", message)
            }
            ErrorKind::NotFound { key } => write!(f, "Service not found: {}", key),
            ErrorKind::ConditionFailed { key } => {
                write!(f, "Service not available: condition for {} is not met", key)
            }
            ErrorKind::Resolution { message, .. } => write!(f, "Resolution error: {}", message),
            ErrorKind::Circular { cycle } => {
                f.write_str("Circular dependency: ")?;
                for (i, key) in cycle.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" -> ")?;
                    }
                    write!(f, "{}", key)?;
                }
                Ok(())
            }
            ErrorKind::Injection { parameter, declared_type } => write!(
                f,
                "Cannot inject parameter '{}' of type {}",
                parameter, declared_type
            ),
            ErrorKind::Scope { message } => write!(f, "Scope error: {}", message),
            ErrorKind::Configuration { message } => write!(f, "Configuration error: {}", message),
            ErrorKind::TypeMismatch { expected } => write!(f, "Type mismatch for: {}", expected),
            ErrorKind::DepthExceeded { depth } => write!(f, "Max depth {} exceeded", depth),
        }
    }
}

impl fmt::Display for DiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for key in &self.trail {
            write!(f, "\n  caused resolving {}", key)?;
        }
        Ok(())
    }
}

impl StdError for DiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            ErrorKind::Resolution { cause: Some(cause), .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// Result type for resolution engine operations.
pub type DiResult<T> = Result<T, DiError>;
