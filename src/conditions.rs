//! Registration conditions.
//!
//! A descriptor may carry a [`Condition`]. The registry treats a descriptor
//! whose condition evaluates false as unavailable: `get` fails, `find_*`
//! omits it and resolution reports [`ErrorKind::ConditionFailed`](crate::ErrorKind).
//! Conditions are evaluated on every lookup, so they may observe state that
//! changes after registration.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Predicate deciding whether a registration is currently available.
///
/// A condition that panics evaluates to false.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::conditions::{Condition, all_of, not};
///
/// let yes = Condition::from(true);
/// let no = not(yes.clone());
///
/// assert!(yes.evaluate());
/// assert!(!no.evaluate());
/// assert!(!all_of([yes, no]).evaluate());
/// ```
#[derive(Clone)]
pub struct Condition(Arc<dyn Fn() -> bool + Send + Sync>);

impl Condition {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Condition(Arc::new(predicate))
    }

    pub fn always() -> Self {
        Condition::new(|| true)
    }

    pub fn never() -> Self {
        Condition::new(|| false)
    }

    pub fn evaluate(&self) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.0)())).unwrap_or(false)
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Condition::new(move || value)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition(..)")
    }
}

/// True when `var` is set to exactly `expected`.
pub fn env_equals(var: impl Into<String>, expected: impl Into<String>) -> Condition {
    let var = var.into();
    let expected = expected.into();
    Condition::new(move || std::env::var(&var).map(|v| v == expected).unwrap_or(false))
}

/// True when `var` is set, whatever its value.
pub fn env_exists(var: impl Into<String>) -> Condition {
    let var = var.into();
    Condition::new(move || std::env::var_os(&var).is_some())
}

/// True when `var` is one of `true`, `1`, `yes`, `on` (case-insensitive).
pub fn env_truthy(var: impl Into<String>) -> Condition {
    let var = var.into();
    Condition::new(move || {
        std::env::var(&var)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
            .unwrap_or(false)
    })
}

/// True when every condition holds. Empty input is true.
pub fn all_of(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    let conditions: Vec<Condition> = conditions.into_iter().collect();
    Condition::new(move || conditions.iter().all(Condition::evaluate))
}

/// True when at least one condition holds. Empty input is false.
pub fn any_of(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    let conditions: Vec<Condition> = conditions.into_iter().collect();
    Condition::new(move || conditions.iter().any(Condition::evaluate))
}

/// Negates a condition. A panicking inner condition counts as false, so `not` of it is true.
pub fn not(condition: Condition) -> Condition {
    Condition::new(move || !condition.evaluate())
}
