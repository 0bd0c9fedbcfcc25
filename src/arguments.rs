//! Assembled provider arguments, caller overrides and resolution requests.

use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::{key_of_trait, key_of_type, Key};
use crate::lazy::Lazy;
use crate::params::{AutoCreate, TypeShape};
use crate::registration::AnyArc;
use crate::traits::{AsyncInjectable, Injectable};

/// Values supplied by the caller for named parameters of the top-level provider.
///
/// An override wins over the analyzer's decision for that parameter,
/// whatever the decision was.
///
/// ```rust
/// use ferrous_ioc::Overrides;
///
/// let overrides = Overrides::new().with("port", 8080u16).with("host", "localhost".to_string());
/// assert!(overrides.contains("port"));
/// assert_eq!(overrides.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct Overrides {
    values: Vec<(&'static str, AnyArc)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides `name` with an owned value.
    pub fn with<T: Send + Sync + 'static>(self, name: &'static str, value: T) -> Self {
        self.with_arc(name, Arc::new(value))
    }

    pub fn with_arc<T: Send + Sync + 'static>(mut self, name: &'static str, value: Arc<T>) -> Self {
        self.set(name, value as AnyArc);
        self
    }

    /// Overrides a trait-object parameter.
    pub fn with_trait<T: ?Sized + Send + Sync + 'static>(
        mut self,
        name: &'static str,
        value: Arc<T>,
    ) -> Self {
        self.set(name, Arc::new(value) as AnyArc);
        self
    }

    fn set(&mut self, name: &'static str, value: AnyArc) {
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AnyArc> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Overrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Value assembled for one parameter.
#[derive(Clone)]
pub(crate) enum ArgValue {
    Value(AnyArc),
    /// Optional dependency not available, or a `None` default
    Absent,
    /// Skipped parameter with neither override nor default
    Missing,
}

/// Arguments handed to a provider, in parameter-table order.
///
/// Typed accessors fail with a [`DiError`] naming the provider and the
/// parameter, which converts into a provider error with `?`.
#[derive(Clone)]
pub struct Arguments {
    provider: Key,
    values: Vec<(&'static str, ArgValue)>,
}

impl Arguments {
    pub(crate) fn new(provider: Key) -> Self {
        Arguments { provider, values: Vec::new() }
    }

    /// Empty argument list, for invoking providers by hand.
    pub fn empty(provider: Key) -> Self {
        Self::new(provider)
    }

    pub(crate) fn push(&mut self, name: &'static str, value: ArgValue) {
        self.values.push((name, value));
    }

    /// Key of the provider these arguments were assembled for.
    pub fn provider(&self) -> Key {
        self.provider
    }

    fn lookup(&self, name: &str) -> DiResult<&ArgValue> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| self.error(format!("no parameter named '{}'", name)))
    }

    fn error(&self, message: String) -> DiError {
        DiError::resolution(self.provider, format!("{}: {}", self.provider, message))
    }

    fn present(&self, name: &str) -> DiResult<Option<&AnyArc>> {
        match self.lookup(name)? {
            ArgValue::Value(v) => Ok(Some(v)),
            ArgValue::Absent => Ok(None),
            ArgValue::Missing => Err(self.error(format!(
                "parameter '{}' was not injected and has no default or override",
                name
            ))),
        }
    }

    fn cast<T: Send + Sync + 'static>(&self, value: &AnyArc) -> DiResult<Arc<T>> {
        value
            .clone()
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch(std::any::type_name::<T>()).resolving(self.provider))
    }

    fn cast_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        value: &AnyArc,
    ) -> DiResult<Arc<T>> {
        value
            .clone()
            .downcast::<Arc<T>>()
            .map(|outer| (*outer).clone())
            .map_err(|_| DiError::type_mismatch(std::any::type_name::<T>()).resolving(self.provider))
    }

    /// Required value of parameter `name`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        match self.present(name)? {
            Some(value) => self.cast(value),
            None => Err(self.error(format!("parameter '{}' is absent", name))),
        }
    }

    pub fn get_trait<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        match self.present(name)? {
            Some(value) => self.cast_trait(value),
            None => Err(self.error(format!("parameter '{}' is absent", name))),
        }
    }

    /// Value of an optional parameter; `None` when the dependency is absent.
    pub fn optional<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Option<Arc<T>>> {
        match self.lookup(name)? {
            ArgValue::Value(value) => self.cast(value).map(Some),
            ArgValue::Absent | ArgValue::Missing => Ok(None),
        }
    }

    pub fn optional_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> DiResult<Option<Arc<T>>> {
        match self.lookup(name)? {
            ArgValue::Value(value) => self.cast_trait(value).map(Some),
            ArgValue::Absent | ArgValue::Missing => Ok(None),
        }
    }

    /// Owned copy of a plain value such as a number or string.
    pub fn value<T: Clone + Send + Sync + 'static>(&self, name: &str) -> DiResult<T> {
        self.get::<T>(name).map(|v| (*v).clone())
    }

    /// Like [`value`](Self::value), falling back when nothing was supplied.
    pub fn value_or<T: Clone + Send + Sync + 'static>(&self, name: &str, fallback: T) -> DiResult<T> {
        match self.lookup(name)? {
            ArgValue::Value(value) => self.cast::<T>(value).map(|v| (*v).clone()),
            ArgValue::Absent | ArgValue::Missing => Ok(fallback),
        }
    }

    /// Deferred handle injected for a lazy parameter.
    pub fn lazy<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<Lazy<T>>> {
        self.get::<Lazy<T>>(name)
    }

    pub fn lazy_trait<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> DiResult<Arc<Lazy<T>>> {
        self.get::<Lazy<T>>(name)
    }

    /// True when `name` holds a value (not absent, not missing).
    pub fn contains(&self, name: &str) -> bool {
        matches!(self.lookup(name), Ok(ArgValue::Value(_)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.values {
            let state = match value {
                ArgValue::Value(_) => "value",
                ArgValue::Absent => "absent",
                ArgValue::Missing => "missing",
            };
            map.entry(name, &state);
        }
        map.finish()
    }
}

/// What to resolve: a key, how to build it when unregistered, and overrides.
///
/// ```rust
/// use ferrous_ioc::{Request, Key};
///
/// let request = Request::token("database_url").named("primary").with("timeout", 30u64);
/// assert_eq!(request.key().to_string(), "database_url:primary");
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) key: Key,
    pub(crate) auto: Option<AutoCreate>,
    pub(crate) shape: Option<TypeShape>,
    pub(crate) overrides: Overrides,
}

impl Request {
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self::from(key_of_type::<T>())
    }

    pub fn trait_object<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self::from(key_of_trait::<T>())
    }

    pub fn token(token: &'static str) -> Self {
        Self::from(Key::token(token))
    }

    /// Request that falls back to constructing `T` when it is unregistered.
    pub fn injectable<T: Injectable>() -> Self {
        Request { auto: Some(AutoCreate::of::<T>()), ..Self::of::<T>() }
    }

    pub fn injectable_async<T: AsyncInjectable>() -> Self {
        Request { auto: Some(AutoCreate::of_async::<T>()), ..Self::of::<T>() }
    }

    /// Request for a parameterized abstract type, resolved through generic bindings.
    pub fn generic(generic: crate::params::GenericType) -> Self {
        Request { shape: Some(generic.shape), ..Self::from(generic.key) }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.key = self.key.named(name);
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with<T: Send + Sync + 'static>(mut self, name: &'static str, value: T) -> Self {
        self.overrides = self.overrides.with(name, value);
        self
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }
}

impl From<Key> for Request {
    fn from(key: Key) -> Self {
        Request { key, auto: None, shape: None, overrides: Overrides::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Provider;
    trait Greeter: Send + Sync {
        fn hello(&self) -> &'static str;
    }
    struct English;
    impl Greeter for English {
        fn hello(&self) -> &'static str {
            "hello"
        }
    }

    fn args() -> Arguments {
        let mut args = Arguments::new(key_of_type::<Provider>());
        args.push("port", ArgValue::Value(Arc::new(8080u16)));
        args.push("cache", ArgValue::Absent);
        args.push("host", ArgValue::Missing);
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        args.push("greeter", ArgValue::Value(Arc::new(greeter)));
        args
    }

    #[test]
    fn typed_access() {
        let args = args();
        assert_eq!(args.value::<u16>("port").unwrap(), 8080);
        assert_eq!(args.get_trait::<dyn Greeter>("greeter").unwrap().hello(), "hello");
        assert!(args.optional::<String>("cache").unwrap().is_none());
        assert_eq!(args.value_or("host", "localhost".to_string()).unwrap(), "localhost");
    }

    #[test]
    fn missing_and_mismatched_values_fail() {
        let args = args();
        assert!(args.get::<String>("host").unwrap_err().is_resolution_error());
        assert!(matches!(
            args.get::<u32>("port").unwrap_err().kind(),
            crate::ErrorKind::TypeMismatch { .. }
        ));
        assert!(args.get::<u16>("nope").is_err());
        assert!(!args.contains("cache"));
    }

    #[test]
    fn later_override_replaces_earlier() {
        let overrides = Overrides::new().with("n", 1u8).with("n", 2u8);
        assert_eq!(overrides.len(), 1);
        let n = overrides.get("n").unwrap().clone().downcast::<u8>().unwrap();
        assert_eq!(*n, 2);
    }
}
