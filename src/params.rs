//! Parameter descriptor tables.
//!
//! Every provider describes its parameters explicitly: name, declared type
//! and default. The [`Analyzer`](crate::analyzer::Analyzer) turns each
//! descriptor into an injection decision; the resolver then assembles an
//! [`Arguments`] value from those decisions and hands it to the provider.
//!
//! ```rust
//! use ferrous_ioc::{Arguments, Injectable, ParamDescriptor, ProviderError};
//! use std::sync::Arc;
//!
//! struct Database;
//! impl Injectable for Database {
//!     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
//!         Ok(Database)
//!     }
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//!     page_size: u32,
//! }
//!
//! impl Injectable for UserService {
//!     fn parameters() -> Vec<ParamDescriptor> {
//!         vec![
//!             ParamDescriptor::inject::<Database>("db"),
//!             ParamDescriptor::builtin::<u32>("page_size").with_default(50u32),
//!         ]
//!     }
//!
//!     fn construct(args: &Arguments) -> Result<Self, ProviderError> {
//!         Ok(UserService {
//!             db: args.get::<Database>("db")?,
//!             page_size: args.value::<u32>("page_size")?,
//!         })
//!     }
//! }
//! ```

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::{Arc, Weak};

use crate::arguments::Arguments;
use crate::error::ProviderError;
use crate::internal::BoxFuture;
use crate::key::{key_of_trait, key_of_type, Key};
use crate::lazy::Lazy;
use crate::provider::ContainerInner;
use crate::registration::AnyArc;
use crate::traits::{AsyncInjectable, Injectable};

/// Default value declared for a parameter.
#[derive(Clone)]
pub enum DefaultValue {
    /// The absent value (`None`)
    Nil,
    /// A concrete value, stored as `Arc<T>`
    Value(AnyArc),
}

impl DefaultValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, DefaultValue::Nil)
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Nil => f.write_str("Nil"),
            DefaultValue::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// How a provider builds itself when no registration exists for it.
///
/// Only holds function pointers, so a recipe can reference types whose own
/// recipes reference it back without recursing at declaration time.
#[derive(Clone, Copy)]
pub struct AutoCreate {
    pub(crate) concrete: Key,
    pub(crate) provider_id: TypeId,
    pub(crate) params: fn() -> Vec<ParamDescriptor>,
    pub(crate) construct: AutoConstruct,
}

#[derive(Clone, Copy)]
pub(crate) enum AutoConstruct {
    Sync(fn(&Arguments) -> Result<AnyArc, ProviderError>),
    Async(fn(Arguments) -> BoxFuture<'static, Result<AnyArc, ProviderError>>),
}

fn construct_sync<T: Injectable>(args: &Arguments) -> Result<AnyArc, ProviderError> {
    T::construct(args).map(|value| Arc::new(value) as AnyArc)
}

fn construct_async<T: AsyncInjectable>(
    args: Arguments,
) -> BoxFuture<'static, Result<AnyArc, ProviderError>> {
    Box::pin(async move { T::construct(args).await.map(|value| Arc::new(value) as AnyArc) })
}

impl AutoCreate {
    /// Recipe for a synchronously constructible type.
    pub fn of<T: Injectable>() -> Self {
        AutoCreate {
            concrete: key_of_type::<T>(),
            provider_id: TypeId::of::<T>(),
            params: T::parameters,
            construct: AutoConstruct::Sync(construct_sync::<T>),
        }
    }

    /// Recipe for a type whose constructor suspends.
    pub fn of_async<T: AsyncInjectable>() -> Self {
        AutoCreate {
            concrete: key_of_type::<T>(),
            provider_id: TypeId::of::<T>(),
            params: T::parameters,
            construct: AutoConstruct::Async(construct_async::<T>),
        }
    }

    pub fn concrete(&self) -> Key {
        self.concrete
    }

    pub fn provider_id(&self) -> TypeId {
        self.provider_id
    }

    pub fn parameters(&self) -> Vec<ParamDescriptor> {
        (self.params)()
    }

    pub fn is_async(&self) -> bool {
        matches!(self.construct, AutoConstruct::Async(_))
    }
}

impl fmt::Debug for AutoCreate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoCreate")
            .field("concrete", &self.concrete)
            .field("async", &self.is_async())
            .finish()
    }
}

/// A reference to a resolvable service.
#[derive(Clone, Debug)]
pub struct ServiceRef {
    pub key: Key,
    pub auto: Option<AutoCreate>,
}

/// One argument of a parameterized type shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeArg {
    Exact(Key),
    /// Unconstrained argument, e.g. a blanket `impl<T> Repository<T>`
    Any,
}

/// Structural description of a parameterized type such as `Repository<User>`.
///
/// Rust has no runtime view of generic instantiations, so the origin name
/// and the argument keys are declared alongside the binding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeShape {
    pub origin: &'static str,
    pub args: Vec<TypeArg>,
}

impl TypeShape {
    pub fn new(origin: &'static str) -> Self {
        TypeShape { origin, args: Vec::new() }
    }

    pub fn arg<T: 'static>(mut self) -> Self {
        self.args.push(TypeArg::Exact(key_of_type::<T>()));
        self
    }

    pub fn any_arg(mut self) -> Self {
        self.args.push(TypeArg::Any);
        self
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.origin)?;
        if self.args.is_empty() {
            return Ok(());
        }
        f.write_str("<")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match arg {
                TypeArg::Exact(key) => write!(f, "{}", key)?,
                TypeArg::Any => f.write_str("_")?,
            }
        }
        f.write_str(">")
    }
}

/// A parameterized abstract type requested by a parameter.
#[derive(Clone, Debug)]
pub struct GenericType {
    /// Key the resolved value is stored under, usually a trait object key
    pub key: Key,
    pub shape: TypeShape,
}

impl GenericType {
    /// Parameterized trait object, e.g. `dyn Repository<User>`.
    pub fn of<T: ?Sized + 'static>(shape: TypeShape) -> Self {
        GenericType { key: key_of_trait::<T>(), shape }
    }
}

/// Deferred reference: the parameter receives a [`Lazy`] handle.
#[derive(Clone, Copy)]
pub struct LazyRef {
    pub key: Key,
    pub(crate) make: fn(Key, Weak<ContainerInner>) -> AnyArc,
}

impl fmt::Debug for LazyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRef").field("key", &self.key).finish()
    }
}

fn make_lazy<T: Send + Sync + 'static>(key: Key, owner: Weak<ContainerInner>) -> AnyArc {
    Arc::new(Lazy::<T>::concrete(key, owner))
}

fn make_lazy_trait<T: ?Sized + Send + Sync + 'static>(
    key: Key,
    owner: Weak<ContainerInner>,
) -> AnyArc {
    Arc::new(Lazy::<T>::trait_object(key, owner))
}

/// Declared type of a parameter.
#[derive(Clone, Debug)]
pub enum DeclaredType {
    Service(ServiceRef),
    /// May-be-absent wrapper around the inner type
    Optional(Box<DeclaredType>),
    /// Sum of several types
    Union(Vec<DeclaredType>),
    /// Primitive or standard-library value; never injected
    Builtin(&'static str),
    /// Raw collection such as `Vec<T>`; never injected
    Collection(&'static str),
    Generic(GenericType),
    Lazy(LazyRef),
}

impl DeclaredType {
    /// The service key this type would be resolved through, if any.
    pub fn service_key(&self) -> Option<Key> {
        match self {
            DeclaredType::Service(service) => Some(service.key),
            DeclaredType::Generic(generic) => Some(generic.key),
            DeclaredType::Lazy(lazy) => Some(lazy.key),
            _ => None,
        }
    }

    /// Auto-creation recipe for `key` declared anywhere in this type.
    pub(crate) fn auto_for(&self, key: &Key) -> Option<AutoCreate> {
        match self {
            DeclaredType::Service(service) if service.key == *key => service.auto,
            DeclaredType::Optional(inner) => inner.auto_for(key),
            DeclaredType::Union(members) => members.iter().find_map(|m| m.auto_for(key)),
            _ => None,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, DeclaredType::Builtin(_) | DeclaredType::Collection(_))
    }

    /// Human readable rendering used in errors and reports.
    pub fn describe(&self) -> String {
        match self {
            DeclaredType::Service(service) => service.key.to_string(),
            DeclaredType::Optional(inner) => format!("Option<{}>", inner.describe()),
            DeclaredType::Union(members) => {
                let names: Vec<String> = members.iter().map(DeclaredType::describe).collect();
                names.join(" | ")
            }
            DeclaredType::Builtin(name) | DeclaredType::Collection(name) => (*name).to_string(),
            DeclaredType::Generic(generic) => generic.shape.to_string(),
            DeclaredType::Lazy(lazy) => format!("Lazy<{}>", lazy.key),
        }
    }
}

/// One entry in a provider's parameter table.
#[derive(Clone, Debug)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub declared: DeclaredType,
    pub default: Option<DefaultValue>,
}

impl ParamDescriptor {
    pub fn new(name: &'static str, declared: DeclaredType) -> Self {
        ParamDescriptor { name, declared, default: None }
    }

    /// Required dependency on a constructible type; auto-created when unregistered.
    pub fn inject<T: Injectable>(name: &'static str) -> Self {
        Self::new(
            name,
            DeclaredType::Service(ServiceRef { key: key_of_type::<T>(), auto: Some(AutoCreate::of::<T>()) }),
        )
    }

    /// Like [`inject`](Self::inject) for types with a suspending constructor.
    pub fn inject_async<T: AsyncInjectable>(name: &'static str) -> Self {
        Self::new(
            name,
            DeclaredType::Service(ServiceRef {
                key: key_of_type::<T>(),
                auto: Some(AutoCreate::of_async::<T>()),
            }),
        )
    }

    /// Required dependency that must be registered.
    pub fn service<T: Send + Sync + 'static>(name: &'static str) -> Self {
        Self::new(name, DeclaredType::Service(ServiceRef { key: key_of_type::<T>(), auto: None }))
    }

    /// Required dependency on a trait object, e.g. `dyn Logger`.
    pub fn trait_object<T: ?Sized + Send + Sync + 'static>(name: &'static str) -> Self {
        Self::new(name, DeclaredType::Service(ServiceRef { key: key_of_trait::<T>(), auto: None }))
    }

    /// Required dependency registered under a string token.
    pub fn token(name: &'static str, token: &'static str) -> Self {
        Self::new(name, DeclaredType::Service(ServiceRef { key: Key::token(token), auto: None }))
    }

    pub fn optional<T: Send + Sync + 'static>(name: &'static str) -> Self {
        Self::new(
            name,
            DeclaredType::Optional(Box::new(DeclaredType::Service(ServiceRef {
                key: key_of_type::<T>(),
                auto: None,
            }))),
        )
    }

    pub fn optional_trait<T: ?Sized + Send + Sync + 'static>(name: &'static str) -> Self {
        Self::new(
            name,
            DeclaredType::Optional(Box::new(DeclaredType::Service(ServiceRef {
                key: key_of_trait::<T>(),
                auto: None,
            }))),
        )
    }

    /// Plain value such as a number or string, never injected.
    pub fn builtin<T: 'static>(name: &'static str) -> Self {
        Self::new(name, DeclaredType::Builtin(type_name::<T>()))
    }

    /// Raw collection, never injected.
    pub fn collection<T: 'static>(name: &'static str) -> Self {
        Self::new(name, DeclaredType::Collection(type_name::<T>()))
    }

    pub fn generic(name: &'static str, generic: GenericType) -> Self {
        Self::new(name, DeclaredType::Generic(generic))
    }

    /// Deferred dependency: receives `Lazy<T>` without resolving `T`.
    pub fn lazy<T: Send + Sync + 'static>(name: &'static str) -> Self {
        Self::new(name, DeclaredType::Lazy(LazyRef { key: key_of_type::<T>(), make: make_lazy::<T> }))
    }

    pub fn lazy_trait<T: ?Sized + Send + Sync + 'static>(name: &'static str) -> Self {
        Self::new(
            name,
            DeclaredType::Lazy(LazyRef { key: key_of_trait::<T>(), make: make_lazy_trait::<T> }),
        )
    }

    pub fn union(name: &'static str, members: Vec<DeclaredType>) -> Self {
        Self::new(name, DeclaredType::Union(members))
    }

    /// Resolves a named registration instead of the default one.
    pub fn qualified(mut self, registration_name: &'static str) -> Self {
        fn rename(declared: &mut DeclaredType, name: &'static str) {
            match declared {
                DeclaredType::Service(service) => service.key = service.key.named(name),
                DeclaredType::Optional(inner) => rename(inner, name),
                DeclaredType::Lazy(lazy) => lazy.key = lazy.key.named(name),
                _ => {}
            }
        }
        rename(&mut self.declared, registration_name);
        self
    }

    pub fn with_default<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.default = Some(DefaultValue::Value(Arc::new(value)));
        self
    }

    /// Declares `None` as the default.
    pub fn with_nil_default(mut self) -> Self {
        self.default = Some(DefaultValue::Nil);
        self
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn has_nil_default(&self) -> bool {
        matches!(self.default, Some(DefaultValue::Nil))
    }

    pub fn has_value_default(&self) -> bool {
        matches!(self.default, Some(DefaultValue::Value(_)))
    }
}
