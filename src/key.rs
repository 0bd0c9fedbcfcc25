//! Service key types for the resolution engine.

use std::any::TypeId;
use std::fmt;

/// Identity of a registered service.
///
/// A key is a type-identity (concrete type, trait object or string token)
/// optionally qualified by a registration name. The pair `(identity, name)`
/// is what the registry treats as unique.
///
/// # Key Types
///
/// - **Type**: concrete types (structs, enums, primitives)
/// - **Trait**: trait objects such as `dyn Logger`
/// - **Token**: free-form string keys, for values with no dedicated type
/// - **Named variants**: all of the above with an extra registration name
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Key, key_of_type, key_of_trait};
///
/// trait Logger: Send + Sync {}
///
/// let plain = key_of_type::<u32>();
/// let named = plain.named("port");
///
/// assert_ne!(plain, named);
/// assert_eq!(named.service_name(), Some("port"));
/// assert_eq!(named.unnamed(), plain);
/// assert_eq!(named.to_string(), "u32:port");
///
/// let logger = key_of_trait::<dyn Logger>();
/// assert!(logger.is_trait());
///
/// let token = Key::token("database_url");
/// assert_eq!(token.to_string(), "database_url");
/// ```
#[derive(Debug, Clone, Copy)]
pub enum Key {
    /// Concrete type key with TypeId and name for diagnostics
    Type(TypeId, &'static str),
    /// Trait object key, e.g. `dyn Logger`
    Trait(TypeId, &'static str),
    /// String token key
    Token(&'static str),
    /// Named concrete type key: TypeId, type name, registration name
    TypeNamed(TypeId, &'static str, &'static str),
    /// Named trait object key: TypeId, trait name, registration name
    TraitNamed(TypeId, &'static str, &'static str),
    /// Named token key: token, registration name
    TokenNamed(&'static str, &'static str),
}

impl Key {
    /// Builds an unnamed string token key.
    pub const fn token(token: &'static str) -> Self {
        Key::Token(token)
    }

    /// Get the type, trait or token name for display.
    pub fn display_name(&self) -> &'static str {
        match self {
            Key::Type(_, name) => name,
            Key::Trait(_, name) => name,
            Key::Token(name) => name,
            Key::TypeNamed(_, name, _) => name,
            Key::TraitNamed(_, name, _) => name,
            Key::TokenNamed(name, _) => name,
        }
    }

    /// Get the registration name for named keys, or `None`.
    pub fn service_name(&self) -> Option<&'static str> {
        match self {
            Key::Type(..) | Key::Trait(..) | Key::Token(_) => None,
            Key::TypeNamed(_, _, name) => Some(name),
            Key::TraitNamed(_, _, name) => Some(name),
            Key::TokenNamed(_, name) => Some(name),
        }
    }

    /// Returns the same identity qualified by `name`.
    ///
    /// Naming an already named key replaces the name.
    pub fn named(&self, name: &'static str) -> Key {
        match *self {
            Key::Type(id, ty) | Key::TypeNamed(id, ty, _) => Key::TypeNamed(id, ty, name),
            Key::Trait(id, ty) | Key::TraitNamed(id, ty, _) => Key::TraitNamed(id, ty, name),
            Key::Token(tok) | Key::TokenNamed(tok, _) => Key::TokenNamed(tok, name),
        }
    }

    /// Applies an optional name, see [`named`](Self::named).
    pub fn with_name(&self, name: Option<&'static str>) -> Key {
        match name {
            Some(name) => self.named(name),
            None => *self,
        }
    }

    /// Strips the registration name, if any.
    pub fn unnamed(&self) -> Key {
        match *self {
            Key::TypeNamed(id, ty, _) => Key::Type(id, ty),
            Key::TraitNamed(id, ty, _) => Key::Trait(id, ty),
            Key::TokenNamed(tok, _) => Key::Token(tok),
            other => other,
        }
    }

    /// The `TypeId` behind type and trait keys. Tokens have none.
    pub fn type_identity(&self) -> Option<TypeId> {
        match self {
            Key::Type(id, _) | Key::TypeNamed(id, _, _) => Some(*id),
            Key::Trait(id, _) | Key::TraitNamed(id, _, _) => Some(*id),
            Key::Token(_) | Key::TokenNamed(..) => None,
        }
    }

    /// True for trait object keys (named or not).
    pub fn is_trait(&self) -> bool {
        matches!(self, Key::Trait(..) | Key::TraitNamed(..))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.service_name() {
            Some(name) => write!(f, "{}:{}", self.display_name(), name),
            None => f.write_str(self.display_name()),
        }
    }
}

// Type and trait keys compare by TypeId only; the name is diagnostic.
impl PartialEq for Key {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Type(a, _), Key::Type(b, _)) => a == b,
            (Key::Trait(a, _), Key::Trait(b, _)) => a == b,
            (Key::Token(a), Key::Token(b)) => a == b,
            (Key::TypeNamed(a, _, na), Key::TypeNamed(b, _, nb)) => a == b && na == nb,
            (Key::TraitNamed(a, _, na), Key::TraitNamed(b, _, nb)) => a == b && na == nb,
            (Key::TokenNamed(a, na), Key::TokenNamed(b, nb)) => a == b && na == nb,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl std::hash::Hash for Key {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Key::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            Key::Trait(id, _) => {
                1u8.hash(state);
                id.hash(state);
            }
            Key::Token(tok) => {
                2u8.hash(state);
                tok.hash(state);
            }
            Key::TypeNamed(id, _, name) => {
                3u8.hash(state);
                id.hash(state);
                name.hash(state);
            }
            Key::TraitNamed(id, _, name) => {
                4u8.hash(state);
                id.hash(state);
                name.hash(state);
            }
            Key::TokenNamed(tok, name) => {
                5u8.hash(state);
                tok.hash(state);
                name.hash(state);
            }
        }
    }
}

/// Key of a concrete type.
#[inline(always)]
pub fn key_of_type<T: 'static>() -> Key {
    Key::Type(TypeId::of::<T>(), std::any::type_name::<T>())
}

/// Key of a trait object type such as `dyn Logger`.
#[inline(always)]
pub fn key_of_trait<T: ?Sized + 'static>() -> Key {
    Key::Trait(TypeId::of::<T>(), std::any::type_name::<T>())
}
