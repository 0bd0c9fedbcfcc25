//! Generic binder: parameterized abstract types to concrete implementations.
//!
//! A binding says "`dyn Repository<User>` is served by `UserRepository`,
//! which implements `Repository<User>`". Several bindings may target the
//! same abstract key; they are scored against the requested shape:
//!
//! | match | score |
//! |---|---|
//! | argument equal to the requested one | +10 per argument |
//! | wildcard argument on either side | +5 per argument |
//! | binding declares the origin without arguments | +2 |
//! | concrete type is registered | +3 |
//!
//! The strictly best candidate wins. A tie is an error under
//! [`AmbiguityPolicy::Error`] and resolves to the first registered binding
//! under [`AmbiguityPolicy::FirstRegistered`].

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::{DiError, DiResult};
use crate::key::{key_of_trait, key_of_type, Key};
use crate::params::{AutoCreate, TypeArg, TypeShape};
use crate::registration::{downcast_concrete, AnyArc, Registry};
use crate::traits::Injectable;

/// What to do when several bindings score equally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum AmbiguityPolicy {
    /// Fail with a resolution error
    #[default]
    Error,
    /// Use the binding registered first
    FirstRegistered,
}

type Cast = Arc<dyn Fn(AnyArc) -> DiResult<AnyArc> + Send + Sync>;

/// One concrete implementation of a parameterized abstract type.
#[derive(Clone)]
pub struct GenericBinding {
    pub(crate) generic: Key,
    pub(crate) implements: TypeShape,
    pub(crate) concrete: Key,
    pub(crate) auto: Option<AutoCreate>,
    pub(crate) cast: Cast,
}

impl GenericBinding {
    /// Binding served by a constructible type, auto-created when unregistered.
    pub fn injectable<G, C, F>(implements: TypeShape, cast: F) -> Self
    where
        G: ?Sized + Send + Sync + 'static,
        C: Injectable,
        F: Fn(Arc<C>) -> Arc<G> + Send + Sync + 'static,
    {
        GenericBinding { auto: Some(AutoCreate::of::<C>()), ..Self::registered::<G, C, F>(implements, cast) }
    }

    /// Binding served by whatever is registered for `C`.
    pub fn registered<G, C, F>(implements: TypeShape, cast: F) -> Self
    where
        G: ?Sized + Send + Sync + 'static,
        C: Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<G> + Send + Sync + 'static,
    {
        let concrete = key_of_type::<C>();
        GenericBinding {
            generic: key_of_trait::<G>(),
            implements,
            concrete,
            auto: None,
            cast: Arc::new(move |value: AnyArc| {
                let concrete_value = downcast_concrete::<C>(concrete, value)?;
                Ok(Arc::new(cast(concrete_value)) as AnyArc)
            }),
        }
    }

    pub fn generic(&self) -> Key {
        self.generic
    }

    pub fn concrete(&self) -> Key {
        self.concrete
    }

    pub fn implements(&self) -> &TypeShape {
        &self.implements
    }

    pub(crate) fn auto(&self) -> Option<AutoCreate> {
        self.auto
    }

    /// Converts the resolved concrete instance into the abstract one.
    pub(crate) fn apply(&self, value: AnyArc) -> DiResult<AnyArc> {
        (self.cast)(value)
    }

    fn score(&self, requested: &TypeShape, registry: &Registry) -> u32 {
        let mut score = 0;
        if self.implements.origin == requested.origin {
            if self.implements.args.is_empty() {
                score += 2;
            } else {
                for (want, have) in requested.args.iter().zip(&self.implements.args) {
                    score += match (want, have) {
                        (TypeArg::Exact(a), TypeArg::Exact(b)) if a == b => 10,
                        (TypeArg::Any, _) | (_, TypeArg::Any) => 5,
                        _ => 0,
                    };
                }
            }
        }
        if registry.has(&self.concrete) {
            score += 3;
        }
        score
    }
}

impl fmt::Debug for GenericBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericBinding")
            .field("generic", &self.generic)
            .field("implements", &self.implements.to_string())
            .field("concrete", &self.concrete)
            .finish()
    }
}

#[derive(Clone)]
enum Selection {
    Chosen(usize),
    Unbound,
    Ambiguous(Vec<Key>),
}

/// Selections are cached per abstract key and requested shape.
type SelectionKey = (Key, Option<TypeShape>);

/// Registry of generic bindings with cached selections.
#[derive(Default)]
pub struct GenericBinder {
    bindings: AHashMap<Key, Vec<GenericBinding>>,
    policy: AmbiguityPolicy,
    selections: RwLock<AHashMap<SelectionKey, Selection>>,
}

impl GenericBinder {
    pub fn new(policy: AmbiguityPolicy) -> Self {
        GenericBinder { policy, ..Default::default() }
    }

    pub fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    pub(crate) fn set_policy(&mut self, policy: AmbiguityPolicy) {
        self.policy = policy;
        self.clear_cache();
    }

    /// Adds a binding. Bindings for the same abstract key keep registration order.
    pub fn register_binding(&mut self, binding: GenericBinding) {
        tracing::debug!(generic = %binding.generic, concrete = %binding.concrete, "generic binding registered");
        self.bindings.entry(binding.generic).or_default().push(binding);
        self.clear_cache();
    }

    /// Drops the most recent binding for `key`.
    pub(crate) fn pop_binding(&mut self, key: &Key) -> Option<GenericBinding> {
        let bindings = self.bindings.get_mut(key)?;
        let popped = bindings.pop();
        if bindings.is_empty() {
            self.bindings.remove(key);
        }
        self.clear_cache();
        popped
    }

    pub fn has_binding(&self, key: &Key) -> bool {
        self.bindings.get(key).map_or(false, |b| !b.is_empty())
    }

    pub fn bindings_for(&self, key: &Key) -> &[GenericBinding] {
        self.bindings.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Selects the binding serving `key`.
    ///
    /// `Ok(None)` when nothing is bound. Without a requested shape each
    /// candidate is scored against its own declaration, which favours the
    /// most specific one.
    pub fn resolve_binding(
        &self,
        key: &Key,
        shape: Option<&TypeShape>,
        registry: &Registry,
    ) -> DiResult<Option<GenericBinding>> {
        let Some(candidates) = self.bindings.get(key) else {
            return Ok(None);
        };
        let cache_key = (*key, shape.cloned());
        let cached = self.selections.read().get(&cache_key).cloned();
        let selection = match cached {
            Some(selection) => selection,
            None => {
                let selection = self.select(candidates, shape, registry);
                self.selections.write().insert(cache_key, selection.clone());
                selection
            }
        };
        match selection {
            Selection::Chosen(index) => Ok(candidates.get(index).cloned()),
            Selection::Unbound => Ok(None),
            Selection::Ambiguous(tied) => Err(DiError::resolution(
                *key,
                format!(
                    "ambiguous generic binding for {}: {} match equally",
                    key,
                    tied.iter().map(Key::to_string).collect::<Vec<_>>().join(", ")
                ),
            )),
        }
    }

    fn select(&self, candidates: &[GenericBinding], shape: Option<&TypeShape>, registry: &Registry) -> Selection {
        let scored: Vec<(usize, u32)> = candidates
            .iter()
            .enumerate()
            .map(|(i, b)| (i, b.score(shape.unwrap_or(&b.implements), registry)))
            .filter(|(_, score)| *score > 0)
            .collect();
        let Some(best) = scored.iter().map(|(_, s)| *s).max() else {
            return Selection::Unbound;
        };
        let top: Vec<usize> = scored.iter().filter(|(_, s)| *s == best).map(|(i, _)| *i).collect();
        match (top.as_slice(), self.policy) {
            ([only], _) => Selection::Chosen(*only),
            ([first, ..], AmbiguityPolicy::FirstRegistered) => Selection::Chosen(*first),
            (tied, _) => Selection::Ambiguous(tied.iter().map(|i| candidates[*i].concrete).collect()),
        }
    }

    /// Forgets cached selections.
    pub fn clear_cache(&self) {
        self.selections.write().clear();
    }

    pub fn len(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for GenericBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericBinder")
            .field("bindings", &self.len())
            .field("policy", &self.policy)
            .finish()
    }
}
