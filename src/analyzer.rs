//! Per-parameter injection decisions.
//!
//! The analyzer looks at one [`ParamDescriptor`] at a time and decides
//! whether the resolver injects it, injects it if available, defers it,
//! leaves it to the provider's default, or refuses it. Rules, in order:
//!
//! 1. a parameter with a non-nil default is never injected
//! 2. builtins and raw collections are never injected
//! 3. `Option<T>` is injected if available, unless `T` is a builtin
//! 4. a union is injected only if exactly one member is registered;
//!    several registered members is an error unless the default is nil
//! 5. a service is injected; an unavailable one with a nil default that
//!    cannot be auto-created falls back to the default
//! 6. a generic type is injected when registered or bound, otherwise it
//!    falls back to a nil default if there is one
//! 7. lazy parameters are deferred
//!
//! Decisions are cached per `(provider, parameter)` in a bounded FIFO map.
//! The cache is not invalidated by registry changes; call
//! [`Analyzer::clear_cache`] after mutating registrations.

use std::any::TypeId;
use std::collections::{HashSet, VecDeque};
use std::fmt;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::generics::GenericBinder;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::params::{AutoCreate, DeclaredType, ParamDescriptor};
use crate::registration::Registry;

/// Default number of cached decisions.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default depth of [`Analyzer::dependency_tree`].
pub const DEFAULT_TREE_DEPTH: usize = 10;

/// Why a parameter is left to its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    HasDefault,
    Builtin,
    Collection,
    OptionalOfBuiltin,
    /// Unavailable and not constructible, with a nil default
    NilDefault,
    UnionWithoutRegisteredMember,
    /// Several registered union members, resolved to the nil default
    AmbiguousUnionWithDefault,
    Unsupported,
}

/// What the resolver does with one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectDecision {
    Inject(Key),
    /// Inject if available, otherwise the absent value
    OptionalInject(Key),
    /// Hand over a lazy handle without resolving
    Defer(Key),
    Skip(SkipReason),
    Error(String),
}

impl InjectDecision {
    pub fn key(&self) -> Option<Key> {
        match self {
            InjectDecision::Inject(k) | InjectDecision::OptionalInject(k) | InjectDecision::Defer(k) => Some(*k),
            _ => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, InjectDecision::Skip(_))
    }
}

impl fmt::Display for InjectDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectDecision::Inject(k) => write!(f, "inject {}", k),
            InjectDecision::OptionalInject(k) => write!(f, "inject {} if available", k),
            InjectDecision::Defer(k) => write!(f, "defer {}", k),
            InjectDecision::Skip(reason) => write!(f, "skip ({:?})", reason),
            InjectDecision::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Registry state the rules consult.
#[derive(Clone, Copy)]
pub struct AnalysisView<'a> {
    pub registry: &'a Registry,
    pub binder: &'a GenericBinder,
}

impl<'a> AnalysisView<'a> {
    pub fn new(registry: &'a Registry, binder: &'a GenericBinder) -> Self {
        Self { registry, binder }
    }

    fn available(&self, key: &Key) -> bool {
        self.registry.has(key) || self.binder.has_binding(key)
    }
}

/// Node of a static dependency tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub key: Key,
    /// `None` for unregistered (auto-created or missing) keys
    pub lifetime: Option<Lifetime>,
    pub optional: bool,
    /// The key already appears on the path from the root
    pub cycle: bool,
    /// Depth limit reached before children were examined
    pub truncated: bool,
    pub children: Vec<DependencyNode>,
}

impl DependencyNode {
    fn leaf(key: Key, lifetime: Option<Lifetime>, optional: bool) -> Self {
        DependencyNode { key, lifetime, optional, cycle: false, truncated: false, children: Vec::new() }
    }

    /// Number of nodes in this subtree, root included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(DependencyNode::size).sum::<usize>()
    }

    pub fn has_cycle(&self) -> bool {
        self.cycle || self.children.iter().any(DependencyNode::has_cycle)
    }
}

struct DecisionCache {
    map: AHashMap<(TypeId, &'static str), InjectDecision>,
    order: VecDeque<(TypeId, &'static str)>,
    capacity: usize,
}

impl DecisionCache {
    fn insert(&mut self, key: (TypeId, &'static str), decision: InjectDecision) {
        if self.capacity == 0 {
            return;
        }
        if self.map.insert(key, decision).is_none() {
            self.order.push_back(key);
            while self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
        }
    }
}

/// Injection decision engine with a bounded decision cache.
pub struct Analyzer {
    cache: Mutex<DecisionCache>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl Analyzer {
    pub fn new(capacity: usize) -> Self {
        Analyzer {
            cache: Mutex::new(DecisionCache {
                map: AHashMap::new(),
                order: VecDeque::new(),
                capacity,
            }),
        }
    }

    /// Cached decision for parameter `param` of provider `provider`.
    pub fn decide(&self, provider: TypeId, param: &ParamDescriptor, view: AnalysisView<'_>) -> InjectDecision {
        let cache_key = (provider, param.name);
        if let Some(hit) = self.cache.lock().map.get(&cache_key) {
            return hit.clone();
        }
        let decision = Self::classify(param, view);
        self.cache.lock().insert(cache_key, decision.clone());
        decision
    }

    /// Decisions for a whole parameter table, in order.
    pub fn analyze(
        &self,
        provider: TypeId,
        params: &[ParamDescriptor],
        view: AnalysisView<'_>,
    ) -> Vec<(&'static str, InjectDecision)> {
        params.iter().map(|p| (p.name, self.decide(provider, p, view))).collect()
    }

    /// Uncached decision.
    pub fn classify(param: &ParamDescriptor, view: AnalysisView<'_>) -> InjectDecision {
        if param.has_value_default() {
            return InjectDecision::Skip(SkipReason::HasDefault);
        }
        Self::classify_type(&param.declared, param.has_nil_default(), view)
    }

    fn classify_type(declared: &DeclaredType, nil_default: bool, view: AnalysisView<'_>) -> InjectDecision {
        match declared {
            DeclaredType::Builtin(_) => InjectDecision::Skip(SkipReason::Builtin),
            DeclaredType::Collection(_) => InjectDecision::Skip(SkipReason::Collection),
            DeclaredType::Optional(inner) => {
                if inner.is_builtin() {
                    return InjectDecision::Skip(SkipReason::OptionalOfBuiltin);
                }
                match inner.as_ref() {
                    DeclaredType::Service(s) => InjectDecision::OptionalInject(s.key),
                    DeclaredType::Generic(g) => InjectDecision::OptionalInject(g.key),
                    _ => InjectDecision::Skip(SkipReason::Unsupported),
                }
            }
            DeclaredType::Union(members) => {
                let mut registered: Vec<Key> = Vec::new();
                for key in members.iter().filter_map(DeclaredType::service_key) {
                    if view.available(&key) && !registered.contains(&key) {
                        registered.push(key);
                    }
                }
                match registered.as_slice() {
                    [] => InjectDecision::Skip(SkipReason::UnionWithoutRegisteredMember),
                    [only] => InjectDecision::Inject(*only),
                    _ if nil_default => InjectDecision::Skip(SkipReason::AmbiguousUnionWithDefault),
                    many => InjectDecision::Error(format!(
                        "ambiguous union: {} registered members ({})",
                        many.len(),
                        many.iter().map(Key::to_string).collect::<Vec<_>>().join(", ")
                    )),
                }
            }
            DeclaredType::Service(service) => {
                if nil_default
                    && !view.registry.has(&service.key)
                    && !service.auto.map_or(false, |auto| Self::can_auto_create(&auto, view))
                {
                    InjectDecision::Skip(SkipReason::NilDefault)
                } else {
                    InjectDecision::Inject(service.key)
                }
            }
            DeclaredType::Generic(generic) => {
                if view.available(&generic.key) || !nil_default {
                    InjectDecision::Inject(generic.key)
                } else {
                    InjectDecision::Skip(SkipReason::NilDefault)
                }
            }
            DeclaredType::Lazy(lazy) => InjectDecision::Defer(lazy.key),
        }
    }

    /// True when every required parameter of `auto` can be satisfied,
    /// recursively through further auto-creatable types.
    pub fn can_auto_create(auto: &AutoCreate, view: AnalysisView<'_>) -> bool {
        Self::can_auto_create_inner(auto, view, &mut HashSet::new())
    }

    fn can_auto_create_inner(auto: &AutoCreate, view: AnalysisView<'_>, visited: &mut HashSet<TypeId>) -> bool {
        // A type reached again on the same walk would be a constructor cycle.
        if !visited.insert(auto.provider_id) {
            return false;
        }
        let ok = auto.parameters().iter().all(|param| {
            if param.has_default() {
                return true;
            }
            match Self::classify_type(&param.declared, false, view) {
                InjectDecision::Inject(key) => {
                    view.available(&key)
                        || param
                            .declared
                            .auto_for(&key)
                            .map_or(false, |nested| Self::can_auto_create_inner(&nested, view, visited))
                }
                InjectDecision::OptionalInject(_) | InjectDecision::Defer(_) => true,
                InjectDecision::Skip(_) | InjectDecision::Error(_) => false,
            }
        });
        visited.remove(&auto.provider_id);
        ok
    }

    /// Static dependency tree rooted at `key`, up to `max_depth` levels.
    ///
    /// `auto` supplies the recipe when `key` is not registered.
    pub fn dependency_tree(
        key: Key,
        auto: Option<AutoCreate>,
        view: AnalysisView<'_>,
        max_depth: usize,
    ) -> DependencyNode {
        let mut path = Vec::new();
        Self::tree_node(key, auto, false, view, max_depth, &mut path)
    }

    fn tree_node(
        key: Key,
        auto: Option<AutoCreate>,
        optional: bool,
        view: AnalysisView<'_>,
        remaining: usize,
        path: &mut Vec<Key>,
    ) -> DependencyNode {
        let descriptor = view.registry.lookup(&key);
        let mut node = DependencyNode::leaf(key, descriptor.map(|d| d.lifetime().clone()), optional);
        if path.contains(&key) {
            node.cycle = true;
            return node;
        }
        let params: Vec<ParamDescriptor> = match (descriptor, auto) {
            (Some(d), _) => d.params().to_vec(),
            (None, Some(recipe)) => recipe.parameters(),
            (None, None) => return node,
        };
        if params.is_empty() {
            return node;
        }
        if remaining == 0 {
            node.truncated = true;
            return node;
        }
        path.push(key);
        for param in &params {
            let (child, optional) = match Self::classify(param, view) {
                InjectDecision::Inject(k) => (k, false),
                InjectDecision::OptionalInject(k) => (k, true),
                _ => continue,
            };
            let nested = param.declared.auto_for(&child);
            node.children.push(Self::tree_node(child, nested, optional, view, remaining - 1, path));
        }
        path.pop();
        node
    }

    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock();
        cache.map.clear();
        cache.order.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().map.len()
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.lock().capacity
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer").field("cached", &self.cache_len()).finish()
    }
}
