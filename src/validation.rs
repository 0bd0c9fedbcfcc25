//! Registration-time lifetime validation and static graph checks.
//!
//! Two independent checks live here:
//!
//! - **Lifetime hierarchy**: run on every registration. A component may only
//!   depend on components whose scope lives at least as long as its own.
//!   Unregistered dependencies that would be auto-created are walked
//!   through, so `Singleton -> (auto) Helper -> Scoped` is caught too.
//! - **Graph report**: [`validate_registry`] walks the required edges of
//!   every registration and reports cycles, missing dependencies and
//!   parameters the analyzer refuses, without resolving anything.
//!
//! # Validation Rules
//!
//! - **Singleton -> Scoped**: error
//! - **Singleton -> Transient**: error, the transient would be pinned forever
//! - **Session -> Request**: error
//! - **Anything -> Singleton**: OK
//! - Scopes outside the hierarchy ordering are not constrained

use std::collections::HashSet;
use std::fmt;

use crate::analyzer::{AnalysisView, Analyzer, InjectDecision};
use crate::descriptors::ServiceDescriptor;
use crate::error::{DiError, DiResult};
use crate::generics::GenericBinder;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::params::{AutoCreate, DeclaredType, ParamDescriptor};
use crate::registration::Registry;
use crate::scopes::ScopeHierarchy;

/// Checks every registration against the scope hierarchy.
///
/// Fails with a configuration error on an unknown scope name or on the
/// first dependency that outlives its dependent the wrong way round.
pub(crate) fn check_lifetimes(registry: &Registry, binder: &GenericBinder, hierarchy: &ScopeHierarchy) -> DiResult<()> {
    for descriptor in registry.list_all() {
        if let Lifetime::Scoped(name) = descriptor.lifetime() {
            hierarchy.validate_name(name)?;
        }
        check_descriptor(&descriptor, registry, binder, hierarchy)?;
    }
    Ok(())
}

fn check_descriptor(
    descriptor: &ServiceDescriptor,
    registry: &Registry,
    binder: &GenericBinder,
    hierarchy: &ScopeHierarchy,
) -> DiResult<()> {
    let scope = descriptor.lifetime().scope_name();
    let mut visited = HashSet::new();
    let mut pending = edges_of(descriptor.params());

    while let Some((key, auto)) = pending.pop() {
        if !visited.insert(key) {
            continue;
        }
        if let Some(dependency) = registry.lookup(&key) {
            let dependency_scope = dependency.lifetime().scope_name();
            if !hierarchy.can_depend_on(scope, dependency_scope) {
                return Err(DiError::configuration(format!(
                    "Invalid scope dependency: {} (scope: {}) cannot depend on {} (scope: {}). \
                     Components can only depend on longer-lived scopes.",
                    descriptor.key(),
                    scope,
                    key,
                    dependency_scope
                )));
            }
            continue;
        }
        // Any bound implementation may end up serving an unregistered key.
        for binding in binder.bindings_for(&key) {
            pending.push((binding.concrete(), binding.auto()));
        }
        if let Some(auto) = auto {
            pending.extend(edges_of(&auto.parameters()));
        }
    }
    Ok(())
}

fn edges_of(params: &[ParamDescriptor]) -> Vec<(Key, Option<AutoCreate>)> {
    params
        .iter()
        .filter(|param| !param.has_value_default())
        .flat_map(|param| injectable_edges(&param.declared))
        .collect()
}

/// Service keys a declared type may be injected from.
///
/// Lazy parameters are left out: a lazy handle resolves on demand.
fn injectable_edges(declared: &DeclaredType) -> Vec<(Key, Option<AutoCreate>)> {
    match declared {
        DeclaredType::Service(service) => vec![(service.key, service.auto)],
        DeclaredType::Generic(generic) => vec![(generic.key, None)],
        DeclaredType::Optional(inner) => injectable_edges(inner),
        DeclaredType::Union(members) => members.iter().flat_map(injectable_edges).collect(),
        _ => Vec::new(),
    }
}

/// A required dependency that is neither registered nor constructible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    pub component: Key,
    pub parameter: &'static str,
    pub dependency: Key,
}

/// A parameter the analyzer refuses to inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedParameter {
    pub component: Key,
    pub parameter: &'static str,
    pub reason: String,
}

/// Result of [`Container::validate`](crate::Container::validate).
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Arguments, Injectable, ParamDescriptor, ProviderError, ServiceCollection};
///
/// struct Config;
/// struct Server;
/// impl Injectable for Server {
///     fn parameters() -> Vec<ParamDescriptor> {
///         vec![ParamDescriptor::service::<Config>("config")]
///     }
///     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
///         Ok(Server)
///     }
/// }
///
/// let mut services = ServiceCollection::new();
/// services.singleton::<Server>().unwrap();
/// let report = services.build().validate();
///
/// assert!(!report.is_valid());
/// assert_eq!(report.missing.len(), 1);
/// println!("{}", report);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Each cycle starts and ends with the same key
    pub cycles: Vec<Vec<Key>>,
    pub missing: Vec<MissingDependency>,
    pub rejected: Vec<RejectedParameter>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.cycles.is_empty() && self.missing.is_empty() && self.rejected.is_empty()
    }

    /// One line per issue.
    pub fn format_issues(&self) -> String {
        let mut lines = Vec::new();
        for cycle in &self.cycles {
            let names: Vec<String> = cycle.iter().map(Key::to_string).collect();
            lines.push(format!("Circular dependency detected: {}", names.join(" -> ")));
        }
        for missing in &self.missing {
            lines.push(format!(
                "{} parameter '{}' depends on unregistered {}",
                missing.component, missing.parameter, missing.dependency
            ));
        }
        for rejected in &self.rejected {
            lines.push(format!(
                "{} parameter '{}' cannot be injected: {}",
                rejected.component, rejected.parameter, rejected.reason
            ));
        }
        lines.join("\n")
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            f.write_str("no issues")
        } else {
            f.write_str(&self.format_issues())
        }
    }
}

/// Walks required dependencies of every registration.
pub fn validate_registry(registry: &Registry, binder: &GenericBinder) -> ValidationReport {
    let view = AnalysisView::new(registry, binder);
    let mut walker = GraphWalker { view, report: ValidationReport::default(), done: HashSet::new(), path: Vec::new() };
    for key in registry.keys() {
        walker.visit(*key, None);
    }
    walker.report
}

struct GraphWalker<'a> {
    view: AnalysisView<'a>,
    report: ValidationReport,
    done: HashSet<Key>,
    path: Vec<Key>,
}

impl GraphWalker<'_> {
    fn visit(&mut self, key: Key, auto: Option<AutoCreate>) {
        if let Some(start) = self.path.iter().position(|k| *k == key) {
            let mut cycle = self.path[start..].to_vec();
            cycle.push(key);
            self.report.cycles.push(cycle);
            return;
        }
        if !self.done.insert(key) {
            return;
        }
        let params = match (self.view.registry.lookup(&key), auto) {
            (Some(descriptor), _) => descriptor.params().to_vec(),
            (None, Some(recipe)) => recipe.parameters(),
            (None, None) => return,
        };
        self.path.push(key);
        for param in &params {
            match Analyzer::classify(param, self.view) {
                InjectDecision::Inject(dependency) => {
                    let nested = param.declared.auto_for(&dependency);
                    let available =
                        self.view.registry.lookup(&dependency).is_some() || self.view.binder.has_binding(&dependency);
                    if !available && nested.is_none() {
                        self.report.missing.push(MissingDependency {
                            component: key,
                            parameter: param.name,
                            dependency,
                        });
                    } else {
                        self.visit(dependency, nested);
                    }
                }
                InjectDecision::Error(reason) => {
                    self.report.rejected.push(RejectedParameter { component: key, parameter: param.name, reason });
                }
                _ => {}
            }
        }
        self.path.pop();
    }
}
