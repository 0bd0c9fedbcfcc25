//! Injection decisions, generic bindings and static validation.

use ferrous_ioc::{
    key_of_trait, key_of_type, AmbiguityPolicy, AnalysisView, Analyzer, Arguments, ContainerOptions, DeclaredType,
    GenericBinder, GenericBinding, GenericType, InjectDecision, Injectable, ParamDescriptor, ProviderError, Resolver,
    ServiceCollection, SkipReason, TypeShape,
};
use std::sync::Arc;

struct Cache;
struct Metrics;
struct Database;

fn member<T: Send + Sync + 'static>() -> DeclaredType {
    ParamDescriptor::service::<T>("_").declared
}

fn decide(sc: &ServiceCollection, param: &ParamDescriptor) -> InjectDecision {
    let binder = GenericBinder::new(AmbiguityPolicy::Error);
    Analyzer::classify(param, AnalysisView::new(sc.registry(), &binder))
}

#[test]
fn test_defaults_and_builtins_are_left_to_the_caller() {
    let mut sc = ServiceCollection::new();
    sc.instance(Database).unwrap();

    let with_default = ParamDescriptor::service::<Database>("db").with_default(Database);
    assert_eq!(decide(&sc, &with_default), InjectDecision::Skip(SkipReason::HasDefault));
    assert_eq!(
        decide(&sc, &ParamDescriptor::builtin::<u16>("port")),
        InjectDecision::Skip(SkipReason::Builtin)
    );
    assert_eq!(
        decide(&sc, &ParamDescriptor::collection::<Vec<String>>("hosts")),
        InjectDecision::Skip(SkipReason::Collection)
    );
    assert_eq!(
        decide(&sc, &ParamDescriptor::service::<Database>("db")),
        InjectDecision::Inject(key_of_type::<Database>())
    );
    assert_eq!(
        decide(&sc, &ParamDescriptor::optional::<Cache>("cache")),
        InjectDecision::OptionalInject(key_of_type::<Cache>())
    );
}

#[test]
fn test_nil_default_applies_only_when_unavailable() {
    let mut sc = ServiceCollection::new();
    let param = ParamDescriptor::service::<Cache>("cache").with_nil_default();
    assert_eq!(decide(&sc, &param), InjectDecision::Skip(SkipReason::NilDefault));

    sc.instance(Cache).unwrap();
    assert_eq!(decide(&sc, &param), InjectDecision::Inject(key_of_type::<Cache>()));
}

#[test]
fn test_union_decided_by_registered_members() {
    let union = || ParamDescriptor::union("backend", vec![member::<Cache>(), member::<Database>()]);

    let mut sc = ServiceCollection::new();
    assert_eq!(decide(&sc, &union()), InjectDecision::Skip(SkipReason::UnionWithoutRegisteredMember));

    sc.instance(Database).unwrap();
    assert_eq!(decide(&sc, &union()), InjectDecision::Inject(key_of_type::<Database>()));

    sc.instance(Cache).unwrap();
    assert!(matches!(decide(&sc, &union()), InjectDecision::Error(_)));
    assert_eq!(
        decide(&sc, &union().with_nil_default()),
        InjectDecision::Skip(SkipReason::AmbiguousUnionWithDefault)
    );
}

#[derive(Debug)]
struct Dashboard;

impl Injectable for Dashboard {
    fn parameters() -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::union("source", vec![member::<Cache>(), member::<Database>()])]
    }

    fn construct(_: &Arguments) -> Result<Self, ProviderError> {
        Ok(Dashboard)
    }
}

#[test]
fn test_ambiguous_union_fails_resolution_and_validation() {
    let mut sc = ServiceCollection::new();
    sc.instance(Cache).unwrap().instance(Database).unwrap().transient::<Dashboard>().unwrap();
    let container = sc.build();

    let err = container.resolve_sync::<Dashboard>().unwrap_err();
    assert!(err.is_injection_error());
    assert_eq!(err.trail(), &[key_of_type::<Dashboard>()]);
    let report = container.validate();
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].parameter, "source");
}

struct Reporter {
    metrics: Option<Arc<Metrics>>,
}

impl Injectable for Reporter {
    fn parameters() -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::service::<Metrics>("metrics").with_nil_default()]
    }

    fn construct(args: &Arguments) -> Result<Self, ProviderError> {
        Ok(Reporter { metrics: args.optional("metrics")? })
    }
}

#[test]
fn test_nil_default_resolves_to_absent() {
    let mut sc = ServiceCollection::new();
    sc.transient::<Reporter>().unwrap();
    let container = sc.build();
    assert!(container.resolve_sync::<Reporter>().unwrap().metrics.is_none());
    assert!(container.validate().is_valid());
}

#[test]
fn test_decisions_are_cached_per_provider_parameter() {
    let mut sc = ServiceCollection::new();
    sc.instance(Metrics).unwrap();
    sc.transient::<Reporter>().unwrap();
    let container = sc.build();

    container.resolve_sync::<Reporter>().unwrap();
    container.resolve_sync::<Reporter>().unwrap();
    assert_eq!(container.analyzer().cache_len(), 1);

    container.clear_caches();
    assert_eq!(container.analyzer().cache_len(), 0);
}

#[test]
fn test_validate_lists_missing_dependencies() {
    struct Orders;
    impl Injectable for Orders {
        fn parameters() -> Vec<ParamDescriptor> {
            vec![ParamDescriptor::service::<Database>("db")]
        }
        fn construct(_: &Arguments) -> Result<Self, ProviderError> {
            Ok(Orders)
        }
    }

    let mut sc = ServiceCollection::new();
    sc.transient::<Orders>().unwrap();
    let container = sc.build();

    let report = container.validate();
    assert!(!report.is_valid());
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].component, key_of_type::<Orders>());
    assert_eq!(report.missing[0].dependency, key_of_type::<Database>());

    let tree = container.dependency_tree(key_of_type::<Orders>());
    assert_eq!(tree.size(), 2);
    assert!(!tree.has_cycle());
    assert_eq!(tree.children[0].lifetime, None);
}

mod generic {
    use super::*;

    pub struct User;
    pub struct Order;

    pub trait Repository: Send + Sync {
        fn table(&self) -> &'static str;
    }

    impl std::fmt::Debug for dyn Repository {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Repository").finish_non_exhaustive()
        }
    }

    pub struct UserRepository;
    impl Repository for UserRepository {
        fn table(&self) -> &'static str {
            "users"
        }
    }
    impl Injectable for UserRepository {
        fn construct(_: &Arguments) -> Result<Self, ProviderError> {
            Ok(UserRepository)
        }
    }

    pub struct AnyRepository;
    impl Repository for AnyRepository {
        fn table(&self) -> &'static str {
            "generic"
        }
    }
    impl Injectable for AnyRepository {
        fn construct(_: &Arguments) -> Result<Self, ProviderError> {
            Ok(AnyRepository)
        }
    }

    pub struct OrderRepository;
    impl Repository for OrderRepository {
        fn table(&self) -> &'static str {
            "orders"
        }
    }

    pub fn user_binding() -> GenericBinding {
        GenericBinding::injectable::<dyn Repository, UserRepository, _>(
            TypeShape::new("Repository").arg::<User>(),
            |r| r as Arc<dyn Repository>,
        )
    }

    pub fn blanket_binding() -> GenericBinding {
        GenericBinding::injectable::<dyn Repository, AnyRepository, _>(
            TypeShape::new("Repository").any_arg(),
            |r| r as Arc<dyn Repository>,
        )
    }

    pub fn requested<A: 'static>() -> GenericType {
        GenericType::of::<dyn Repository>(TypeShape::new("Repository").arg::<A>())
    }
}

#[test]
fn test_exact_binding_beats_wildcard() {
    use generic::*;

    let mut sc = ServiceCollection::new();
    sc.bind_generic(blanket_binding()).unwrap().bind_generic(user_binding()).unwrap();
    let container = sc.build();

    let repo = container.resolve_generic_sync::<dyn Repository>(requested::<User>()).unwrap();
    assert_eq!(repo.table(), "users");
}

#[test]
fn test_wildcard_serves_other_arguments() {
    use generic::*;

    let mut sc = ServiceCollection::new();
    sc.bind_generic(blanket_binding()).unwrap().bind_generic(user_binding()).unwrap();
    let container = sc.build();

    let repo = container.resolve_generic_sync::<dyn Repository>(requested::<Order>()).unwrap();
    assert_eq!(repo.table(), "generic");
}

#[test]
fn test_registered_concrete_scores_higher() {
    use generic::*;

    let mut sc = ServiceCollection::new();
    sc.instance(OrderRepository).unwrap();
    sc.bind_generic(GenericBinding::registered::<dyn Repository, OrderRepository, _>(
        TypeShape::new("Repository").any_arg(),
        |r| r as Arc<dyn Repository>,
    ))
    .unwrap()
    .bind_generic(blanket_binding())
    .unwrap();
    let container = sc.build();

    let repo = container.resolve_generic_sync::<dyn Repository>(requested::<Order>()).unwrap();
    assert_eq!(repo.table(), "orders");
}

#[test]
fn test_equal_scores_are_ambiguous_by_default() {
    use generic::*;

    let shape = || TypeShape::new("Repository").arg::<User>();
    let tied = || {
        [
            GenericBinding::injectable::<dyn Repository, UserRepository, _>(shape(), |r| r as Arc<dyn Repository>),
            GenericBinding::injectable::<dyn Repository, AnyRepository, _>(shape(), |r| r as Arc<dyn Repository>),
        ]
    };

    let mut strict = ServiceCollection::new();
    for binding in tied() {
        strict.bind_generic(binding).unwrap();
    }
    let err = strict.build().resolve_generic_sync::<dyn Repository>(requested::<User>()).unwrap_err();
    assert!(err.to_string().contains("ambiguous generic binding"));

    let options = ContainerOptions::default().with_generic_ambiguity(AmbiguityPolicy::FirstRegistered);
    let mut lenient = ServiceCollection::with_options(options).unwrap();
    for binding in tied() {
        lenient.bind_generic(binding).unwrap();
    }
    let repo = lenient.build().resolve_generic_sync::<dyn Repository>(requested::<User>()).unwrap();
    assert_eq!(repo.table(), "users");
}

struct UserController {
    repo: Arc<dyn generic::Repository>,
}

impl Injectable for UserController {
    fn parameters() -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::generic("repo", generic::requested::<generic::User>())]
    }

    fn construct(args: &Arguments) -> Result<Self, ProviderError> {
        Ok(UserController { repo: args.get_trait("repo")? })
    }
}

#[test]
fn test_generic_parameter_is_injected() {
    let mut sc = ServiceCollection::new();
    sc.bind_generic(generic::user_binding()).unwrap();
    sc.transient::<UserController>().unwrap();
    let container = sc.build();

    assert_eq!(container.resolve_sync::<UserController>().unwrap().repo.table(), "users");
    assert!(container.validate().is_valid());
    assert!(key_of_trait::<dyn generic::Repository>().is_trait());
}

#[derive(Debug)]
struct RepositoryCache {
    repo: Arc<dyn generic::Repository>,
}

impl Injectable for RepositoryCache {
    fn parameters() -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::generic("repo", generic::requested::<generic::User>())]
    }

    fn construct(args: &Arguments) -> Result<Self, ProviderError> {
        Ok(RepositoryCache { repo: args.get_trait("repo")? })
    }
}

fn request_scoped_binding() -> GenericBinding {
    GenericBinding::registered::<dyn generic::Repository, generic::UserRepository, _>(
        TypeShape::new("Repository").arg::<generic::User>(),
        |r| r as Arc<dyn generic::Repository>,
    )
}

#[test]
fn test_singleton_cannot_reach_scoped_through_generic_binding() {
    let mut sc = ServiceCollection::new();
    sc.scoped::<generic::UserRepository>("request").unwrap();
    sc.bind_generic(request_scoped_binding()).unwrap();

    let err = sc.singleton::<RepositoryCache>().unwrap_err();
    assert!(err.is_configuration_error());
    assert!(!sc.contains(&key_of_type::<RepositoryCache>()));

    sc.scoped::<RepositoryCache>("request").unwrap();
    let scope = sc.build().enter_scope("request").unwrap();
    assert_eq!(scope.resolve_sync::<RepositoryCache>().unwrap().repo.table(), "users");
}

#[test]
fn test_binding_that_breaks_a_singleton_is_rejected() {
    let mut sc = ServiceCollection::new();
    sc.scoped::<generic::UserRepository>("request").unwrap();
    sc.singleton::<RepositoryCache>().unwrap();

    let err = sc.bind_generic(request_scoped_binding()).unwrap_err();
    assert!(err.is_configuration_error());
    assert!(err.to_string().contains("(scope: singleton) cannot depend on"));

    let err = sc.build().resolve_sync::<RepositoryCache>().unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.trail(), &[key_of_type::<RepositoryCache>()]);
}
