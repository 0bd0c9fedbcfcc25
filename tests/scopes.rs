use ferrous_ioc::{
    key_of_type, Arguments, ContainerOptions, Injectable, ParamDescriptor, ProviderError, Resolver, ServiceCollection,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct RequestContext {
    id: String,
}

fn counting_request_context(sc: &mut ServiceCollection, scope: &str) -> Arc<AtomicU32> {
    let counter = Arc::new(AtomicU32::new(0));
    let seen = counter.clone();
    sc.add_factory(Vec::new(), move |_| {
        let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RequestContext { id: format!("req-{}", n) })
    })
    .scoped(scope)
    .register()
    .unwrap();
    counter
}

#[test]
fn test_scoped_lifetime() {
    let mut sc = ServiceCollection::new();
    counting_request_context(&mut sc, "request");
    let container = sc.build();

    let scope1 = container.enter_scope("request").unwrap();
    let scope2 = container.enter_scope("request").unwrap();

    let ctx1a = scope1.resolve_sync::<RequestContext>().unwrap();
    let ctx1b = scope1.resolve_sync::<RequestContext>().unwrap();
    let ctx2a = scope2.resolve_sync::<RequestContext>().unwrap();
    let ctx2b = scope2.resolve_sync::<RequestContext>().unwrap();

    assert!(Arc::ptr_eq(&ctx1a, &ctx1b));
    assert!(Arc::ptr_eq(&ctx2a, &ctx2b));
    assert!(!Arc::ptr_eq(&ctx1a, &ctx2a));
    assert_eq!(ctx1a.id, "req-1");
    assert_eq!(ctx2a.id, "req-2");
}

#[test]
fn test_cannot_resolve_scoped_from_root() {
    let mut sc = ServiceCollection::new();
    counting_request_context(&mut sc, "request");
    let container = sc.build();

    let err = container.resolve_sync::<RequestContext>().unwrap_err();
    assert!(err.is_scope_error());
    assert!(err.to_string().contains("Scope 'request' not active"));
}

#[test]
fn test_scope_frames_do_not_leak_across_enter_exit() {
    let mut sc = ServiceCollection::new();
    let counter = counting_request_context(&mut sc, "request");
    let container = sc.build();
    let scope = container.create_scope();

    scope.enter("request").unwrap();
    let first = scope.resolve_sync::<RequestContext>().unwrap();
    scope.exit("request").unwrap();
    assert!(scope.resolve_sync::<RequestContext>().unwrap_err().is_scope_error());

    scope.enter("request").unwrap();
    let second = scope.resolve_sync::<RequestContext>().unwrap();
    scope.exit("request").unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unbalanced_exit_is_a_scope_error() {
    let container = ServiceCollection::new().build();
    let scope = container.create_scope();

    assert!(scope.exit("request").unwrap_err().is_scope_error());

    scope.enter("session").unwrap();
    scope.enter("request").unwrap();
    let err = scope.exit("session").unwrap_err();
    assert!(err.is_scope_error());
    assert_eq!(scope.active_scopes(), vec!["session".to_string(), "request".to_string()]);

    scope.exit("request").unwrap();
    scope.exit("session").unwrap();
    assert_eq!(scope.depth(), 0);
}

#[test]
fn test_unknown_scope_cannot_be_entered() {
    let container = ServiceCollection::new().build();
    assert!(container.enter_scope("tenant").unwrap_err().is_scope_error());
    assert!(container.enter_scope("singleton").unwrap_err().is_scope_error());
}

#[test]
fn test_nested_frames_use_innermost_match() {
    let mut sc = ServiceCollection::new();
    counting_request_context(&mut sc, "request");
    let container = sc.build();
    let scope = container.create_scope();

    let _outer = scope.enter_guard("request").unwrap();
    let outer = scope.resolve_sync::<RequestContext>().unwrap();
    {
        let _inner = scope.enter_guard("request").unwrap();
        let inner = scope.resolve_sync::<RequestContext>().unwrap();
        assert!(!Arc::ptr_eq(&outer, &inner));
    }
    assert!(Arc::ptr_eq(&outer, &scope.resolve_sync::<RequestContext>().unwrap()));
}

#[test]
fn test_session_services_visible_from_request_frame() {
    struct Session;
    impl Injectable for Session {
        fn construct(_: &Arguments) -> Result<Self, ProviderError> {
            Ok(Session)
        }
    }

    struct Handler {
        session: Arc<Session>,
    }
    impl Injectable for Handler {
        fn parameters() -> Vec<ParamDescriptor> {
            vec![ParamDescriptor::service::<Session>("session")]
        }
        fn construct(args: &Arguments) -> Result<Self, ProviderError> {
            Ok(Handler { session: args.get("session")? })
        }
    }

    let mut sc = ServiceCollection::new();
    sc.scoped::<Session>("session").unwrap().scoped::<Handler>("request").unwrap();
    let container = sc.build();

    let scope = container.enter_scope("session").unwrap();
    scope.enter("request").unwrap();
    let first = scope.resolve_sync::<Handler>().unwrap();
    scope.exit("request").unwrap();

    scope.enter("request").unwrap();
    let second = scope.resolve_sync::<Handler>().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.session, &second.session));
}

mod lifetimes {
    use super::*;

    pub struct Pool;
    impl Injectable for Pool {
        fn construct(_: &Arguments) -> Result<Self, ProviderError> {
            Ok(Pool)
        }
    }

    #[derive(Debug)]
    pub struct Repository;
    impl Injectable for Repository {
        fn parameters() -> Vec<ParamDescriptor> {
            vec![ParamDescriptor::service::<Pool>("pool")]
        }
        fn construct(_: &Arguments) -> Result<Self, ProviderError> {
            Ok(Repository)
        }
    }

    /// Never registered; reached through auto-creation.
    pub struct UnitOfWork;
    impl Injectable for UnitOfWork {
        fn parameters() -> Vec<ParamDescriptor> {
            vec![ParamDescriptor::service::<Pool>("pool")]
        }
        fn construct(_: &Arguments) -> Result<Self, ProviderError> {
            Ok(UnitOfWork)
        }
    }

    pub struct Reporting;
    impl Injectable for Reporting {
        fn parameters() -> Vec<ParamDescriptor> {
            vec![ParamDescriptor::inject::<UnitOfWork>("uow")]
        }
        fn construct(_: &Arguments) -> Result<Self, ProviderError> {
            Ok(Reporting)
        }
    }
}

#[test]
fn test_singleton_depending_on_scoped_is_rejected_at_registration() {
    use lifetimes::{Pool, Repository};

    let mut sc = ServiceCollection::new();
    sc.scoped::<Pool>("request").unwrap();

    let err = sc.singleton::<Repository>().unwrap_err();
    assert!(err.is_configuration_error());
    let message = err.to_string();
    assert!(message.contains("Repository"));
    assert!(message.contains("request"));
    assert!(!sc.contains(&key_of_type::<Repository>()));
}

#[test]
fn test_rejection_order_does_not_matter() {
    use lifetimes::{Pool, Repository};

    let mut sc = ServiceCollection::new();
    sc.singleton::<Repository>().unwrap();
    assert!(sc.scoped::<Pool>("request").unwrap_err().is_configuration_error());
    assert!(sc.transient::<Pool>().unwrap_err().is_configuration_error());
    sc.singleton::<Pool>().unwrap();
}

#[test]
fn test_session_depending_on_request_is_rejected() {
    use lifetimes::{Pool, Repository};

    let mut sc = ServiceCollection::new();
    sc.scoped::<Pool>("request").unwrap();
    assert!(sc.scoped::<Repository>("session").unwrap_err().is_configuration_error());
    sc.scoped::<Repository>("request").unwrap();
}

#[test]
fn test_validation_walks_through_auto_created_types() {
    use lifetimes::{Pool, Reporting};

    let mut sc = ServiceCollection::new();
    sc.scoped::<Pool>("request").unwrap();
    assert!(sc.singleton::<Reporting>().unwrap_err().is_configuration_error());
}

#[test]
fn test_unknown_scope_name_is_a_configuration_error() {
    let mut sc = ServiceCollection::new();
    let err = sc.scoped::<lifetimes::Pool>("tenant").unwrap_err();
    assert!(err.is_configuration_error());
    assert!(err.to_string().contains("Available scopes"));
}

#[test]
fn test_custom_hierarchy() {
    let options = ContainerOptions::default().with_scope_hierarchy(["singleton", "tenant", "request", "transient"]);
    let mut sc = ServiceCollection::with_options(options).unwrap();
    sc.scoped::<lifetimes::Pool>("request").unwrap();
    assert!(sc.scoped::<lifetimes::Repository>("tenant").is_err());

    let container = sc.build();
    let scope = container.enter_scope("tenant").unwrap();
    scope.enter("request").unwrap();
    assert!(scope.resolve_sync::<lifetimes::Pool>().is_ok());
}

#[test]
fn test_singleton_built_inside_scope_cannot_see_scoped() {
    use lifetimes::{Pool, Repository};

    // Scopes outside the ordering are unconstrained at registration time.
    let mut sc = ServiceCollection::new();
    sc.register_scope("job");
    sc.scoped::<Pool>("job").unwrap();
    sc.singleton::<Repository>().unwrap();
    let container = sc.build();

    let scope = container.enter_scope("job").unwrap();
    assert!(scope.resolve_sync::<Pool>().is_ok());
    let err = scope.resolve_sync::<Repository>().unwrap_err();
    assert!(err.is_scope_error());
    assert!(err.to_string().contains("a singleton cannot depend on a 'job'-scoped service"));
    assert_eq!(err.trail(), &[key_of_type::<Repository>()]);
}
