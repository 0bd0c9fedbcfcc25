use ferrous_ioc::{
    key_of_type, Arguments, DiError, ErrorKind, Injectable, Key, Lifetime, Overrides, ParamDescriptor, ProviderError,
    Request, Resolver, ServiceCollection,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Config {
    port: u16,
}

#[derive(Debug)]
struct Server {
    config: Arc<Config>,
    name: String,
}

impl Injectable for Server {
    fn parameters() -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::service::<Config>("config"),
            ParamDescriptor::builtin::<String>("name").with_default(String::from("MyServer")),
        ]
    }

    fn construct(args: &Arguments) -> Result<Self, ProviderError> {
        Ok(Server { config: args.get("config")?, name: args.value("name")? })
    }
}

#[test]
fn test_concrete_singleton() {
    let mut sc = ServiceCollection::new();
    sc.instance(42usize).unwrap().instance("hello".to_string()).unwrap();

    let container = sc.build();

    let num1 = container.resolve_sync::<usize>().unwrap();
    let num2 = container.resolve_sync::<usize>().unwrap();
    let str1 = container.resolve_sync::<String>().unwrap();
    let str2 = container.resolve_sync::<String>().unwrap();

    assert_eq!(*num1, 42);
    assert_eq!(*str1, "hello");
    assert!(Arc::ptr_eq(&num1, &num2));
    assert!(Arc::ptr_eq(&str1, &str2));
}

#[test]
fn test_injectable_with_dependencies() {
    let mut sc = ServiceCollection::new();
    sc.instance(Config { port: 8080 }).unwrap();
    sc.singleton::<Server>().unwrap();

    let container = sc.build();
    let server = container.resolve_sync::<Server>().unwrap();

    assert_eq!(server.config.port, 8080);
    assert_eq!(server.name, "MyServer");
}

#[test]
fn test_transient_creates_new_instances() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let mut sc = ServiceCollection::new();
    sc.factory(Vec::new(), move |_| Ok(counter_clone.fetch_add(1, Ordering::SeqCst) + 1)).unwrap();

    let container = sc.build();
    let a = container.resolve_sync::<u32>().unwrap();
    let b = container.resolve_sync::<u32>().unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!((*a, *b), (1, 2));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_missing_service_is_not_found() {
    let container = ServiceCollection::new().build();

    let err = container.resolve_sync::<Config>().unwrap_err();
    assert!(err.is_not_found());
    assert!(err.is_resolution_error());
    assert!(err.trail().is_empty());
    assert!(container.try_resolve_sync::<Config>().unwrap().is_none());
}

#[test]
fn test_missing_dependency_names_every_frame() {
    let mut sc = ServiceCollection::new();
    sc.singleton::<Server>().unwrap();

    let err = sc.build().resolve_sync::<Server>().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::NotFound { key } if *key == key_of_type::<Config>()));
    assert_eq!(err.trail(), &[key_of_type::<Server>()]);
    assert!(err.to_string().contains("caused resolving"));
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let mut sc = ServiceCollection::new();
    sc.instance(1u8).unwrap();

    let err = sc.instance(2u8).unwrap_err();
    assert!(err.is_registration_error());

    let container = sc.build();
    assert_eq!(*container.resolve_sync::<u8>().unwrap(), 1);
}

#[test]
fn test_provider_failure_is_wrapped_and_not_cached() {
    let attempts = Arc::new(AtomicU32::new(0));
    let seen = attempts.clone();

    let mut sc = ServiceCollection::new();
    sc.add_factory(Vec::new(), move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Err("connection refused".into())
        } else {
            Ok(Config { port: 5432 })
        }
    })
    .singleton()
    .register()
    .unwrap();

    let container = sc.build();
    let err = container.resolve_sync::<Config>().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Resolution { cause: Some(_), .. }));
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(container.singleton_count(), 0);

    assert_eq!(container.resolve_sync::<Config>().unwrap().port, 5432);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_overrides_apply_to_top_level_provider() {
    let mut sc = ServiceCollection::new();
    sc.instance(Config { port: 80 }).unwrap();
    sc.transient::<Server>().unwrap();
    let container = sc.build();

    let custom = container.resolve_sync_with::<Server>(Overrides::new().with("name", String::from("edge"))).unwrap();
    assert_eq!(custom.name, "edge");
    assert_eq!(custom.config.port, 80);

    let replaced = container
        .resolve_sync_with::<Server>(Overrides::new().with("config", Config { port: 9000 }))
        .unwrap();
    assert_eq!(replaced.config.port, 9000);
}

#[test]
fn test_overrides_bypass_singleton_cache() {
    let mut sc = ServiceCollection::new();
    sc.instance(Config { port: 80 }).unwrap();
    sc.singleton::<Server>().unwrap();
    let container = sc.build();

    let shared = container.resolve_sync::<Server>().unwrap();
    let custom = container.resolve_sync_with::<Server>(Overrides::new().with("name", String::from("custom"))).unwrap();

    assert_eq!(custom.name, "custom");
    assert!(!Arc::ptr_eq(&shared, &custom));
    assert!(Arc::ptr_eq(&shared, &container.resolve_sync::<Server>().unwrap()));
}

#[test]
fn test_tokens_and_named_registrations() {
    let mut sc = ServiceCollection::new();
    sc.token("database_url", String::from("postgres://primary")).unwrap();
    sc.add_instance(String::from("postgres://replica")).as_token("database_url").named("replica").register().unwrap();

    let container = sc.build();
    assert_eq!(*container.resolve_token_sync::<String>("database_url").unwrap(), "postgres://primary");
    let replica = container
        .resolve_request_sync::<String>(&Request::token("database_url").named("replica"))
        .unwrap();
    assert_eq!(*replica, "postgres://replica");
}

#[test]
fn test_call_resolves_free_function_parameters() {
    let mut sc = ServiceCollection::new();
    sc.instance(Config { port: 8443 }).unwrap();
    let container = sc.build();

    let params = [
        ParamDescriptor::service::<Config>("config"),
        ParamDescriptor::builtin::<bool>("tls").with_default(true),
    ];
    let url = container
        .call(&params, &Overrides::new(), |args| {
            let scheme = if args.value::<bool>("tls")? { "https" } else { "http" };
            Ok(format!("{}://localhost:{}", scheme, args.get::<Config>("config")?.port))
        })
        .unwrap();
    assert_eq!(url, "https://localhost:8443");
}

#[test]
fn test_provider_errors_keep_their_kind() {
    let mut sc = ServiceCollection::new();
    sc.factory(Vec::new(), |_| -> Result<Config, ProviderError> { Err(Box::new(DiError::scope("no tenant"))) })
        .unwrap();

    let err = sc.build().resolve_sync::<Config>().unwrap_err();
    assert!(err.is_scope_error());
}

#[test]
fn test_component_introspection() {
    let mut sc = ServiceCollection::new();
    sc.instance(Config { port: 1 }).unwrap();
    sc.add::<Server>().singleton().tagged("http").with_metadata("owner", "platform").register().unwrap();
    let container = sc.build();

    let info = container.component_info(&key_of_type::<Server>()).unwrap();
    assert_eq!(info.lifetime, Lifetime::Singleton);
    assert_eq!(info.tags, vec!["http".to_string()]);
    assert!(info.condition_met);
    assert!(!info.is_factory);

    let keys: Vec<Key> = container.list_components().into_iter().map(|info| info.key).collect();
    assert_eq!(keys, vec![key_of_type::<Config>(), key_of_type::<Server>()]);
    assert_eq!(container.registry().find_by_tag("http").len(), 1);
    assert!(container.registry().lookup(&key_of_type::<Server>()).unwrap().metadata("owner").is_some());
}

#[test]
fn test_dispatching_resolve_outside_runtime_is_ready() {
    let mut sc = ServiceCollection::new();
    sc.instance(Config { port: 7 }).unwrap();
    let container = sc.build();

    let resolution = container.resolve::<Config>();
    assert!(resolution.is_ready());
    assert_eq!(resolution.into_ready().unwrap().port, 7);
}
