use async_trait::async_trait;
use ferrous_ioc::{
    Arguments, AsyncInjectable, Injectable, Lazy, ParamDescriptor, ProviderError, Resolver, ServiceCollection,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

#[derive(Debug)]
struct Expensive {
    id: u32,
}

fn counting(sc: &mut ServiceCollection) -> Arc<AtomicU32> {
    let built = Arc::new(AtomicU32::new(0));
    let seen = built.clone();
    sc.factory(Vec::new(), move |_| Ok(Expensive { id: seen.fetch_add(1, Ordering::SeqCst) + 1 }))
        .unwrap();
    built
}

#[test]
fn test_lazy_resolves_once_even_for_transients() {
    let mut sc = ServiceCollection::new();
    let built = counting(&mut sc);
    let container = sc.build();

    let handle = container.lazy::<Expensive>();
    assert_eq!(built.load(Ordering::SeqCst), 0);

    let first = handle.value().unwrap();
    let second = handle.value().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.id, 1);
    assert_eq!(built.load(Ordering::SeqCst), 1);

    // a fresh handle resolves again
    assert_eq!(container.lazy::<Expensive>().value().unwrap().id, 2);
}

#[test]
fn test_lazy_after_container_dropped() {
    let mut sc = ServiceCollection::new();
    counting(&mut sc);
    let container = sc.build();

    let resolved = container.lazy::<Expensive>();
    resolved.value().unwrap();
    let pending = container.lazy::<Expensive>();
    drop(container);

    assert_eq!(resolved.value().unwrap().id, 1);
    let err = pending.value().unwrap_err();
    assert!(err.to_string().contains("container has been dropped"));
}

#[test]
fn test_lazy_missing_service_fails_on_first_use() {
    let container = ServiceCollection::new().build();
    let handle = container.lazy::<Expensive>();
    assert!(handle.value().unwrap_err().is_not_found());
    assert!(!handle.is_resolved());
}

#[test]
fn test_named_and_trait_handles() {
    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }
    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    let mut sc = ServiceCollection::new();
    sc.add_instance(String::from("backup")).named("secondary").register().unwrap();
    sc.instance_trait::<dyn Greeter>(Arc::new(English)).unwrap();
    let container = sc.build();

    assert_eq!(*container.lazy_named::<String>("secondary").value().unwrap(), "backup");
    assert_eq!(container.lazy_trait::<dyn Greeter>().value().unwrap().greet(), "hello");
}

struct Report {
    source: Arc<Lazy<Expensive>>,
}

impl Injectable for Report {
    fn parameters() -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::lazy::<Expensive>("source")]
    }

    fn construct(args: &Arguments) -> Result<Self, ProviderError> {
        Ok(Report { source: args.lazy("source")? })
    }
}

#[test]
fn test_lazy_parameter_defers_construction() {
    let mut sc = ServiceCollection::new();
    let built = counting(&mut sc);
    sc.transient::<Report>().unwrap();
    let container = sc.build();

    let report = container.resolve_sync::<Report>().unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 0);
    assert_eq!(report.source.value().unwrap().id, 1);
}

#[tokio::test]
async fn test_value_inside_runtime_needs_value_async() {
    let mut sc = ServiceCollection::new();
    counting(&mut sc);
    let container = sc.build();

    let handle = container.lazy::<Expensive>();
    let err = handle.value().unwrap_err();
    assert!(err.to_string().contains("value_async"));

    let value = handle.value_async().await.unwrap();
    assert_eq!(value.id, 1);
    // once cached, the sync accessor works anywhere
    assert!(Arc::ptr_eq(&value, &handle.value().unwrap()));
}

#[derive(Debug)]
struct Looped;

#[test]
fn test_forcing_a_handle_while_it_is_forced_fails() {
    let handle: Arc<OnceLock<Lazy<Looped>>> = Arc::new(OnceLock::new());
    let inner = handle.clone();
    let mut sc = ServiceCollection::new();
    sc.factory(Vec::new(), move |_| {
        if let Some(looped) = inner.get() {
            looped.value()?;
        }
        Ok(Looped)
    })
    .unwrap();
    let container = sc.build();
    let _ = handle.set(container.lazy::<Looped>());

    let err = handle.get().unwrap().value().unwrap_err();
    assert!(err.is_resolution_error());
    assert!(err.to_string().contains("circular lazy resolution"));
    assert!(!handle.get().unwrap().is_resolved());
}

#[tokio::test]
async fn test_forcing_a_handle_while_it_is_forced_fails_async() {
    let handle: Arc<OnceLock<Lazy<Looped>>> = Arc::new(OnceLock::new());
    let inner = handle.clone();
    let mut sc = ServiceCollection::new();
    sc.async_factory(Vec::new(), move |_args: Arguments| {
        let inner = inner.clone();
        async move {
            if let Some(looped) = inner.get() {
                looped.value_async().await?;
            }
            Ok::<_, ProviderError>(Looped)
        }
    })
    .unwrap();
    let container = sc.build();
    let _ = handle.set(container.lazy::<Looped>());

    let err = handle.get().unwrap().value_async().await.unwrap_err();
    assert!(err.is_resolution_error());
    assert!(err.to_string().contains("circular lazy resolution"));
}

#[derive(Debug)]
struct Eager;

impl Injectable for Eager {
    fn parameters() -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::lazy::<Eager>("me")]
    }

    fn construct(args: &Arguments) -> Result<Self, ProviderError> {
        args.lazy::<Eager>("me")?.value()?;
        Ok(Eager)
    }
}

#[test]
fn test_singleton_forcing_itself_fails_instead_of_waiting() {
    let mut sc = ServiceCollection::new();
    sc.singleton::<Eager>().unwrap();
    let container = sc.build();

    let worker = std::thread::spawn(move || {
        let err = container.resolve_sync::<Eager>().unwrap_err();
        (err.to_string(), container.singleton_count())
    });
    let (message, cached) = worker.join().unwrap();
    assert!(message.contains("circular lazy resolution of"), "{}", message);
    assert_eq!(cached, 0);
}

#[derive(Debug)]
struct EagerConnection;

#[async_trait]
impl AsyncInjectable for EagerConnection {
    fn parameters() -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::lazy::<EagerConnection>("me")]
    }

    async fn construct(args: Arguments) -> Result<Self, ProviderError> {
        args.lazy::<EagerConnection>("me")?.value_async().await?;
        Ok(EagerConnection)
    }
}

#[tokio::test]
async fn test_async_singleton_forcing_itself_fails_instead_of_waiting() {
    let mut sc = ServiceCollection::new();
    sc.add_async::<EagerConnection>().singleton().register().unwrap();
    let container = sc.build();

    let resolving = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        container.resolve_async::<EagerConnection>(),
    );
    let err = resolving.await.expect("resolution must not wait on itself").unwrap_err();
    assert!(err.to_string().contains("circular lazy resolution of"));
    assert_eq!(container.singleton_count(), 0);
}
