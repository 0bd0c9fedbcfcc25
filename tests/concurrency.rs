use crossbeam_utils::thread;
use ferrous_ioc::{Arguments, Injectable, ParamDescriptor, ProviderError, Resolver, ServiceCollection};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

#[derive(Debug)]
struct SlowSingleton {
    value: u32,
}

fn slow_singleton(sc: &mut ServiceCollection) -> Arc<AtomicU32> {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();
    sc.add_factory(Vec::new(), move |_| {
        std::thread::sleep(Duration::from_millis(10));
        Ok(SlowSingleton { value: seen.fetch_add(1, Ordering::SeqCst) + 1 })
    })
    .singleton()
    .register()
    .unwrap();
    calls
}

#[test]
fn test_singleton_created_once_under_contention() {
    const THREADS: usize = 16;

    let mut sc = ServiceCollection::new();
    let calls = slow_singleton(&mut sc);
    let container = sc.build();
    let barrier = Barrier::new(THREADS);

    let instances: Vec<Arc<SlowSingleton>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|_| {
                    barrier.wait();
                    container.resolve_sync::<SlowSingleton>().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    assert_eq!(instances[0].value, 1);
}

struct Worker {
    shared: Arc<SlowSingleton>,
}

impl Injectable for Worker {
    fn parameters() -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::service::<SlowSingleton>("shared")]
    }

    fn construct(args: &Arguments) -> Result<Self, ProviderError> {
        Ok(Worker { shared: args.get("shared")? })
    }
}

#[test]
fn test_scopes_on_many_threads_share_singletons_only() {
    let mut sc = ServiceCollection::new();
    let calls = slow_singleton(&mut sc);
    sc.scoped::<Worker>("request").unwrap();
    let container = sc.build();

    let workers: Vec<(Arc<Worker>, Arc<Worker>)> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = container.clone();
                s.spawn(move |_| {
                    let scope = container.enter_scope("request").unwrap();
                    let a = scope.resolve_sync::<Worker>().unwrap();
                    let b = scope.resolve_sync::<Worker>().unwrap();
                    (a, b)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for (a, b) in &workers {
        assert!(Arc::ptr_eq(a, b));
        assert!(Arc::ptr_eq(&a.shared, &workers[0].0.shared));
    }
    assert!(!Arc::ptr_eq(&workers[0].0, &workers[1].0));
}

#[test]
fn test_failed_singleton_lets_waiters_retry() {
    let attempts = Arc::new(AtomicU32::new(0));
    let seen = attempts.clone();
    let mut sc = ServiceCollection::new();
    sc.add_factory(Vec::new(), move |_| {
        std::thread::sleep(Duration::from_millis(5));
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Err("first attempt fails".into())
        } else {
            Ok(SlowSingleton { value: 7 })
        }
    })
    .singleton()
    .register()
    .unwrap();
    let container = sc.build();
    let barrier = Barrier::new(4);

    let results: Vec<bool> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|_| {
                    barrier.wait();
                    container.resolve_sync::<SlowSingleton>().is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert_eq!(results.iter().filter(|ok| !**ok).count(), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(container.resolve_sync::<SlowSingleton>().unwrap().value, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_singleton_created_once_across_tasks() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();
    let mut sc = ServiceCollection::new();
    sc.add_async_factory(Vec::new(), move |_args| {
        let seen = seen.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, ferrous_ioc::ProviderError>(SlowSingleton { value: seen.fetch_add(1, Ordering::SeqCst) + 1 })
        }
    })
    .singleton()
    .register()
    .unwrap();
    let container = sc.build();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let container = container.clone();
            tokio::spawn(async move { container.resolve_async::<SlowSingleton>().await.unwrap() })
        })
        .collect();

    let mut instances = Vec::new();
    for task in tasks {
        instances.push(task.await.unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
}
