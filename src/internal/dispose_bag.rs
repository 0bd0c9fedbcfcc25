//! Internal disposal bag for managing cleanup hooks.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;

use futures::FutureExt;

/// Future type for disposal operations.
type BoxFutureUnit = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Cleanup hook captured when an instance was built.
///
/// The hook owns a handle to the instance, so disposing never needs to
/// recover the concrete type from a type-erased value.
pub(crate) enum Disposer {
    Sync(Box<dyn FnOnce() + Send>),
    Async(Box<dyn FnOnce() -> BoxFutureUnit + Send>),
}

impl Disposer {
    pub(crate) fn sync<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Disposer::Sync(Box::new(f))
    }

    pub(crate) fn asynchronous<Fut, F>(f: F) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
    {
        Disposer::Async(Box::new(move || Box::pin(f())))
    }

    /// Runs the hook from synchronous code.
    ///
    /// Async hooks are handed to the current tokio runtime when there is one;
    /// otherwise they are dropped with a warning.
    pub(crate) fn run_blocking(self, owner: &str) {
        match self {
            Disposer::Sync(f) => run_guarded(f, owner),
            Disposer::Async(f) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let owner = owner.to_string();
                    handle.spawn(async move { run_async_guarded(f, &owner).await });
                }
                Err(_) => {
                    tracing::warn!(
                        owner,
                        "async dispose hook skipped: no runtime available during synchronous disposal"
                    );
                }
            },
        }
    }

    pub(crate) async fn run(self, owner: &str) {
        match self {
            Disposer::Sync(f) => run_guarded(f, owner),
            Disposer::Async(f) => run_async_guarded(f, owner).await,
        }
    }
}

async fn run_async_guarded(f: Box<dyn FnOnce() -> BoxFutureUnit + Send>, owner: &str) {
    let outcome = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(pending) => AssertUnwindSafe(pending).catch_unwind().await,
        Err(panic) => Err(panic),
    };
    if outcome.is_err() {
        tracing::warn!(owner, "async dispose hook panicked");
    }
}

/// Dispose failures are logged, never propagated.
fn run_guarded(f: Box<dyn FnOnce() + Send>, owner: &str) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(owner, "dispose hook panicked");
    }
}

/// Disposal hooks run in reverse registration order (LIFO).
#[derive(Default)]
pub(crate) struct DisposeBag {
    hooks: Vec<Disposer>,
}

impl DisposeBag {
    pub(crate) fn push(&mut self, disposer: Disposer) {
        self.hooks.push(disposer);
    }

    /// Takes every hook, leaving the bag empty.
    pub(crate) fn take(&mut self) -> DisposeBag {
        DisposeBag { hooks: std::mem::take(&mut self.hooks) }
    }

    pub(crate) fn run_all_blocking(&mut self, owner: &str) {
        while let Some(hook) = self.hooks.pop() {
            hook.run_blocking(owner);
        }
    }

    pub(crate) async fn run_all(&mut self, owner: &str) {
        while let Some(hook) = self.hooks.pop() {
            hook.run(owner).await;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn hooks_run_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        for i in 0..3 {
            let log = log.clone();
            bag.push(Disposer::sync(move || log.lock().unwrap().push(i)));
        }
        assert_eq!(bag.len(), 3);
        bag.run_all_blocking("test");
        assert_eq!(bag.len(), 0);
        assert_eq!(*log.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn panicking_hook_does_not_stop_the_rest() {
        let ran = Arc::new(Mutex::new(false));
        let mut bag = DisposeBag::default();
        let flag = ran.clone();
        bag.push(Disposer::sync(move || *flag.lock().unwrap() = true));
        bag.push(Disposer::sync(|| panic!("dispose failed")));
        bag.run_all_blocking("test");
        assert!(*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn async_and_sync_hooks_interleave_lifo() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        let l1 = log.clone();
        bag.push(Disposer::sync(move || l1.lock().unwrap().push("sync")));
        let l2 = log.clone();
        bag.push(Disposer::asynchronous(move || async move {
            l2.lock().unwrap().push("async");
        }));
        bag.run_all("test").await;
        assert_eq!(*log.lock().unwrap(), vec!["async", "sync"]);
    }

    #[tokio::test]
    async fn panicking_async_hook_does_not_stop_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        let l1 = log.clone();
        bag.push(Disposer::sync(move || l1.lock().unwrap().push("sync")));
        bag.push(Disposer::asynchronous(|| async { panic!("async dispose failed") }));
        let l2 = log.clone();
        bag.push(Disposer::asynchronous(move || async move {
            tokio::task::yield_now().await;
            l2.lock().unwrap().push("async");
        }));
        bag.run_all("test").await;
        assert_eq!(*log.lock().unwrap(), vec!["async", "sync"]);
    }
}
