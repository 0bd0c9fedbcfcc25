//! Internal implementation details.

use std::future::Future;
use std::pin::Pin;

pub(crate) mod circular;
pub(crate) mod dispose_bag;
pub(crate) mod singletons;

pub(crate) use circular::InFlight;
pub(crate) use dispose_bag::{DisposeBag, Disposer};
pub(crate) use singletons::SingletonCache;

/// Owned, sendable future used wherever resolution has to recurse or be stored.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
