//! Core traits for the resolution engine.

mod dispose;
mod initialize;
mod injectable;
pub(crate) mod resolver;

pub use dispose::{AsyncDispose, Dispose};
pub use initialize::{AsyncInitialize, Initialize};
pub use injectable::{AsyncInjectable, Injectable};
pub use resolver::{Resolution, Resolver, ResolverCore};
