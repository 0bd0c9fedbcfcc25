//! # ferrous-ioc
//!
//! Scope-aware inversion-of-control container for Rust. Components declare
//! their constructor parameters explicitly; the container decides which ones
//! it can inject, builds the dependency graph on demand, caches instances by
//! lifetime and disposes them in reverse creation order.
//!
//! ## Features
//!
//! - **Lifetimes**: singleton, transient and named scopes ordered by a configurable hierarchy
//! - **Keys**: concrete types, trait objects and string tokens, each optionally named
//! - **Injection analysis**: builtins and parameters with defaults are left to the caller
//! - **Cycle detection**: circular graphs fail with the full cycle path
//! - **Sync and async**: one resolution walk for each mode, sharing the same rules
//! - **Generics**: abstract parameterized types bound to concrete implementations
//! - **Lazy handles**: deferred dependencies that break construction cycles
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_ioc::{Arguments, Injectable, ParamDescriptor, ProviderError, Resolver, ServiceCollection};
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! impl Injectable for UserService {
//!     fn parameters() -> Vec<ParamDescriptor> {
//!         vec![ParamDescriptor::service::<Database>("db")]
//!     }
//!
//!     fn construct(args: &Arguments) -> Result<Self, ProviderError> {
//!         Ok(UserService { db: args.get("db")? })
//!     }
//! }
//!
//! let mut services = ServiceCollection::new();
//! services
//!     .instance(Database { connection_string: "postgres://localhost".to_string() })
//!     .unwrap()
//!     .transient::<UserService>()
//!     .unwrap();
//!
//! let container = services.build();
//! let users = container.resolve_sync::<UserService>().unwrap();
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! ```
//!
//! ## Lifetimes
//!
//! - **Singleton**: created once and shared by the whole container
//! - **Scoped**: created once per active frame of the named scope
//! - **Transient**: created on every resolution
//!
//! A component may only depend on components that live at least as long as
//! it does; registrations that break this are rejected.
//!
//! ## Trait Resolution
//!
//! ```rust
//! use ferrous_ioc::{Resolver, ServiceCollection};
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, message: &str) -> String;
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, message: &str) -> String {
//!         format!("[LOG] {}", message)
//!     }
//! }
//!
//! let mut services = ServiceCollection::new();
//! services.instance_trait::<dyn Logger>(Arc::new(ConsoleLogger)).unwrap();
//!
//! let container = services.build();
//! let logger = container.resolve_trait_sync::<dyn Logger>().unwrap();
//! assert_eq!(logger.log("ready"), "[LOG] ready");
//! ```
//!
//! ## Scoped Services
//!
//! ```rust
//! use ferrous_ioc::{Arguments, Injectable, ProviderError, Resolver, ServiceCollection};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct RequestContext;
//! impl Injectable for RequestContext {
//!     fn construct(_: &Arguments) -> Result<Self, ProviderError> {
//!         Ok(RequestContext)
//!     }
//! }
//!
//! let mut services = ServiceCollection::new();
//! services.scoped::<RequestContext>("request").unwrap();
//! let container = services.build();
//!
//! let scope = container.create_scope();
//! {
//!     let _frame = scope.enter_guard("request").unwrap();
//!     let a = scope.resolve_sync::<RequestContext>().unwrap();
//!     let b = scope.resolve_sync::<RequestContext>().unwrap();
//!     assert!(Arc::ptr_eq(&a, &b));
//! }
//! assert!(scope.resolve_sync::<RequestContext>().unwrap_err().is_scope_error());
//! ```

pub mod analyzer;
pub mod conditions;
pub mod config;
pub mod generics;
pub mod observer;
pub mod scopes;
pub mod validation;

mod arguments;
mod async_factories;
mod collection;
mod descriptors;
mod error;
mod internal;
mod key;
mod lazy;
mod lifetime;
mod params;
mod provider;
mod registration;
mod traits;

pub use analyzer::{AnalysisView, Analyzer, DependencyNode, InjectDecision, SkipReason};
pub use arguments::{Arguments, Overrides, Request};
pub use async_factories::AsyncFactory;
pub use collection::{
    RegistrationBuilder, ServiceCollection, ServiceCollectionExt, ServiceCollectionModuleExt, ServiceModule,
};
pub use conditions::Condition;
pub use config::ContainerOptions;
pub use descriptors::{ComponentInfo, ServiceDescriptor};
pub use error::{DiError, DiResult, ErrorKind, ProviderError};
pub use generics::{AmbiguityPolicy, GenericBinder, GenericBinding};
pub use internal::BoxFuture;
pub use key::{key_of_trait, key_of_type, Key};
pub use lazy::Lazy;
pub use lifetime::Lifetime;
pub use observer::{DiObserver, LoggingObserver, MetricsObserver};
pub use params::{
    AutoCreate, DeclaredType, DefaultValue, GenericType, LazyRef, ParamDescriptor, ServiceRef, TypeArg, TypeShape,
};
pub use provider::{Container, Scope, ScopeGuard};
pub use registration::{AnyArc, Registry};
pub use traits::{
    AsyncDispose, AsyncInitialize, AsyncInjectable, Dispose, Initialize, Injectable, Resolution, Resolver,
    ResolverCore,
};
pub use validation::ValidationReport;
