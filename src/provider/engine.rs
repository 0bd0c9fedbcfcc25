//! The resolution algorithm shared by [`Container`](super::Container),
//! [`Scope`](super::Scope) and [`Lazy`](crate::Lazy).
//!
//! Every step that does not construct anything (lookup, binding selection,
//! analyzer decisions, argument settling) is a plain function used by both
//! the blocking and the suspending walk; the two walks differ only in how
//! they recurse and whether they may await a provider.

use std::any::TypeId;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::analyzer::{AnalysisView, Analyzer, InjectDecision};
use crate::arguments::{ArgValue, Arguments, Overrides, Request};
use crate::descriptors::ServiceDescriptor;
use crate::error::{DiError, DiResult};
use crate::generics::GenericBinding;
use crate::internal::singletons::{self, BuildingMark, Claim};
use crate::internal::BoxFuture;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::params::{AutoCreate, DeclaredType, DefaultValue, LazyRef, ParamDescriptor, TypeShape};
use crate::registration::{AnyArc, Built, Constructor};
use crate::scopes::ScopeManager;
use crate::traits::resolver::{is_absence_of, provider_error};

use super::context::ResolutionContext;
use super::ContainerInner;

/// What to resolve and how to build it when it is not registered.
struct Target {
    key: Key,
    auto: Option<AutoCreate>,
    shape: Option<TypeShape>,
}

impl Target {
    fn of_request(request: &Request) -> Self {
        Target { key: request.key, auto: request.auto, shape: request.shape.clone() }
    }

    fn of_param(key: Key, param: &ParamDescriptor) -> Self {
        let shape = match &param.declared {
            DeclaredType::Generic(generic) if generic.key == key => Some(generic.shape.clone()),
            _ => None,
        };
        Target { key, auto: param.declared.auto_for(&key), shape }
    }

    fn bound(binding: &GenericBinding) -> Self {
        Target { key: binding.concrete(), auto: binding.auto(), shape: None }
    }
}

enum Located {
    Registered(Arc<ServiceDescriptor>),
    Bound(GenericBinding),
}

/// Outcome of planning one parameter.
enum Step {
    Ready(ArgValue),
    Resolve { target: Target, optional: bool },
}

pub(crate) struct Engine<'a> {
    inner: &'a Arc<ContainerInner>,
    scopes: Option<&'a Mutex<ScopeManager>>,
}

impl<'a> Engine<'a> {
    pub(crate) fn new(inner: &'a Arc<ContainerInner>, scopes: Option<&'a Mutex<ScopeManager>>) -> Self {
        Engine { inner, scopes }
    }

    fn context(&self, overrides: Overrides) -> ResolutionContext {
        ResolutionContext::new(overrides, self.inner.options.max_depth, self.scopes.is_some())
    }

    fn view(&self) -> AnalysisView<'_> {
        AnalysisView::new(&self.inner.registry, &self.inner.binder)
    }

    pub(crate) fn resolve_request(&self, request: &Request) -> DiResult<AnyArc> {
        let mut ctx = self.context(request.overrides.clone());
        self.resolve_in(Target::of_request(request), &mut ctx)
    }

    pub(crate) fn resolve_request_async<'b>(&'b self, request: &'b Request) -> BoxFuture<'b, DiResult<AnyArc>> {
        Box::pin(async move {
            let mut ctx = self.context(request.overrides.clone());
            self.resolve_in_async(Target::of_request(request), &mut ctx).await
        })
    }

    /// Arguments for a free-standing parameter table; `overrides` apply to it directly.
    pub(crate) fn assemble(&self, provider: Key, params: &[ParamDescriptor], overrides: &Overrides) -> DiResult<Arguments> {
        let mut ctx = self.context(Overrides::new());
        self.assemble_params(provider, None, params, overrides, &mut ctx)
    }

    pub(crate) fn assemble_async<'b>(
        &'b self,
        provider: Key,
        params: &'b [ParamDescriptor],
        overrides: &'b Overrides,
    ) -> BoxFuture<'b, DiResult<Arguments>> {
        Box::pin(async move {
            let mut ctx = self.context(Overrides::new());
            self.assemble_params_async(provider, None, params, overrides, &mut ctx).await
        })
    }

    // ----- steps shared by both walks -----

    fn cached_singleton(&self, key: &Key, ctx: &ResolutionContext) -> Option<AnyArc> {
        if ctx.has_overrides() {
            return None;
        }
        self.inner.singletons.get(key)
    }

    /// Finds the descriptor or binding serving `target`.
    ///
    /// A key's own absence is returned without a trail frame; the caller
    /// adds one when the failure crosses into its provider.
    fn locate(&self, target: &Target) -> DiResult<Located> {
        let missing = match self.inner.registry.get(&target.key) {
            Ok(descriptor) => return Ok(Located::Registered(descriptor)),
            Err(err) if err.is_not_found() => err,
            Err(err) => return Err(err),
        };
        let registry = &self.inner.registry;
        if let Some(binding) = self.inner.binder.resolve_binding(&target.key, target.shape.as_ref(), registry)? {
            return Ok(Located::Bound(binding));
        }
        match target.auto {
            Some(auto) if Analyzer::can_auto_create(&auto, self.view()) => {
                Ok(Located::Registered(self.inner.synthesized(&auto)))
            }
            _ => Err(missing),
        }
    }

    fn plan(
        &self,
        provider: Key,
        provider_id: Option<TypeId>,
        param: &ParamDescriptor,
        overrides: &Overrides,
    ) -> DiResult<Step> {
        if let Some(value) = overrides.get(param.name) {
            return Ok(Step::Ready(ArgValue::Value(value.clone())));
        }
        let decision = match provider_id {
            Some(id) => self.inner.analyzer.decide(id, param, self.view()),
            None => Analyzer::classify(param, self.view()),
        };
        let step = match decision {
            InjectDecision::Inject(dependency) => {
                Step::Resolve { target: Target::of_param(dependency, param), optional: false }
            }
            InjectDecision::OptionalInject(dependency) => {
                Step::Resolve { target: Target::of_param(dependency, param), optional: true }
            }
            InjectDecision::Defer(dependency) => match lazy_ref(&param.declared) {
                Some(lazy) => Step::Ready(ArgValue::Value((lazy.make)(dependency, Arc::downgrade(self.inner)))),
                None => return Err(DiError::injection(param.name, param.declared.describe()).resolving(provider)),
            },
            InjectDecision::Skip(_) => Step::Ready(match &param.default {
                Some(DefaultValue::Value(value)) => ArgValue::Value(value.clone()),
                Some(DefaultValue::Nil) => ArgValue::Absent,
                None => ArgValue::Missing,
            }),
            InjectDecision::Error(_) => {
                return Err(DiError::injection(param.name, param.declared.describe()).resolving(provider));
            }
        };
        Ok(step)
    }

    fn settle(provider: Key, dependency: Key, optional: bool, result: DiResult<AnyArc>) -> DiResult<ArgValue> {
        match result {
            Ok(value) => Ok(ArgValue::Value(value)),
            Err(err) if optional && err.trail().is_empty() && is_absence_of(&err, &dependency) => Ok(ArgValue::Absent),
            Err(err) => Err(err.resolving(provider)),
        }
    }

    fn scope_manager(&self, scope: &str, ctx: &ResolutionContext) -> DiResult<&'a Mutex<ScopeManager>> {
        match self.scopes {
            Some(manager) if ctx.scopes_visible() => Ok(manager),
            Some(_) => Err(DiError::scope(format!(
                "Scope '{}' is not reachable from a singleton; a singleton cannot depend on a '{}'-scoped service",
                scope, scope
            ))),
            None => Err(DiError::scope(format!("Scope '{}' not active", scope))),
        }
    }

    fn keep_singleton(&self, key: Key, built: Built) -> AnyArc {
        if let Some(disposer) = built.disposer {
            self.inner.root_disposers.lock().push(disposer);
        }
        tracing::debug!(key = %key, "singleton created");
        built.value
    }

    fn finish(&self, key: Key, started: Option<Instant>, result: &DiResult<AnyArc>) {
        let Some(started) = started else {
            return;
        };
        match result {
            Ok(_) => self.inner.observers.resolved(&key, started.elapsed()),
            Err(err) => self.inner.observers.failed(&key, err, started.elapsed()),
        }
    }

    fn start(&self, key: &Key) -> Option<Instant> {
        if !self.inner.observers.has_observers() {
            return None;
        }
        self.inner.observers.resolving(key);
        Some(Instant::now())
    }

    // ----- blocking walk -----

    fn resolve_in(&self, target: Target, ctx: &mut ResolutionContext) -> DiResult<AnyArc> {
        let key = target.key;
        let started = self.start(&key);
        let result = ctx.enter(key).and_then(|()| {
            let result = self.resolve_entered(&target, ctx);
            ctx.leave(key);
            result
        });
        self.finish(key, started, &result);
        result
    }

    fn resolve_entered(&self, target: &Target, ctx: &mut ResolutionContext) -> DiResult<AnyArc> {
        if let Some(hit) = self.cached_singleton(&target.key, ctx) {
            return Ok(hit);
        }
        match self.locate(target)? {
            Located::Registered(descriptor) => self.instantiate(&descriptor, ctx),
            Located::Bound(binding) => {
                let value = self.resolve_in(Target::bound(&binding), ctx).map_err(|e| e.resolving(target.key))?;
                binding.apply(value)
            }
        }
    }

    fn instantiate(&self, descriptor: &ServiceDescriptor, ctx: &mut ResolutionContext) -> DiResult<AnyArc> {
        let key = descriptor.key;
        let overrides = ctx.take_overrides();
        match &descriptor.lifetime {
            Lifetime::Singleton => {
                if !overrides.is_empty() {
                    return self.build_detached(descriptor, &overrides, ctx).map(|built| built.value);
                }
                if singletons::is_building(&key) {
                    return Err(DiError::circular(vec![key, key]));
                }
                let slot = self.inner.singletons.slot(&key);
                match slot.claim_blocking() {
                    Claim::Ready(value) => Ok(value),
                    Claim::Build(guard) => {
                        let _building = BuildingMark::enter(key);
                        let built = self.build_detached(descriptor, &overrides, ctx)?;
                        Ok(guard.complete(self.keep_singleton(key, built)))
                    }
                }
            }
            Lifetime::Scoped(scope) => {
                let manager = self.scope_manager(scope, ctx)?;
                let hit = manager.lock().cached(&key, scope)?;
                if let (Some(value), true) = (hit, overrides.is_empty()) {
                    return Ok(value);
                }
                let built = self.build(descriptor, &overrides, ctx)?;
                if !overrides.is_empty() {
                    return Ok(built.value);
                }
                manager.lock().store(key, scope, built)
            }
            Lifetime::Transient => self.build(descriptor, &overrides, ctx).map(|built| built.value),
        }
    }

    /// Builds with scope frames hidden, for instances that outlive any scope.
    fn build_detached(
        &self,
        descriptor: &ServiceDescriptor,
        overrides: &Overrides,
        ctx: &mut ResolutionContext,
    ) -> DiResult<Built> {
        let previous = ctx.hide_scopes();
        let built = self.build(descriptor, overrides, ctx);
        ctx.restore_scopes(previous);
        built
    }

    fn build(&self, descriptor: &ServiceDescriptor, overrides: &Overrides, ctx: &mut ResolutionContext) -> DiResult<Built> {
        let key = descriptor.key;
        match &descriptor.constructor {
            Constructor::Async(_) => Err(DiError::resolution(
                key,
                format!("cannot synchronously resolve a suspending provider {}; use resolve_async", key),
            )),
            Constructor::Sync(ctor) => {
                let args = self.assemble_params(key, Some(descriptor.provider_id), &descriptor.params, overrides, ctx)?;
                ctor(&args).map_err(|e| provider_error(key, e))
            }
        }
    }

    fn assemble_params(
        &self,
        provider: Key,
        provider_id: Option<TypeId>,
        params: &[ParamDescriptor],
        overrides: &Overrides,
        ctx: &mut ResolutionContext,
    ) -> DiResult<Arguments> {
        let mut args = Arguments::new(provider);
        for param in params {
            let value = match self.plan(provider, provider_id, param, overrides)? {
                Step::Ready(value) => value,
                Step::Resolve { target, optional } => {
                    let dependency = target.key;
                    let result = self.resolve_in(target, ctx);
                    Self::settle(provider, dependency, optional, result)?
                }
            };
            args.push(param.name, value);
        }
        Ok(args)
    }

    // ----- suspending walk -----

    fn resolve_in_async<'b>(&'b self, target: Target, ctx: &'b mut ResolutionContext) -> BoxFuture<'b, DiResult<AnyArc>> {
        Box::pin(async move {
            let key = target.key;
            let started = self.start(&key);
            let result = match ctx.enter(key) {
                Ok(()) => {
                    let result = self.resolve_entered_async(&target, ctx).await;
                    ctx.leave(key);
                    result
                }
                Err(err) => Err(err),
            };
            self.finish(key, started, &result);
            result
        })
    }

    fn resolve_entered_async<'b>(
        &'b self,
        target: &'b Target,
        ctx: &'b mut ResolutionContext,
    ) -> BoxFuture<'b, DiResult<AnyArc>> {
        Box::pin(async move {
            if let Some(hit) = self.cached_singleton(&target.key, ctx) {
                return Ok(hit);
            }
            match self.locate(target)? {
                Located::Registered(descriptor) => self.instantiate_async(descriptor, ctx).await,
                Located::Bound(binding) => {
                    let value = self
                        .resolve_in_async(Target::bound(&binding), ctx)
                        .await
                        .map_err(|e| e.resolving(target.key))?;
                    binding.apply(value)
                }
            }
        })
    }

    fn instantiate_async<'b>(
        &'b self,
        descriptor: Arc<ServiceDescriptor>,
        ctx: &'b mut ResolutionContext,
    ) -> BoxFuture<'b, DiResult<AnyArc>> {
        Box::pin(async move {
            let key = descriptor.key;
            let overrides = ctx.take_overrides();
            match descriptor.lifetime.clone() {
                Lifetime::Singleton => {
                    if !overrides.is_empty() {
                        let built = self.build_detached_async(descriptor.clone(), &overrides, ctx).await?;
                        return Ok(built.value);
                    }
                    if singletons::is_building(&key) {
                        return Err(DiError::circular(vec![key, key]));
                    }
                    let slot = self.inner.singletons.slot(&key);
                    match slot.claim().await {
                        Claim::Ready(value) => Ok(value),
                        Claim::Build(guard) => {
                            let build = self.build_detached_async(descriptor.clone(), &overrides, ctx);
                            let built = singletons::building(key, build).await?;
                            Ok(guard.complete(self.keep_singleton(key, built)))
                        }
                    }
                }
                Lifetime::Scoped(scope) => {
                    let manager = self.scope_manager(&scope, ctx)?;
                    let hit = manager.lock().cached(&key, &scope)?;
                    if let (Some(value), true) = (hit, overrides.is_empty()) {
                        return Ok(value);
                    }
                    let built = self.build_async(descriptor.clone(), &overrides, ctx).await?;
                    if !overrides.is_empty() {
                        return Ok(built.value);
                    }
                    let stored = manager.lock().store(key, &scope, built);
                    stored
                }
                Lifetime::Transient => {
                    let built = self.build_async(descriptor.clone(), &overrides, ctx).await?;
                    Ok(built.value)
                }
            }
        })
    }

    fn build_detached_async<'b>(
        &'b self,
        descriptor: Arc<ServiceDescriptor>,
        overrides: &'b Overrides,
        ctx: &'b mut ResolutionContext,
    ) -> BoxFuture<'b, DiResult<Built>> {
        Box::pin(async move {
            let previous = ctx.hide_scopes();
            let built = self.build_async(descriptor, overrides, ctx).await;
            ctx.restore_scopes(previous);
            built
        })
    }

    fn build_async<'b>(
        &'b self,
        descriptor: Arc<ServiceDescriptor>,
        overrides: &'b Overrides,
        ctx: &'b mut ResolutionContext,
    ) -> BoxFuture<'b, DiResult<Built>> {
        Box::pin(async move {
            let key = descriptor.key;
            let args = self
                .assemble_params_async(key, Some(descriptor.provider_id), &descriptor.params, overrides, ctx)
                .await?;
            match &descriptor.constructor {
                Constructor::Sync(ctor) => ctor(&args).map_err(|e| provider_error(key, e)),
                Constructor::Async(ctor) => {
                    let pending = ctor(args);
                    pending.await.map_err(|e| provider_error(key, e))
                }
            }
        })
    }

    fn assemble_params_async<'b>(
        &'b self,
        provider: Key,
        provider_id: Option<TypeId>,
        params: &'b [ParamDescriptor],
        overrides: &'b Overrides,
        ctx: &'b mut ResolutionContext,
    ) -> BoxFuture<'b, DiResult<Arguments>> {
        Box::pin(async move {
            let mut args = Arguments::new(provider);
            for param in params {
                let value = match self.plan(provider, provider_id, param, overrides)? {
                    Step::Ready(value) => value,
                    Step::Resolve { target, optional } => {
                        let dependency = target.key;
                        let result = self.resolve_in_async(target, &mut *ctx).await;
                        Self::settle(provider, dependency, optional, result)?
                    }
                };
                args.push(param.name, value);
            }
            Ok(args)
        })
    }
}

fn lazy_ref(declared: &DeclaredType) -> Option<&LazyRef> {
    match declared {
        DeclaredType::Lazy(lazy) => Some(lazy),
        DeclaredType::Optional(inner) => lazy_ref(inner),
        _ => None,
    }
}
