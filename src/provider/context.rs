//! Per-call-tree resolution state.
//!
//! A [`ResolutionContext`] is created for every top-level resolve call and
//! threaded by `&mut` through the whole call tree. It is never shared
//! between threads and never outlives the call.

use crate::arguments::Overrides;
use crate::error::DiResult;
use crate::internal::InFlight;
use crate::key::Key;

pub(crate) struct ResolutionContext {
    in_flight: InFlight,
    overrides: Option<Overrides>,
    /// Whether scoped registrations may be resolved from here
    scoped: bool,
    max_depth: usize,
}

impl ResolutionContext {
    pub(crate) fn new(overrides: Overrides, max_depth: usize, scoped: bool) -> Self {
        let overrides = if overrides.is_empty() { None } else { Some(overrides) };
        Self { in_flight: InFlight::new(), overrides, scoped, max_depth }
    }

    /// Marks `key` as being resolved. Fails on a cycle or when too deep.
    pub(crate) fn enter(&mut self, key: Key) -> DiResult<()> {
        self.in_flight.enter(key, self.max_depth)
    }

    pub(crate) fn leave(&mut self, key: Key) {
        self.in_flight.leave(key);
    }

    /// Overrides belong to the first provider instantiated in the call tree.
    pub(crate) fn take_overrides(&mut self) -> Overrides {
        self.overrides.take().unwrap_or_default()
    }

    pub(crate) fn has_overrides(&self) -> bool {
        self.overrides.is_some()
    }

    pub(crate) fn scopes_visible(&self) -> bool {
        self.scoped
    }

    /// Hides scope frames for a singleton subtree; returns the previous state.
    pub(crate) fn hide_scopes(&mut self) -> bool {
        std::mem::replace(&mut self.scoped, false)
    }

    pub(crate) fn restore_scopes(&mut self, previous: bool) {
        self.scoped = previous;
    }
}
