//! At-most-once singleton slots shared by the sync and async resolution paths.
//!
//! Each singleton key owns a slot that is `Empty`, `Building` or `Ready`.
//! The first caller to observe `Empty` flips it to `Building` and receives a
//! [`BuildGuard`]; everyone else waits. Blocking callers park on a condvar,
//! async callers await a `Notify`. Dropping the guard without completing it
//! (provider error, panic, cancelled future) resets the slot so a later
//! caller can retry.
//!
//! A slot is never claimed by the walk that is already building it: the
//! keys under construction are tracked per thread for blocking builds and
//! per task for suspending ones, and [`is_building`] lets the engine fail
//! such a request instead of waiting on itself.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use tokio::sync::Notify;

use crate::key::Key;
use crate::registration::AnyArc;

thread_local! {
    static BUILDING: RefCell<Vec<Key>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static BUILDING_TASK: Vec<Key>;
}

/// True when `key` is being built further up this thread's blocking walk
/// or this task's suspending walk.
pub(crate) fn is_building(key: &Key) -> bool {
    BUILDING.with(|building| building.borrow().contains(key))
        || BUILDING_TASK.try_with(|building| building.contains(key)).unwrap_or(false)
}

/// Marks `key` as under construction on this thread until dropped.
pub(crate) struct BuildingMark(Key);

impl BuildingMark {
    pub(crate) fn enter(key: Key) -> Self {
        BUILDING.with(|building| building.borrow_mut().push(key));
        BuildingMark(key)
    }
}

impl Drop for BuildingMark {
    fn drop(&mut self) {
        BUILDING.with(|building| {
            let mut building = building.borrow_mut();
            if let Some(at) = building.iter().rposition(|key| *key == self.0) {
                building.remove(at);
            }
        });
    }
}

/// Runs `build` with `key` marked as under construction for the current task.
pub(crate) async fn building<F: Future>(key: Key, build: F) -> F::Output {
    let mut keys = BUILDING_TASK.try_with(Clone::clone).unwrap_or_default();
    keys.push(key);
    BUILDING_TASK.scope(keys, build).await
}

enum SlotState {
    Empty,
    Building,
    Ready(AnyArc),
}

pub(crate) struct SingletonSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
    notify: Notify,
}

/// Outcome of trying to claim a slot.
pub(crate) enum Claim {
    Ready(AnyArc),
    Build(BuildGuard),
}

impl SingletonSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty),
            ready: Condvar::new(),
            notify: Notify::new(),
        }
    }

    fn peek(&self) -> Option<AnyArc> {
        match &*self.state.lock() {
            SlotState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Claims the slot, parking the thread while another caller builds it.
    pub(crate) fn claim_blocking(self: &Arc<Self>) -> Claim {
        let mut state = self.state.lock();
        loop {
            match &*state {
                SlotState::Ready(value) => return Claim::Ready(value.clone()),
                SlotState::Empty => {
                    *state = SlotState::Building;
                    return Claim::Build(BuildGuard { slot: self.clone(), done: false });
                }
                SlotState::Building => self.ready.wait(&mut state),
            }
        }
    }

    /// Claims the slot, suspending while another caller builds it.
    pub(crate) async fn claim(self: &Arc<Self>) -> Claim {
        loop {
            let notified = {
                let mut state = self.state.lock();
                match &*state {
                    SlotState::Ready(value) => return Claim::Ready(value.clone()),
                    SlotState::Empty => {
                        *state = SlotState::Building;
                        return Claim::Build(BuildGuard { slot: self.clone(), done: false });
                    }
                    // Registered with notify_waiters before the lock is released.
                    SlotState::Building => self.notify.notified(),
                }
            };
            notified.await;
        }
    }

    fn settle(&self, next: SlotState) {
        *self.state.lock() = next;
        self.ready.notify_all();
        self.notify.notify_waiters();
    }
}

/// Exclusive right to build one singleton.
pub(crate) struct BuildGuard {
    slot: Arc<SingletonSlot>,
    done: bool,
}

impl BuildGuard {
    /// Publishes the built value and wakes every waiter.
    pub(crate) fn complete(mut self, value: AnyArc) -> AnyArc {
        self.done = true;
        self.slot.settle(SlotState::Ready(value.clone()));
        value
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        if !self.done {
            self.slot.settle(SlotState::Empty);
        }
    }
}

/// Per-key singleton slots for one container.
#[derive(Default)]
pub(crate) struct SingletonCache {
    slots: RwLock<AHashMap<Key, Arc<SingletonSlot>>>,
}

impl SingletonCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Slot for `key`, created on first use.
    pub(crate) fn slot(&self, key: &Key) -> Arc<SingletonSlot> {
        if let Some(slot) = self.slots.read().get(key) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(*key)
            .or_insert_with(|| Arc::new(SingletonSlot::new()))
            .clone()
    }

    /// Cached instance for `key`, if built.
    pub(crate) fn get(&self, key: &Key) -> Option<AnyArc> {
        self.slots.read().get(key).and_then(|slot| slot.peek())
    }

    /// Forgets every cached instance. Builds in progress finish into their
    /// detached slots and are not observed by later callers.
    pub(crate) fn clear(&self) {
        self.slots.write().clear();
    }

    pub(crate) fn ready_count(&self) -> usize {
        self.slots.read().values().filter(|slot| slot.peek().is_some()).count()
    }
}
