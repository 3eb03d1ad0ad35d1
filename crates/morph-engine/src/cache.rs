//! Process-wide plan cache.
//!
//! Each (source, destination) pair owns one [`PlanSlot`]. The first requester
//! inserts a `Building` slot atomically (`DashMap::entry`) and receives a
//! [`BuildTicket`]; everyone else either waits on the slot (top-level callers)
//! or takes a lazy reference to it (nested requests made while building).
//! Nested requests never block, so two threads building mutually dependent
//! pairs cannot deadlock.
//!
//! Completed slots (successes and failures) are never evicted; only
//! [`PlanCache::clear`] drops them.

use crate::error::{MapError, Result};
use crate::plan::{MappingPlan, PlanKey, PlanStatus};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use morph_common::limits::PLAN_CACHE_CAPACITY;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use tracing::trace;

type PlanResult = Result<Arc<MappingPlan>>;

enum SlotState {
    Building { owner: ThreadId },
    Done(PlanResult),
}

pub struct PlanSlot {
    state: Mutex<SlotState>,
    done: Condvar,
}

impl PlanSlot {
    fn building() -> Self {
        Self {
            state: Mutex::new(SlotState::Building {
                owner: thread::current().id(),
            }),
            done: Condvar::new(),
        }
    }

    /// The finished result, if the slot is complete.
    fn peek(&self) -> Option<PlanResult> {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            SlotState::Building { .. } => None,
            SlotState::Done(result) => Some(result.clone()),
        }
    }

    fn status(&self) -> PlanStatus {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            SlotState::Building { .. } => PlanStatus::Building,
            SlotState::Done(Ok(plan)) => plan.status,
            SlotState::Done(Err(_)) => PlanStatus::Unresolvable,
        }
    }

    fn complete(&self, result: PlanResult) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = SlotState::Done(result);
        self.done.notify_all();
    }
}

/// Outcome of [`PlanCache::claim`].
pub enum Claim<'c> {
    /// The caller must build the plan and complete the ticket.
    Build(BuildTicket<'c>),
    InProgress(Arc<PlanSlot>),
    Done(PlanResult),
}

/// Exclusive right to build one plan.
///
/// Dropping an uncompleted ticket (for example while unwinding) wakes all
/// waiters with [`MapError::BuildAbandoned`] and removes the slot so a later
/// request can retry.
pub struct BuildTicket<'c> {
    cache: &'c PlanCache,
    key: PlanKey,
    slot: Arc<PlanSlot>,
    names: (String, String),
    completed: bool,
}

impl BuildTicket<'_> {
    pub fn key(&self) -> PlanKey {
        self.key
    }

    /// Publish the result and wake every waiter.
    pub fn complete(mut self, result: PlanResult) -> PlanResult {
        self.completed = true;
        self.cache.stats.builds.fetch_add(1, Ordering::Relaxed);
        self.slot.complete(result.clone());
        trace!(
            source = self.key.source.0.0,
            dest = self.key.dest.0.0,
            ok = result.is_ok(),
            "plan cache: slot completed"
        );
        result
    }
}

impl Drop for BuildTicket<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let (source_type, dest_type) = std::mem::take(&mut self.names);
        self.slot.complete(Err(MapError::BuildAbandoned {
            source_type,
            dest_type,
        }));
        self.cache
            .slots
            .remove_if(&self.key, |_, slot| Arc::ptr_eq(slot, &self.slot));
    }
}

#[derive(Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    waits: AtomicU64,
    lazy_refs: AtomicU64,
}

/// Point-in-time copy of the cache counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub plans: usize,
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub waits: u64,
    pub lazy_refs: u64,
}

pub struct PlanCache {
    slots: DashMap<PlanKey, Arc<PlanSlot>>,
    stats: CacheStats,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanCache {
    pub fn new() -> Self {
        Self {
            slots: DashMap::with_capacity(PLAN_CACHE_CAPACITY),
            stats: CacheStats::default(),
        }
    }

    /// Atomically look up `key`, inserting a `Building` slot if absent.
    ///
    /// `names` label the pair in the error reported if the build is abandoned.
    pub fn claim(&self, key: PlanKey, names: impl FnOnce() -> (String, String)) -> Claim<'_> {
        let slot = match self.slots.entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let slot = Arc::new(PlanSlot::building());
                entry.insert(Arc::clone(&slot));
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                trace!(source = key.source.0.0, dest = key.dest.0.0, "plan cache: miss");
                return Claim::Build(BuildTicket {
                    cache: self,
                    key,
                    slot,
                    names: names(),
                    completed: false,
                });
            }
        };
        // The shard lock is released before touching the slot mutex.
        match slot.peek() {
            Some(result) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                trace!(source = key.source.0.0, dest = key.dest.0.0, "plan cache: hit");
                Claim::Done(result)
            }
            None => Claim::InProgress(slot),
        }
    }

    /// Completed result for `key`, without claiming.
    pub fn lookup(&self, key: PlanKey) -> Option<PlanResult> {
        let slot = self.slots.get(&key).map(|s| Arc::clone(&s))?;
        let result = slot.peek();
        if result.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub fn status(&self, key: PlanKey) -> Option<PlanStatus> {
        let slot = self.slots.get(&key).map(|s| Arc::clone(&s))?;
        Some(slot.status())
    }

    /// Block until another thread finishes the slot.
    ///
    /// Only top-level requests wait. A slot owned by the calling thread can
    /// never finish while it waits, so that case is reported as a cycle.
    pub fn wait(&self, slot: &PlanSlot, names: impl FnOnce() -> (String, String)) -> PlanResult {
        self.stats.waits.fetch_add(1, Ordering::Relaxed);
        let mut state = slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*state {
                SlotState::Done(result) => return result.clone(),
                SlotState::Building { owner } if *owner == thread::current().id() => {
                    let (source, dest) = names();
                    return Err(MapError::UnresolvableCycle {
                        path: vec![source, dest],
                    });
                }
                SlotState::Building { .. } => {
                    state = slot.done.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    pub(crate) fn note_lazy_reference(&self) {
        self.stats.lazy_refs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every slot and reset the counters.
    ///
    /// Builds in flight still complete their (now detached) slots.
    pub fn clear(&self) {
        self.slots.clear();
        for counter in [
            &self.stats.hits,
            &self.stats.misses,
            &self.stats.builds,
            &self.stats.waits,
            &self.stats.lazy_refs,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            plans: self.slots.len(),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            builds: self.stats.builds.load(Ordering::Relaxed),
            waits: self.stats.waits.load(Ordering::Relaxed),
            lazy_refs: self.stats.lazy_refs.load(Ordering::Relaxed),
        }
    }
}
