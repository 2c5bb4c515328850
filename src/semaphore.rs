//! The admission-control core: accounting, FIFO queue, eviction, wake-ups.
//!
//! `Semaphore` is thread-confined — it is `Rc`-backed and carries no locking
//! primitive beyond a single `RefCell`, matching the single-threaded
//! cooperative execution model this crate targets (one instance per shard,
//! never migrated). See `SPEC_FULL.md` §5 for the full rationale.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Instant;

use crate::error::SemaphoreError;
use crate::inactive::{InactiveRead, InactiveReadHandle};
use crate::permit::Permit;
use crate::resources::Resources;

pub(crate) type SharedState = Rc<RefCell<SemaphoreState>>;
pub(crate) type WeakState = Weak<RefCell<SemaphoreState>>;

/// Construction parameters recognized by [`Semaphore::new`].
///
/// This is a plain in-process struct, not a config-*loading* facility —
/// parsing TOML/env/CLI into one remains the caller's responsibility.
pub struct SemaphoreConfig {
    pub count: i64,
    pub memory: i64,
    pub max_queue_length: usize,
    pub name: String,
    pub prethrow_action: Option<Rc<dyn Fn(&str)>>,
}

impl SemaphoreConfig {
    #[must_use]
    pub fn new(count: i64, memory: i64) -> Self {
        Self {
            count,
            memory,
            max_queue_length: usize::MAX,
            name: "admission-semaphore".to_string(),
            prethrow_action: None,
        }
    }

    #[must_use]
    pub fn with_max_queue_length(mut self, max_queue_length: usize) -> Self {
        self.max_queue_length = max_queue_length;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_prethrow_action(mut self, action: Rc<dyn Fn(&str)>) -> Self {
        self.prethrow_action = Some(action);
        self
    }
}

/// A snapshot read-out of the registry's bookkeeping counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SemaphoreStats {
    pub population: usize,
    pub permit_based_evictions: u64,
}

struct WaitEntry {
    id: u64,
    resources: Resources,
    slot: Rc<RefCell<WaitSlot>>,
}

struct WaitSlot {
    result: Option<Result<Permit, SemaphoreError>>,
    waker: Option<Waker>,
}

pub(crate) struct SemaphoreState {
    capacity: Resources,
    resources: Resources,
    wait_list: VecDeque<WaitEntry>,
    inactive_reads: BTreeMap<u64, Box<dyn InactiveRead>>,
    next_inactive_id: u64,
    next_wait_id: u64,
    max_queue_length: usize,
    prethrow_action: Option<Rc<dyn Fn(&str)>>,
    name: String,
    stats: SemaphoreStats,
}

impl SemaphoreState {
    /// `r.count <= available.count && (available.memory > 0 || r.memory == 0)`.
    ///
    /// Slots are hard-capped; memory is soft — a request may exceed currently
    /// available bytes provided *any* memory headroom remains. This same
    /// predicate, applied to a waiter's reserved resources, is what the spec
    /// calls `has_available_units` when deciding whether to wake the queue
    /// head.
    fn may_proceed(&self, r: Resources) -> bool {
        r.count <= self.resources.count && (self.resources.memory > 0 || r.memory == 0)
    }
}

/// The admission-control semaphore for read operations.
///
/// `Semaphore` is `!Send`/`!Sync` by construction (it is `Rc`-backed): it is
/// confined to the single-threaded executor of the shard that created it,
/// exactly as `compio::runtime::spawn`'s `!Send`-friendly local tasks expect.
#[derive(Clone)]
pub struct Semaphore {
    inner: SharedState,
}

impl Semaphore {
    #[must_use]
    pub fn new(config: SemaphoreConfig) -> Self {
        assert!(config.count >= 0, "semaphore slot capacity must be non-negative");
        assert!(config.memory >= 0, "semaphore memory capacity must be non-negative");
        let capacity = Resources::new(config.count, config.memory);
        Self {
            inner: Rc::new(RefCell::new(SemaphoreState {
                capacity,
                resources: capacity,
                wait_list: VecDeque::new(),
                inactive_reads: BTreeMap::new(),
                next_inactive_id: 0,
                next_wait_id: 0,
                max_queue_length: config.max_queue_length,
                prethrow_action: config.prethrow_action,
                name: config.name,
                stats: SemaphoreStats::default(),
            })),
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    #[must_use]
    pub fn capacity(&self) -> Resources {
        self.inner.borrow().capacity
    }

    /// Currently-available (not consumed) resources.
    #[must_use]
    pub fn available_resources(&self) -> Resources {
        self.inner.borrow().resources
    }

    #[must_use]
    pub fn stats(&self) -> SemaphoreStats {
        self.inner.borrow().stats
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.borrow().wait_list.len()
    }

    /// Synchronous fast path for callers that already reserved `resources`
    /// out-of-band (skipping the queue-overload check and the eviction
    /// loop — the caller is asserting the reservation already fits).
    #[must_use]
    pub fn consume_resources(&self, resources: Resources) -> Permit {
        {
            let mut state = self.inner.borrow_mut();
            state.resources -= resources;
            assert!(
                state.resources.count >= 0,
                "compio_admission: slot count went negative in semaphore '{}'",
                state.name
            );
        }
        Permit::new_admitted(&self.inner, resources)
    }

    /// Request admission for one slot plus `memory` bytes, waiting until a
    /// deadline (`None` = wait forever) if capacity is not immediately
    /// available.
    pub async fn wait_admission(
        &self,
        memory: i64,
        deadline: Option<Instant>,
    ) -> Result<Permit, SemaphoreError> {
        let r = Resources::new(1, memory);
        match self.try_admit_or_enqueue(r)? {
            Admission::Ready(permit) => Ok(permit),
            Admission::Enqueued(wait_future) => match deadline {
                None => wait_future.await,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match compio::time::timeout(remaining, wait_future).await {
                        Ok(result) => result,
                        Err(_elapsed) => {
                            let name = self.name();
                            tracing::debug!(semaphore = %name, "admission deadline elapsed");
                            Err(SemaphoreError::AdmissionTimeout { name })
                        }
                    }
                }
            },
        }
    }

    /// Runs the synchronous part of admission (queue-overload check,
    /// eviction loop, immediate-admit-or-enqueue decision) exactly once, as
    /// required by spec §4.2 — none of these side effects may repeat across
    /// a future's polls.
    fn try_admit_or_enqueue(&self, r: Resources) -> Result<Admission, SemaphoreError> {
        let overloaded = {
            let state = self.inner.borrow();
            state.wait_list.len() >= state.max_queue_length
        };
        if overloaded {
            let (name, prethrow_action) = {
                let state = self.inner.borrow();
                (state.name.clone(), state.prethrow_action.clone())
            };
            if let Some(action) = prethrow_action {
                action(&name);
            }
            tracing::warn!(semaphore = %name, "admission queue overloaded");
            return Err(SemaphoreError::QueueOverload { name });
        }

        loop {
            let (proceeds, has_inactive) = {
                let state = self.inner.borrow();
                (state.may_proceed(r), !state.inactive_reads.is_empty())
            };
            if proceeds || !has_inactive {
                break;
            }
            Self::evict_oldest_inactive(&self.inner);
        }

        let mut state = self.inner.borrow_mut();
        if state.may_proceed(r) {
            state.resources -= r;
            assert!(
                state.resources.count >= 0,
                "compio_admission: slot count went negative in semaphore '{}'",
                state.name
            );
            drop(state);
            Ok(Admission::Ready(Permit::new_admitted(&self.inner, r)))
        } else {
            let id = state.next_wait_id;
            state.next_wait_id += 1;
            let slot = Rc::new(RefCell::new(WaitSlot {
                result: None,
                waker: None,
            }));
            state.wait_list.push_back(WaitEntry {
                id,
                resources: r,
                slot: slot.clone(),
            });
            drop(state);
            Ok(Admission::Enqueued(WaitFuture {
                semaphore: Rc::downgrade(&self.inner),
                id,
                slot,
            }))
        }
    }

    /// Credit `r` back to `state` and wake FIFO-eligible waiters.
    ///
    /// Takes the shared `Rc` rather than `&self` so it can be called from
    /// `Permit`/`MemoryUnits` drop glue, which only holds a `Weak` back-reference.
    pub(crate) fn signal_rc(state: &SharedState, r: Resources) {
        let woken = {
            let mut s = state.borrow_mut();
            s.resources += r;
            let mut woken = Vec::new();
            while let Some(front) = s.wait_list.front() {
                if !s.may_proceed(front.resources) {
                    break;
                }
                let entry = s.wait_list.pop_front().expect("front just checked Some");
                s.resources -= entry.resources;
                assert!(
                    s.resources.count >= 0,
                    "compio_admission: slot count went negative in semaphore '{}'",
                    s.name
                );
                let permit = Permit::new_admitted(state, entry.resources);
                woken.push((entry.slot, permit));
            }
            woken
        };
        // Complete and wake outside the borrow: a woken task may run
        // synchronously enough to reenter this semaphore (e.g. by dropping
        // another permit), and that reentrant call needs its own borrow.
        for (slot, permit) in woken {
            let waker = {
                let mut slot = slot.borrow_mut();
                let slot_already_filled = slot.result.is_some();
                if slot_already_filled {
                    // Spec §4.3: "If promise completion itself fails ...
                    // propagate the failure into the promise and continue."
                    // Unreachable via the public API of this single-threaded
                    // model (a slot is only ever written once, by whichever
                    // signal call pops its entry), kept as a defensive branch.
                    slot.result = Some(Err(SemaphoreError::PromiseFailure {
                        name: state.borrow().name.clone(),
                        reason: "waiter slot already completed".to_string(),
                    }));
                } else {
                    slot.result = Some(Ok(permit));
                }
                slot.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }

    /// `signal` restricted to the memory dimension — used by `MemoryUnits`
    /// so an incremental memory credit can still wake memory-only waiters.
    pub(crate) fn signal_memory_rc(state: &SharedState, memory: i64) {
        Self::signal_rc(state, Resources::new(0, memory));
    }

    /// Debit `memory` bytes without running the wake loop.
    pub(crate) fn consume_memory_rc(state: &SharedState, memory: i64) {
        state.borrow_mut().resources.memory -= memory;
    }

    /// Register an idle reader so its resources may be reclaimed under
    /// pressure. Returns `None` (the "empty handle") if there were already
    /// waiters — in that case `reader` is evicted immediately instead.
    pub fn register_inactive_read(
        &self,
        reader: Box<dyn InactiveRead>,
    ) -> Option<InactiveReadHandle> {
        enum Outcome {
            Registered(InactiveReadHandle),
            EvictNow(Box<dyn InactiveRead>),
        }

        let outcome = {
            let mut state = self.inner.borrow_mut();
            if state.wait_list.is_empty() {
                let id = state.next_inactive_id;
                state.next_inactive_id += 1;
                state.inactive_reads.insert(id, reader);
                state.stats.population += 1;
                Outcome::Registered(InactiveReadHandle(id))
            } else {
                Outcome::EvictNow(reader)
            }
        };

        match outcome {
            Outcome::Registered(handle) => Some(handle),
            Outcome::EvictNow(reader) => {
                tracing::debug!(
                    semaphore = %self.name(),
                    "registering inactive read with waiters present; evicting immediately"
                );
                reader.evict();
                self.inner.borrow_mut().stats.permit_based_evictions += 1;
                None
            }
        }
    }

    /// Remove and return an inactive read without evicting it — the caller
    /// is resuming the reader itself.
    pub fn unregister_inactive_read(
        &self,
        handle: InactiveReadHandle,
    ) -> Option<Box<dyn InactiveRead>> {
        let mut state = self.inner.borrow_mut();
        let reader = state.inactive_reads.remove(&handle.0);
        if reader.is_some() {
            state.stats.population -= 1;
        }
        reader
    }

    /// Evict the single oldest (lowest-id) inactive read, if any.
    pub fn try_evict_one_inactive_read(&self) -> bool {
        Self::evict_oldest_inactive(&self.inner)
    }

    /// Pop the lowest-id inactive-read entry and evict it outside any
    /// `RefCell` borrow, since `evict()` may reentrantly call back into this
    /// semaphore (drop a permit, which calls `signal_rc`).
    fn evict_oldest_inactive(state: &SharedState) -> bool {
        let reader = {
            let mut s = state.borrow_mut();
            let id = match s.inactive_reads.keys().next().copied() {
                Some(id) => id,
                None => return false,
            };
            let reader = s.inactive_reads.remove(&id).expect("key just read");
            s.stats.population -= 1;
            reader
        };
        reader.evict();
        let mut s = state.borrow_mut();
        s.stats.permit_based_evictions += 1;
        tracing::debug!(semaphore = %s.name, evictions = s.stats.permit_based_evictions, "evicted inactive read");
        true
    }
}

enum Admission {
    Ready(Permit),
    Enqueued(WaitFuture),
}

/// The future returned by an enqueued `wait_admission` call.
///
/// Dropping it before it resolves (cancellation, or a `compio::time::timeout`
/// firing) removes the corresponding entry from the wait list by id, which
/// does not disturb the FIFO order of the remaining entries.
struct WaitFuture {
    semaphore: WeakState,
    id: u64,
    slot: Rc<RefCell<WaitSlot>>,
}

impl Future for WaitFuture {
    type Output = Result<Permit, SemaphoreError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        if let Some(result) = slot.result.take() {
            return Poll::Ready(result);
        }
        slot.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for WaitFuture {
    fn drop(&mut self) {
        let Some(state) = self.semaphore.upgrade() else {
            return;
        };
        let mut state = state.borrow_mut();
        if let Some(pos) = state.wait_list.iter().position(|entry| entry.id == self.id) {
            state.wait_list.remove(pos);
        }
    }
}
