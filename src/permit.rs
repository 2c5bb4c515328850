//! [`Permit`] and [`MemoryUnits`] — the RAII handles that return admitted
//! resources to a [`Semaphore`](crate::semaphore::Semaphore) on drop.

use std::cell::Cell;
use std::rc::Rc;

use crate::resources::Resources;
use crate::semaphore::{Semaphore, SharedState, WeakState};

/// A shared handle proving its holder was admitted, reserving `base_cost`.
///
/// Cloning a `Permit` shares ownership (backed by `Rc`): several
/// collaborators (a reader and a [`TrackingFile`](crate::tracking_file::TrackingFile)
/// it spawned) can hold the same logical permit, and only the last clone's
/// drop credits `base_cost` back to the semaphore.
///
/// A permit with no bound semaphore (see [`Permit::null`]) is a valid no-op,
/// used for untracked readers — every operation on it is inert.
#[derive(Clone)]
pub struct Permit(Rc<PermitInner>);

struct PermitInner {
    semaphore: Option<WeakState>,
    base_cost: Cell<Resources>,
}

impl Permit {
    /// Build a permit for resources already debited from `state`.
    pub(crate) fn new_admitted(state: &SharedState, base_cost: Resources) -> Self {
        Permit(Rc::new(PermitInner {
            semaphore: Some(Rc::downgrade(state)),
            base_cost: Cell::new(base_cost),
        }))
    }

    /// A permit bound to no semaphore. All operations on it are inert.
    #[must_use]
    pub fn null() -> Self {
        Permit(Rc::new(PermitInner {
            semaphore: None,
            base_cost: Cell::new(Resources::ZERO),
        }))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.semaphore.is_none()
    }

    /// The resources reserved at admission (zero after [`release`](Permit::release)).
    #[must_use]
    pub fn base_cost(&self) -> Resources {
        self.0.base_cost.get()
    }

    /// Credit `base_cost` back to the semaphore immediately, and zero it so
    /// that the eventual drop is a no-op. Idempotent: calling it twice, or
    /// dropping afterwards, has no further effect.
    pub fn release(&self) {
        let cost = self.0.base_cost.replace(Resources::ZERO);
        if cost.is_zero() {
            return;
        }
        let Some(weak) = &self.0.semaphore else {
            // A null permit always carries a zero base_cost, so this branch
            // is unreachable, but guard it rather than assume.
            return;
        };
        match weak.upgrade() {
            Some(state) => Semaphore::signal_rc(&state, cost),
            None => panic!(
                "compio_admission: permit released after its owning semaphore was dropped"
            ),
        }
    }

    /// Carve out a scoped memory-only reservation bound to the same semaphore.
    #[must_use]
    pub fn get_memory_units(&self, memory: i64) -> MemoryUnits {
        match &self.0.semaphore {
            Some(weak) => MemoryUnits::new(weak.clone(), memory),
            None => MemoryUnits::null(),
        }
    }
}

impl Drop for PermitInner {
    fn drop(&mut self) {
        let cost = self.base_cost.replace(Resources::ZERO);
        if cost.is_zero() {
            return;
        }
        let Some(weak) = &self.semaphore else {
            return;
        };
        match weak.upgrade() {
            Some(state) => Semaphore::signal_rc(&state, cost),
            None => panic!(
                "compio_admission: permit dropped after its owning semaphore was dropped"
            ),
        }
    }
}

/// A movable-only scoped reservation of an incremental memory amount.
///
/// Construction debits the semaphore's memory (no wake-up); drop credits it
/// back and does run the wake loop (via [`Semaphore::signal_memory_rc`]).
/// [`reset`](MemoryUnits::reset) atomically swaps the reserved amount,
/// **debiting the new amount before crediting the old one** so that no
/// waiter can be (incorrectly) woken as if resources had shrunk.
///
/// A null-bound `MemoryUnits` (see [`MemoryUnits::null`]) is a pure no-op in
/// every path, including `reset` — there is no API to rebind it to a real
/// semaphore later.
pub struct MemoryUnits {
    semaphore: Option<WeakState>,
    memory: i64,
}

impl MemoryUnits {
    pub(crate) fn new(semaphore: WeakState, memory: i64) -> Self {
        if memory != 0 {
            match semaphore.upgrade() {
                Some(state) => Semaphore::consume_memory_rc(&state, memory),
                None => panic!(
                    "compio_admission: memory units requested against a destroyed semaphore"
                ),
            }
        }
        Self {
            semaphore: Some(semaphore),
            memory,
        }
    }

    /// A memory-units handle bound to no semaphore; always a no-op.
    #[must_use]
    pub fn null() -> Self {
        Self {
            semaphore: None,
            memory: 0,
        }
    }

    #[must_use]
    pub fn memory(&self) -> i64 {
        self.memory
    }

    /// Atomically credit the current reservation and debit `new_memory`.
    ///
    /// Order matters: the new amount is debited *before* the old amount is
    /// credited, so a waiter cannot be woken against resources that are
    /// about to be consumed again by this same handle.
    pub fn reset(&mut self, new_memory: i64) {
        if let Some(weak) = &self.semaphore {
            match weak.upgrade() {
                Some(state) => {
                    Semaphore::consume_memory_rc(&state, new_memory);
                    Semaphore::signal_memory_rc(&state, self.memory);
                }
                None => panic!(
                    "compio_admission: memory units reset against a destroyed semaphore"
                ),
            }
        }
        self.memory = new_memory;
    }
}

impl Drop for MemoryUnits {
    fn drop(&mut self) {
        self.reset(0);
    }
}
