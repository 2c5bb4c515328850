//! Errors surfaced across the waiter's asynchronous completion channel.
//!
//! Per the admission-control design, errors here are always user-visible
//! outcomes of `wait_admission` — never panics. Fatal programming-error
//! invariants (a negative slot count, a permit dropped against a semaphore
//! that no longer exists) are a separate, deliberately non-`Result` class of
//! failure; see the `debug_assert!`/`panic!` call sites in `semaphore.rs` and
//! `permit.rs`.

use thiserror::Error;

/// Errors returned by [`crate::Semaphore::wait_admission`].
#[derive(Debug, Error)]
pub enum SemaphoreError {
    /// The admission queue was already at `max_queue_length` when this waiter
    /// tried to enqueue.
    #[error("semaphore '{name}' admission queue overloaded")]
    QueueOverload { name: String },

    /// The waiter's deadline elapsed before it could be admitted.
    #[error("semaphore '{name}' admission timed out")]
    AdmissionTimeout { name: String },

    /// Defensive: a waiter's completion slot had already been filled when
    /// `signal` attempted to complete it. Unreachable through the public API
    /// of this crate's single-threaded model; kept for parity with the
    /// spec's documented (if rare) failure mode and exercised directly by a
    /// unit test against `SemaphoreState`.
    #[error("semaphore '{name}' failed to deliver a permit to a waiter: {reason}")]
    PromiseFailure { name: String, reason: String },
}
