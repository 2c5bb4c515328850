//! Admission-control semaphore for compio runtime
//!
//! This crate provides a single-threaded, per-shard admission-control
//! semaphore for bounding concurrent readers by both a slot count and a
//! memory budget, with an inactive-read registry that can be drained under
//! memory pressure before a waiter is ever queued.
//!
//! Unlike a conventional semaphore, admission along the memory dimension is
//! *soft*: a request is admitted as long as the semaphore is not already
//! over memory budget, even if admitting it pushes memory usage negative.
//! This mirrors how storage engines bound concurrent scans without forcing
//! every read to fit inside a hard memory ceiling.
//!
//! # Primitives
//!
//! - [`Semaphore`] - the admission-control gate, keyed on a name for logging
//! - [`Permit`] - an RAII handle to admitted resources
//! - [`MemoryUnits`] - a scoped, resizable memory-only reservation
//! - [`TrackingFile`] - a positional-I/O wrapper that debits a permit as
//!   bulk reads return buffers
//!
//! # Example
//!
//! ```rust,no_run
//! use compio_admission::{Resources, Semaphore, SemaphoreConfig};
//!
//! #[compio::main]
//! async fn main() {
//!     let sem = Semaphore::new(SemaphoreConfig::new(100, 64 * 1024 * 1024).with_name("reads"));
//!
//!     let permit = sem
//!         .wait_admission(4096, None)
//!         .await
//!         .expect("admission queue overloaded");
//!     // ... perform the read while `permit` is held ...
//!     drop(permit);
//! }
//! ```

mod error;
mod inactive;
mod permit;
mod resources;
mod semaphore;
mod tracking_file;

pub use error::SemaphoreError;
pub use inactive::{InactiveRead, InactiveReadHandle};
pub use permit::{MemoryUnits, Permit};
pub use resources::Resources;
pub use semaphore::{Semaphore, SemaphoreConfig, SemaphoreStats};
pub use tracking_file::{make_tracked_file, RandomAccessFile, TrackedBuffer, TrackingFile};
