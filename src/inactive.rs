//! The inactive-read registry's external-facing capability and handle types.

/// A capability for reclaiming an admitted-but-idle reader's resources.
///
/// Implemented by storage-engine reader code, outside this crate. `evict`
/// consumes the box, which is what makes "called at most once" a property of
/// ownership: once the registry hands the boxed reader to `evict`, there is
/// no remaining owned copy that could call it again.
pub trait InactiveRead {
    /// Cause the underlying reader to release its permit promptly.
    ///
    /// Must not re-enter the registry to register a *new* inactive-read entry
    /// for the same logical reader from within this call.
    fn evict(self: Box<Self>);
}

/// An opaque token indexing the inactive-read registry.
///
/// `register_inactive_read` returns `None` in place of the spec's "empty
/// handle" when registration was short-circuited by an immediate eviction —
/// `Option` is the idiomatic Rust rendering of a sentinel "refers to
/// nothing" value, so there is no separate empty-handle constant to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InactiveReadHandle(pub(crate) u64);
