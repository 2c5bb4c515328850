//! [`TrackingFile`] — a pass-through file wrapper that debits the owning
//! permit's memory budget as bulk reads return buffers.
//!
//! The admission estimate recorded at `wait_admission` time only covers the
//! *expected* cost of a read; the real I/O only reveals the buffer's actual
//! size once it completes. `TrackingFile::read_bulk` is the one operation
//! that closes that gap, by allocating a [`MemoryUnits`] sized to the
//! returned buffer and tying its lifetime to the buffer itself.

use std::future::Future;
use std::io;

use compio::buf::BufResult;

use crate::permit::{MemoryUnits, Permit};

/// The positional file-I/O surface `TrackingFile` forwards to.
///
/// Mirrors `compio::fs::File`'s `BufResult<usize, buf>`-returning read/write
/// convention (the buffer round-trips back to the caller even on error) over
/// a concrete `Vec<u8>` buffer, which is all this crate's own bulk-read path
/// needs; a test double only needs to implement this trait, not depend on
/// compio's own file type.
pub trait RandomAccessFile {
    fn read_at(&self, buf: Vec<u8>, pos: u64) -> impl Future<Output = BufResult<usize, Vec<u8>>>;
    fn write_at(&self, buf: Vec<u8>, pos: u64) -> impl Future<Output = BufResult<usize, Vec<u8>>>;
    fn sync_all(&self) -> impl Future<Output = io::Result<()>>;
    fn file_size(&self) -> impl Future<Output = io::Result<u64>>;
    fn truncate(&self, size: u64) -> impl Future<Output = io::Result<()>>;
    fn allocate(&self, pos: u64, len: u64) -> impl Future<Output = io::Result<()>>;
    fn discard(&self, pos: u64, len: u64) -> impl Future<Output = io::Result<()>>;
    fn close(self) -> impl Future<Output = io::Result<()>>;
    fn try_clone(&self) -> io::Result<Self>
    where
        Self: Sized;
    /// Forwarded only when this handle wraps a directory; files return an
    /// empty listing.
    fn list_directory(&self) -> io::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// A buffer whose memory charge persists exactly as long as the buffer does.
pub struct TrackedBuffer<T> {
    buf: T,
    // Held only for its Drop side effect (crediting the memory charge back).
    _units: MemoryUnits,
}

impl<T> TrackedBuffer<T> {
    pub fn into_inner(self) -> T {
        self.buf
    }
}

impl<T> std::ops::Deref for TrackedBuffer<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.buf
    }
}

impl<T> std::ops::DerefMut for TrackedBuffer<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.buf
    }
}

/// A file handle plus the permit charged for reading from it.
///
/// Every operation other than [`read_bulk`](TrackingFile::read_bulk)
/// forwards directly to the underlying file; `read_bulk` is the one
/// instrumented path.
pub struct TrackingFile<F> {
    file: F,
    permit: Permit,
}

impl<F: RandomAccessFile> TrackingFile<F> {
    pub fn new(file: F, permit: Permit) -> Self {
        Self { file, permit }
    }

    /// Pre-allocate memory units sized to `range_size`, await the bulk read,
    /// and attach the units to the returned buffer's lifetime.
    ///
    /// If `permit` is null the units are inert no-ops (see
    /// [`Permit::get_memory_units`]), so no accounting happens even though
    /// the returned value is still a `TrackedBuffer` for a uniform API.
    pub async fn read_bulk(
        &self,
        offset: u64,
        range_size: usize,
    ) -> io::Result<TrackedBuffer<Vec<u8>>> {
        let units = self.permit.get_memory_units(range_size as i64);
        let buf = vec![0u8; range_size];
        let BufResult(result, mut buf) = self.file.read_at(buf, offset).await;
        let n = result?;
        buf.truncate(n);
        Ok(TrackedBuffer { buf, _units: units })
    }

    pub async fn read_at(&self, buf: Vec<u8>, pos: u64) -> BufResult<usize, Vec<u8>> {
        self.file.read_at(buf, pos).await
    }

    pub async fn write_at(&self, buf: Vec<u8>, pos: u64) -> BufResult<usize, Vec<u8>> {
        self.file.write_at(buf, pos).await
    }

    pub async fn sync_all(&self) -> io::Result<()> {
        self.file.sync_all().await
    }

    pub async fn file_size(&self) -> io::Result<u64> {
        self.file.file_size().await
    }

    pub async fn truncate(&self, size: u64) -> io::Result<()> {
        self.file.truncate(size).await
    }

    pub async fn allocate(&self, pos: u64, len: u64) -> io::Result<()> {
        self.file.allocate(pos, len).await
    }

    pub async fn discard(&self, pos: u64, len: u64) -> io::Result<()> {
        self.file.discard(pos, len).await
    }

    pub async fn close(self) -> io::Result<()> {
        self.file.close().await
    }

    pub fn try_clone(&self) -> io::Result<Self>
    where
        F: Sized,
    {
        Ok(Self {
            file: self.file.try_clone()?,
            permit: self.permit.clone(),
        })
    }

    pub fn list_directory(&self) -> io::Result<Vec<String>> {
        self.file.list_directory()
    }

    #[must_use]
    pub fn permit(&self) -> &Permit {
        &self.permit
    }
}

/// Wrap `file` with `permit` so bulk reads debit the permit's memory budget.
pub fn make_tracked_file<F: RandomAccessFile>(file: F, permit: Permit) -> TrackingFile<F> {
    TrackingFile::new(file, permit)
}
