use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::{IoProbeError, Result};

/// Alignment required by cache-bypassing I/O on the supported platforms
pub const DIRECT_IO_ALIGNMENT: usize = 4096;

/// Heap buffer whose start address is a multiple of a fixed alignment.
///
/// `O_DIRECT` and `FILE_FLAG_NO_BUFFERING` reject transfers from buffers
/// that are not sector aligned, so every buffer handed to a bypassing
/// handle comes from here. Contents are zeroed on allocation.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// The buffer exclusively owns its allocation.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocate `len` zeroed bytes aligned to `alignment` (a power of two)
    pub fn new(len: usize, alignment: usize) -> Result<Self> {
        let layout = Layout::from_size_align(len.max(1), alignment.max(1)).map_err(|e| {
            IoProbeError::ConfigError(format!(
                "Invalid buffer layout ({} bytes, {} alignment): {}",
                len, alignment, e
            ))
        })?;

        // layout size is never zero here
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        };

        Ok(Self { ptr, len, layout })
    }

    /// Allocate a buffer aligned for direct I/O
    pub fn for_direct_io(len: usize) -> Result<Self> {
        Self::new(len, DIRECT_IO_ALIGNMENT)
    }

    /// Alignment of the start address
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("alignment", &self.layout.align())
            .finish()
    }
}
