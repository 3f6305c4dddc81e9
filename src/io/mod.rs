//! I/O operations module
//!
//! Platform-specific cache-bypassing file access, aligned buffers,
//! free space probing and crash-safe benchmark file handling.

pub mod buffer;
pub mod cleanup;
pub mod disk;
pub mod space;
pub mod temp;

pub use buffer::{AlignedBuffer, DIRECT_IO_ALIGNMENT};
pub use cleanup::{install_interrupt_handler, CleanupReport, CleanupRegistry};
pub use disk::{create_disk_io, DirectFile, DiskIO, PlatformDiskIO};
pub use space::available_space;
pub use temp::{create_fixed_size_file, TestFile, TestKind};
