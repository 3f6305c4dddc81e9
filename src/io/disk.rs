use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::buffer::{AlignedBuffer, DIRECT_IO_ALIGNMENT};

/// How long to let the device settle after a cache drop
pub const CACHE_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Cross-platform cache-bypassing disk I/O capability
pub trait DiskIO: Send + Sync {
    /// Create (or truncate) a file for writing with the OS cache bypassed if possible
    fn open_direct_write(&self, path: &Path) -> io::Result<Box<dyn DirectFile>>;

    /// Open an existing file for reading with the OS cache bypassed if possible
    fn open_direct_read(&self, path: &Path) -> io::Result<Box<dyn DirectFile>>;

    /// Open an existing file for in-place writes without truncating it
    fn open_direct_read_write(&self, path: &Path) -> io::Result<Box<dyn DirectFile>>;

    /// Minimum buffer alignment for bypassing handles
    fn alignment(&self) -> usize {
        DIRECT_IO_ALIGNMENT
    }

    /// Allocate a buffer usable with any handle this instance opens
    fn aligned_buffer(&self, size: usize) -> crate::Result<AlignedBuffer> {
        AlignedBuffer::new(size, self.alignment())
    }

    /// Best-effort global page cache invalidation. Never fails.
    fn drop_caches(&self);
}

/// Direct file operations for (possibly) unbuffered I/O
pub trait DirectFile: Send {
    /// Write at the current position
    fn write_direct(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Read at the current position
    fn read_direct(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn seek_direct(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Force data and metadata to stable storage
    fn sync_all(&mut self) -> io::Result<()>;

    fn file_size(&self) -> io::Result<u64>;

    /// Whether the OS cache is bypassed for this handle
    fn bypass_achieved(&self) -> bool;

    /// Write `buf` at an absolute offset
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.seek_direct(SeekFrom::Start(offset))?;
        self.write_direct(buf)
    }

    /// Read into `buf` from an absolute offset
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.seek_direct(SeekFrom::Start(offset))?;
        self.read_direct(buf)
    }
}

/// `std::fs::File` opened through the platform's bypass mode, or buffered
pub struct PlatformFile {
    file: File,
    bypass: bool,
}

impl PlatformFile {
    pub fn new(file: File, bypass: bool) -> Self {
        Self { file, bypass }
    }
}

impl DirectFile for PlatformFile {
    fn write_direct(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn read_direct(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek_direct(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn file_size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn bypass_achieved(&self) -> bool {
        self.bypass
    }

    #[cfg(unix)]
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(&self.file, buf, offset)
    }

    #[cfg(unix)]
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(&self.file, buf, offset)
    }

    #[cfg(windows)]
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_write(&self.file, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(&self.file, buf, offset)
    }
}

/// Platform-specific disk I/O implementation
#[derive(Debug, Clone)]
pub struct PlatformDiskIO {
    settle_delay: Duration,
}

impl PlatformDiskIO {
    pub fn new() -> Self {
        Self {
            settle_delay: CACHE_SETTLE_DELAY,
        }
    }

    /// Override the pause taken after dropping caches
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    fn open(
        &self,
        path: &Path,
        options: OpenOptions,
        writer: bool,
    ) -> io::Result<Box<dyn DirectFile>> {
        let file = platform::open(&options, path, writer)?;
        if !file.bypass {
            debug!(path = %path.display(), "cache bypass unavailable, using buffered I/O");
        }
        Ok(Box::new(file))
    }
}

impl Default for PlatformDiskIO {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskIO for PlatformDiskIO {
    fn open_direct_write(&self, path: &Path) -> io::Result<Box<dyn DirectFile>> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        self.open(path, options, true)
    }

    fn open_direct_read(&self, path: &Path) -> io::Result<Box<dyn DirectFile>> {
        let mut options = OpenOptions::new();
        options.read(true);
        self.open(path, options, false)
    }

    fn open_direct_read_write(&self, path: &Path) -> io::Result<Box<dyn DirectFile>> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        self.open(path, options, true)
    }

    fn drop_caches(&self) {
        platform::drop_caches();
        if platform::HAS_BYPASS_MODE && !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use super::*;
    use std::os::unix::fs::OpenOptionsExt;

    pub const HAS_BYPASS_MODE: bool = true;

    pub fn open(options: &OpenOptions, path: &Path, _writer: bool) -> io::Result<PlatformFile> {
        let mut direct = options.clone();
        direct.custom_flags(libc::O_DIRECT);
        match direct.open(path) {
            Ok(file) => Ok(PlatformFile::new(file, true)),
            // tmpfs and some FUSE filesystems reject O_DIRECT with EINVAL
            Err(err) => {
                debug!(path = %path.display(), error = %err, "O_DIRECT open failed");
                Ok(PlatformFile::new(options.open(path)?, false))
            }
        }
    }

    pub fn drop_caches() {
        unsafe { libc::sync() };
        if let Err(err) = std::fs::write("/proc/sys/vm/drop_caches", b"3\n") {
            debug!(error = %err, "could not drop page cache");
        }
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::*;
    use std::os::unix::io::AsRawFd;

    pub const HAS_BYPASS_MODE: bool = true;

    pub fn open(options: &OpenOptions, path: &Path, _writer: bool) -> io::Result<PlatformFile> {
        let file = options.open(path)?;
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) };
        if rc == -1 {
            debug!(
                path = %path.display(),
                error = %io::Error::last_os_error(),
                "F_NOCACHE failed"
            );
        }
        Ok(PlatformFile::new(file, rc != -1))
    }

    pub fn drop_caches() {
        unsafe { libc::sync() };
        if let Err(err) = std::process::Command::new("purge").status() {
            debug!(error = %err, "could not run purge");
        }
    }
}

#[cfg(windows)]
mod platform {
    use super::*;
    use std::os::windows::fs::OpenOptionsExt;

    const FILE_FLAG_WRITE_THROUGH: u32 = 0x80000000;
    const FILE_FLAG_NO_BUFFERING: u32 = 0x20000000;

    pub const HAS_BYPASS_MODE: bool = true;

    pub fn open(options: &OpenOptions, path: &Path, writer: bool) -> io::Result<PlatformFile> {
        let mut flags = FILE_FLAG_NO_BUFFERING;
        if writer {
            flags |= FILE_FLAG_WRITE_THROUGH;
        }
        let mut direct = options.clone();
        direct.custom_flags(flags);
        match direct.open(path) {
            Ok(file) => Ok(PlatformFile::new(file, true)),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "unbuffered open failed");
                Ok(PlatformFile::new(options.open(path)?, false))
            }
        }
    }

    // No unprivileged way to flush the standby list
    pub fn drop_caches() {}
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
mod platform {
    use super::*;

    pub const HAS_BYPASS_MODE: bool = false;

    pub fn open(options: &OpenOptions, path: &Path, _writer: bool) -> io::Result<PlatformFile> {
        Ok(PlatformFile::new(options.open(path)?, false))
    }

    pub fn drop_caches() {}
}

/// Create a new platform-specific disk I/O instance
pub fn create_disk_io() -> PlatformDiskIO {
    PlatformDiskIO::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_roundtrip_through_bypass() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("direct.dat");
        let disk_io = PlatformDiskIO::new().with_settle_delay(Duration::ZERO);

        let mut block = disk_io.aligned_buffer(4096).unwrap();
        block.fill(0x5a);

        let mut writer = disk_io.open_direct_write(&path).unwrap();
        assert_eq!(writer.write_direct(&block).unwrap(), 4096);
        writer.sync_all().unwrap();
        assert_eq!(writer.file_size().unwrap(), 4096);
        drop(writer);

        let mut reader = disk_io.open_direct_read(&path).unwrap();
        let mut out = disk_io.aligned_buffer(4096).unwrap();
        assert_eq!(reader.read_direct(&mut out).unwrap(), 4096);
        assert!(out.iter().all(|&b| b == 0x5a));
    }

    #[test]
    fn test_read_write_handle_does_not_truncate() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("rw.dat");
        std::fs::write(&path, vec![1u8; 8192]).unwrap();
        let disk_io = PlatformDiskIO::new();

        let mut handle = disk_io.open_direct_read_write(&path).unwrap();
        assert_eq!(handle.file_size().unwrap(), 8192);

        let mut block = disk_io.aligned_buffer(4096).unwrap();
        block.fill(2);
        assert_eq!(handle.write_at(&block, 4096).unwrap(), 4096);
        handle.sync_all().unwrap();

        let mut out = disk_io.aligned_buffer(4096).unwrap();
        assert_eq!(handle.read_at(&mut out, 0).unwrap(), 4096);
        assert!(out.iter().all(|&b| b == 1));
        assert_eq!(handle.read_at(&mut out, 4096).unwrap(), 4096);
        assert!(out.iter().all(|&b| b == 2));
        assert_eq!(handle.file_size().unwrap(), 8192);
    }

    #[test]
    fn test_open_missing_file_for_read_fails() {
        let temp_dir = tempdir().unwrap();
        let disk_io = PlatformDiskIO::new();
        assert!(disk_io
            .open_direct_read(&temp_dir.path().join("missing.dat"))
            .is_err());
    }

    #[test]
    fn test_drop_caches_is_silent() {
        // Unprivileged runs cannot write drop_caches; that must not panic
        PlatformDiskIO::new()
            .with_settle_delay(Duration::ZERO)
            .drop_caches();
    }

    #[test]
    fn test_aligned_buffer_matches_platform_alignment() {
        let disk_io = create_disk_io();
        let buffer = disk_io.aligned_buffer(8192).unwrap();
        assert_eq!(buffer.as_ptr() as usize % disk_io.alignment(), 0);
    }
}
