use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::cleanup::CleanupRegistry;
use crate::{IoProbeError, Result, MIB, TEMP_FILE_PREFIX};

/// Chunk size used while filling a test file
const FILL_CHUNK_SIZE: u64 = MIB;

/// Which benchmark a test file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestKind {
    Sequential,
    RandomAccess,
}

impl TestKind {
    /// Fixed file name used for this kind inside the target directory
    pub fn file_name(&self) -> String {
        let suffix = match self {
            TestKind::Sequential => "seq",
            TestKind::RandomAccess => "iops",
        };
        format!("{}{}.dat", TEMP_FILE_PREFIX, suffix)
    }
}

/// Registered benchmark file, removed and unregistered on drop
#[derive(Debug)]
pub struct TestFile {
    path: PathBuf,
    len: u64,
    registry: CleanupRegistry,
    cleanup_on_drop: bool,
    torn_down: bool,
}

impl TestFile {
    /// Register the path for `kind` in `dir` without creating anything.
    ///
    /// Used when the benchmark itself produces the file content.
    pub fn reserve(registry: &CleanupRegistry, dir: &Path, kind: TestKind, len: u64) -> Self {
        let path = dir.join(kind.file_name());
        registry.register(&path);
        Self {
            path,
            len,
            registry: registry.clone(),
            cleanup_on_drop: true,
            torn_down: false,
        }
    }

    /// Register, then create a `len`-byte file of random content in `dir`
    pub fn create(
        registry: &CleanupRegistry,
        dir: &Path,
        kind: TestKind,
        len: u64,
    ) -> Result<Self> {
        let file = Self::reserve(registry, dir, kind, len);
        debug!(path = %file.path.display(), len, "creating test file");

        if let Err(err) = create_fixed_size_file(&file.path, len) {
            let message = format!("Failed to create {}: {}", file.path.display(), err);
            // drop removes the partial file and unregisters it
            drop(file);
            return Err(match err.kind() {
                io::ErrorKind::PermissionDenied => IoProbeError::PermissionDenied(message),
                io::ErrorKind::StorageFull => IoProbeError::InsufficientSpace(message),
                _ => IoProbeError::SetupError(message),
            });
        }

        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Intended length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Leave the file on disk when dropped (for debugging)
    pub fn keep_on_drop(&mut self) {
        self.cleanup_on_drop = false;
    }

    /// Delete the file now and unregister it. A missing file is not an error.
    pub fn remove(mut self) -> io::Result<()> {
        self.torn_down = true;
        let result = match std::fs::remove_file(&self.path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        };
        self.registry.unregister(&self.path);
        result
    }
}

impl Drop for TestFile {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        if self.cleanup_on_drop {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "failed to remove test file")
                }
            }
        }
        self.registry.unregister(&self.path);
    }
}

/// Write exactly `size` bytes of cryptographically random data to `path`
/// and flush them to stable storage.
///
/// Every chunk gets fresh random bytes so compressing or deduplicating
/// storage cannot shrink the workload.
pub fn create_fixed_size_file(path: &Path, size: u64) -> io::Result<()> {
    let mut file = File::create(path)?;
    let mut rng = StdRng::from_entropy();
    let mut chunk = vec![0u8; size.min(FILL_CHUNK_SIZE) as usize];

    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(chunk.len() as u64) as usize;
        rng.fill_bytes(&mut chunk[..n]);
        file.write_all(&chunk[..n])?;
        remaining -= n as u64;
    }

    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_fixed_size_file_exact_length() {
        let temp_dir = tempdir().unwrap();
        for size in [0u64, 1, 4096, MIB + 123, 3 * MIB] {
            let path = temp_dir.path().join(format!("f{}.dat", size));
            create_fixed_size_file(&path, size).unwrap();
            assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
        }
    }

    #[test]
    fn test_content_is_not_constant() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("random.dat");
        create_fixed_size_file(&path, 2 * MIB).unwrap();
        let data = std::fs::read(&path).unwrap();
        let (first, second) = data.split_at(MIB as usize);
        assert_ne!(first, second);
        assert!(data.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_file_names_per_kind() {
        assert_eq!(TestKind::Sequential.file_name(), ".ioprobe_seq.dat");
        assert_eq!(TestKind::RandomAccess.file_name(), ".ioprobe_iops.dat");
    }

    #[test]
    fn test_drop_removes_and_unregisters() {
        let temp_dir = tempdir().unwrap();
        let registry = CleanupRegistry::new();

        let file =
            TestFile::create(&registry, temp_dir.path(), TestKind::RandomAccess, 8192).unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8192);
        assert!(registry.contains(&path));

        drop(file);
        assert!(!path.exists());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_keep_on_drop() {
        let temp_dir = tempdir().unwrap();
        let registry = CleanupRegistry::new();

        let mut file =
            TestFile::create(&registry, temp_dir.path(), TestKind::Sequential, 4096).unwrap();
        file.keep_on_drop();
        let path = file.path().to_path_buf();
        drop(file);

        assert!(path.exists());
        assert!(registry.is_empty());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_reserve_registers_without_creating() {
        let temp_dir = tempdir().unwrap();
        let registry = CleanupRegistry::new();

        let file = TestFile::reserve(&registry, temp_dir.path(), TestKind::Sequential, MIB);
        assert!(!file.path().exists());
        assert!(registry.contains(file.path()));

        // missing file is fine for explicit teardown
        file.remove().unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_in_missing_dir_fails_and_unregisters() {
        let temp_dir = tempdir().unwrap();
        let registry = CleanupRegistry::new();
        let missing = temp_dir.path().join("does-not-exist");

        let result = TestFile::create(&registry, &missing, TestKind::RandomAccess, 4096);
        assert!(matches!(result, Err(IoProbeError::SetupError(_))));
        assert!(registry.is_empty());
    }
}
