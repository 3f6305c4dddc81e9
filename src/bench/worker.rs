//! Random-access benchmark workers
//!
//! Each worker owns one file handle, one aligned block buffer, its own
//! offset generator and its own latency totals. Workers only share the
//! deadline they poll between operations.

use std::io;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, warn};

use crate::io::{AlignedBuffer, DirectFile};
use crate::models::LatencyAccumulator;
use crate::{IoProbeError, Result};

/// Operation a worker repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomOp {
    Read,
    Write {
        /// Flush to stable storage after every write
        sync_per_write: bool,
    },
}

impl RandomOp {
    pub fn is_write(&self) -> bool {
        matches!(self, RandomOp::Write { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RandomOp::Read => "read",
            RandomOp::Write { .. } => "write",
        }
    }
}

/// Uniform block-aligned offsets within a file.
///
/// Draws `k` in `[0, positions)` from a ChaCha-based generator seeded from
/// the OS and returns `k * block_size`.
#[derive(Debug)]
pub struct OffsetSampler {
    rng: StdRng,
    positions: u64,
    block_size: u64,
}

impl OffsetSampler {
    /// Fails when the file holds less than one whole block
    pub fn new(file_size: u64, block_size: u64) -> Result<Self> {
        let positions = if block_size == 0 { 0 } else { file_size / block_size };
        if positions == 0 {
            return Err(IoProbeError::SetupError(format!(
                "Test file of {} bytes holds no {}-byte block",
                file_size, block_size
            )));
        }
        Ok(Self {
            rng: StdRng::from_entropy(),
            positions,
            block_size,
        })
    }

    /// Number of distinct block positions
    pub fn positions(&self) -> u64 {
        self.positions
    }

    pub fn next_offset(&mut self) -> u64 {
        self.rng.gen_range(0..self.positions) * self.block_size
    }
}

/// What a worker reports once its deadline passes or it hits an I/O error
#[derive(Debug)]
pub struct WorkerOutcome {
    pub id: usize,
    pub latency: LatencyAccumulator,
    pub bypass_achieved: bool,
    /// The error that stopped the worker early, if any
    pub error: Option<io::Error>,
}

/// One deadline-polled random I/O loop
pub struct RandomWorker {
    id: usize,
    handle: Box<dyn DirectFile>,
    buffer: AlignedBuffer,
    sampler: OffsetSampler,
    op: RandomOp,
}

impl RandomWorker {
    /// Build an idle worker. Write workers get a block of random data.
    pub fn new(
        id: usize,
        handle: Box<dyn DirectFile>,
        mut buffer: AlignedBuffer,
        sampler: OffsetSampler,
        op: RandomOp,
    ) -> Self {
        if op.is_write() {
            StdRng::from_entropy().fill_bytes(&mut buffer);
        }
        Self {
            id,
            handle,
            buffer,
            sampler,
            op,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Repeat the operation until `deadline`, then report totals.
    ///
    /// An I/O error ends the loop early; operations completed before it
    /// are kept and the failed one is not counted.
    pub fn run_until(mut self, deadline: Instant) -> WorkerOutcome {
        let mut latency = LatencyAccumulator::new();
        let mut error = None;

        while Instant::now() < deadline {
            let offset = self.sampler.next_offset();
            let started = Instant::now();
            if let Err(err) = self.issue(offset) {
                warn!(
                    worker = self.id,
                    op = self.op.name(),
                    offset,
                    error = %err,
                    "worker stopped on I/O error"
                );
                error = Some(err);
                break;
            }
            latency.record(started.elapsed());
        }

        debug!(worker = self.id, op = self.op.name(), ops = latency.ops(), "worker done");

        WorkerOutcome {
            id: self.id,
            latency,
            bypass_achieved: self.handle.bypass_achieved(),
            error,
        }
    }

    fn issue(&mut self, offset: u64) -> io::Result<()> {
        let len = self.buffer.len();
        let transferred = match self.op {
            RandomOp::Read => self.handle.read_at(&mut self.buffer, offset)?,
            RandomOp::Write { sync_per_write } => {
                let n = self.handle.write_at(&self.buffer, offset)?;
                if sync_per_write {
                    self.handle.sync_all()?;
                }
                n
            }
        };

        if transferred < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short {} of {} bytes at offset {}", self.op.name(), transferred, offset),
            ));
        }
        Ok(())
    }
}

/// Fold finished workers into one total plus per-worker op counts,
/// indexed by worker id within `slots`
pub fn fold_outcomes(outcomes: &[WorkerOutcome], slots: usize) -> (LatencyAccumulator, Vec<u64>) {
    let mut worker_ops = vec![0u64; slots];
    let mut total = LatencyAccumulator::new();
    for outcome in outcomes {
        total.merge(&outcome.latency);
        if let Some(slot) = worker_ops.get_mut(outcome.id) {
            *slot = outcome.latency.ops();
        }
    }
    (total, worker_ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{create_fixed_size_file, DiskIO, PlatformDiskIO};
    use std::io::SeekFrom;
    use std::time::Duration;
    use tempfile::tempdir;

    const BLOCK: u64 = 4096;

    /// Handle that serves `budget` operations and then fails
    struct FlakyFile {
        budget: usize,
    }

    impl DirectFile for FlakyFile {
        fn write_direct(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "device went away"));
            }
            self.budget -= 1;
            Ok(buf.len())
        }

        fn read_direct(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "device went away"));
            }
            self.budget -= 1;
            Ok(buf.len())
        }

        fn seek_direct(&mut self, pos: SeekFrom) -> io::Result<u64> {
            match pos {
                SeekFrom::Start(offset) => Ok(offset),
                _ => Ok(0),
            }
        }

        fn sync_all(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn file_size(&self) -> io::Result<u64> {
            Ok(1024 * BLOCK)
        }

        fn bypass_achieved(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_offsets_are_aligned_and_in_range() {
        let cases = [
            (BLOCK, BLOCK),
            (1000 * BLOCK + 123, BLOCK),
            (3 * BLOCK + BLOCK - 1, BLOCK),
            (64 * 1024 * 1024 + 512, 512),
            ((1u64 << 33) * BLOCK + 77, BLOCK),
        ];

        for (file_size, block_size) in cases {
            let mut sampler = OffsetSampler::new(file_size, block_size).unwrap();
            assert_eq!(sampler.positions(), file_size / block_size);

            let mut beyond_u32 = false;
            for _ in 0..10_000 {
                let offset = sampler.next_offset();
                assert_eq!(offset % block_size, 0, "size {} block {}", file_size, block_size);
                assert!(
                    offset + block_size <= file_size,
                    "size {} block {}",
                    file_size,
                    block_size
                );
                beyond_u32 |= offset / block_size > u32::MAX as u64;
            }
            if sampler.positions() > 1u64 << 32 {
                assert!(beyond_u32, "offsets never left the first 2^32 blocks");
            }
        }
    }

    #[test]
    fn test_single_position_always_yields_zero() {
        let mut sampler = OffsetSampler::new(BLOCK, BLOCK).unwrap();
        assert!((0..100).all(|_| sampler.next_offset() == 0));
    }

    #[test]
    fn test_file_smaller_than_block_is_rejected() {
        assert!(matches!(
            OffsetSampler::new(BLOCK - 1, BLOCK),
            Err(IoProbeError::SetupError(_))
        ));
    }

    #[test]
    fn test_worker_stops_on_error_and_keeps_completed_ops() {
        let disk_io = PlatformDiskIO::new();
        let worker = RandomWorker::new(
            0,
            Box::new(FlakyFile { budget: 7 }),
            disk_io.aligned_buffer(BLOCK as usize).unwrap(),
            OffsetSampler::new(1024 * BLOCK, BLOCK).unwrap(),
            RandomOp::Read,
        );
        assert_eq!(worker.id(), 0);

        let outcome = worker.run_until(Instant::now() + Duration::from_secs(30));
        assert_eq!(outcome.latency.ops(), 7);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_worker_runs_against_real_file_until_deadline() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("iops.dat");
        create_fixed_size_file(&path, 256 * BLOCK).unwrap();
        let disk_io = PlatformDiskIO::new();

        for op in [RandomOp::Write { sync_per_write: false }, RandomOp::Read] {
            let handle = match op {
                RandomOp::Read => disk_io.open_direct_read(&path).unwrap(),
                RandomOp::Write { .. } => disk_io.open_direct_read_write(&path).unwrap(),
            };
            let worker = RandomWorker::new(
                3,
                handle,
                disk_io.aligned_buffer(BLOCK as usize).unwrap(),
                OffsetSampler::new(256 * BLOCK, BLOCK).unwrap(),
                op,
            );

            let started = Instant::now();
            let outcome = worker.run_until(started + Duration::from_millis(100));
            assert!(started.elapsed() >= Duration::from_millis(100));
            assert_eq!(outcome.id, 3);
            assert!(outcome.error.is_none(), "{:?}", outcome.error);
            assert!(outcome.latency.ops() > 0);
        }

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 256 * BLOCK);
    }

    #[test]
    fn test_expired_deadline_does_no_work() {
        let disk_io = PlatformDiskIO::new();
        let worker = RandomWorker::new(
            0,
            Box::new(FlakyFile { budget: 0 }),
            disk_io.aligned_buffer(BLOCK as usize).unwrap(),
            OffsetSampler::new(1024 * BLOCK, BLOCK).unwrap(),
            RandomOp::Write { sync_per_write: true },
        );
        let outcome = worker.run_until(Instant::now());
        assert_eq!(outcome.latency.ops(), 0);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_fold_outcomes_places_counts_by_id() {
        let mut a = LatencyAccumulator::new();
        a.record(Duration::from_micros(10));
        a.record(Duration::from_micros(30));
        let mut b = LatencyAccumulator::new();
        b.record(Duration::from_micros(50));

        let outcomes = vec![
            WorkerOutcome { id: 2, latency: b, bypass_achieved: true, error: None },
            WorkerOutcome { id: 0, latency: a, bypass_achieved: true, error: None },
        ];
        let (total, worker_ops) = fold_outcomes(&outcomes, 3);
        assert_eq!(worker_ops, vec![2, 0, 1]);
        assert_eq!(total.ops(), 3);
        assert_eq!(total.total_latency_ns(), 90_000);
    }
}
