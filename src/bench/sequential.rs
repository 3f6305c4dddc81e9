//! Sequential throughput benchmark
//!
//! Writes the test file front to back in fixed blocks, flushes it, drops
//! the OS caches and reads it back, timing each phase as a whole. Progress
//! can be streamed over a tokio channel while the phases run.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_SEQUENTIAL_BLOCK_SIZE;
use crate::io::{DirectFile, DiskIO, PlatformDiskIO};
use crate::models::ThroughputResult;
use crate::util::units::{calculate_throughput_mbps, format_throughput};
use crate::{IoProbeError, Result};

/// Minimum spacing between progress updates
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Sequential test phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Write,
    Read,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Write => f.write_str("Sequential Write"),
            Phase::Read => f.write_str("Sequential Read"),
        }
    }
}

/// Progress update sent during benchmark execution
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub phase: Phase,
    /// Bytes processed so far in this phase
    pub bytes_processed: u64,
    /// Total bytes this phase targets
    pub total_bytes: u64,
    /// Running throughput in MiB/s
    pub throughput_mbps: f64,
    /// Elapsed time since the phase started
    pub elapsed: Duration,
}

impl ProgressUpdate {
    /// Calculate completion percentage (0.0 to 1.0)
    pub fn completion_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.bytes_processed as f64 / self.total_bytes as f64).min(1.0)
        }
    }
}

/// Throttled, non-blocking progress sink
struct ProgressReporter<'a> {
    tx: Option<&'a mpsc::Sender<ProgressUpdate>>,
    phase: Phase,
    total_bytes: u64,
    started: Instant,
    last_sent: Instant,
}

impl<'a> ProgressReporter<'a> {
    fn new(tx: Option<&'a mpsc::Sender<ProgressUpdate>>, phase: Phase, total_bytes: u64) -> Self {
        let now = Instant::now();
        Self {
            tx,
            phase,
            total_bytes,
            started: now,
            last_sent: now,
        }
    }

    fn tick(&mut self, bytes_processed: u64) {
        if self.tx.is_some() && self.last_sent.elapsed() >= PROGRESS_INTERVAL {
            self.send(bytes_processed);
            self.last_sent = Instant::now();
        }
    }

    fn finish(&mut self, bytes_processed: u64) {
        self.send(bytes_processed);
    }

    fn send(&self, bytes_processed: u64) {
        if let Some(tx) = self.tx {
            let elapsed = self.started.elapsed();
            // a full or closed channel drops the update
            let _ = tx.try_send(ProgressUpdate {
                phase: self.phase,
                bytes_processed,
                total_bytes: self.total_bytes,
                throughput_mbps: calculate_throughput_mbps(bytes_processed, elapsed),
                elapsed,
            });
        }
    }
}

/// Bytes moved by one phase and how long it took
struct PhaseOutcome {
    bytes: u64,
    elapsed: Duration,
    bypass: bool,
}

impl PhaseOutcome {
    fn empty() -> Self {
        Self {
            bytes: 0,
            elapsed: Duration::ZERO,
            bypass: false,
        }
    }
}

/// Sequential benchmark executor
pub struct SequentialBenchmark<D: DiskIO = PlatformDiskIO> {
    disk_io: Arc<D>,
    size: u64,
    block_size: u64,
}

impl<D: DiskIO + 'static> SequentialBenchmark<D> {
    /// Benchmark of `size` bytes using the default 1 MiB block
    pub fn new(disk_io: Arc<D>, size: u64) -> Self {
        Self {
            disk_io,
            size,
            block_size: DEFAULT_SEQUENTIAL_BLOCK_SIZE,
        }
    }

    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Bytes each phase targets: the size rounded down to whole blocks,
    /// never less than one block
    pub fn target_bytes(&self) -> u64 {
        (self.size / self.block_size).max(1) * self.block_size
    }

    /// Run both phases on a blocking thread
    pub async fn run(
        &self,
        path: PathBuf,
        progress: Option<mpsc::Sender<ProgressUpdate>>,
    ) -> Result<ThroughputResult> {
        let bench = self.clone();
        tokio::task::spawn_blocking(move || bench.run_blocking(&path, progress.as_ref()))
            .await
            .map_err(|e| {
                IoProbeError::WorkerError(format!("Sequential benchmark task failed: {}", e))
            })?
    }

    /// Write `path` front to back, drop caches, then read it back.
    ///
    /// Only a failure to open the file for writing is an error; I/O errors
    /// during a phase end that phase early and the rate reflects the bytes
    /// actually moved.
    pub fn run_blocking(
        &self,
        path: &Path,
        progress: Option<&mpsc::Sender<ProgressUpdate>>,
    ) -> Result<ThroughputResult> {
        let target = self.target_bytes();
        info!(
            path = %path.display(),
            size = target,
            block_size = self.block_size,
            "starting sequential throughput test"
        );

        let writer = self.disk_io.open_direct_write(path).map_err(|e| {
            IoProbeError::SetupError(format!(
                "Failed to open {} for writing: {}",
                path.display(),
                e
            ))
        })?;
        let mut block = self.disk_io.aligned_buffer(self.block_size as usize)?;
        StdRng::from_entropy().fill_bytes(&mut block);

        let write = self.write_phase(writer, &block, target, progress);
        let write_mbps = calculate_throughput_mbps(write.bytes, write.elapsed);
        info!(
            bytes = write.bytes,
            throughput = %format_throughput(write_mbps),
            bypass = write.bypass,
            "sequential write complete"
        );

        self.disk_io.drop_caches();

        let read = match self.disk_io.open_direct_read(path) {
            Ok(reader) => self.read_phase(reader, &mut block, target, progress),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not open test file for reading");
                PhaseOutcome::empty()
            }
        };
        let read_mbps = calculate_throughput_mbps(read.bytes, read.elapsed);
        info!(
            bytes = read.bytes,
            throughput = %format_throughput(read_mbps),
            bypass = read.bypass,
            "sequential read complete"
        );

        Ok(ThroughputResult {
            timestamp: Utc::now(),
            test_size: target,
            block_size: self.block_size,
            bytes_written: write.bytes,
            bytes_read: read.bytes,
            write_elapsed: write.elapsed,
            read_elapsed: read.elapsed,
            write_mbps,
            read_mbps,
            write_bypass: write.bypass,
            read_bypass: read.bypass,
        })
    }

    fn write_phase(
        &self,
        mut writer: Box<dyn DirectFile>,
        block: &[u8],
        target: u64,
        progress: Option<&mpsc::Sender<ProgressUpdate>>,
    ) -> PhaseOutcome {
        let mut reporter = ProgressReporter::new(progress, Phase::Write, target);
        let started = Instant::now();
        let mut written = 0u64;

        while written < target {
            match writer.write_direct(block) {
                Ok(0) => {
                    warn!(offset = written, "write returned 0 bytes, ending write phase");
                    break;
                }
                Ok(n) => written += n as u64,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(offset = written, error = %err, "write failed, ending write phase");
                    break;
                }
            }
            reporter.tick(written);
        }

        if written > 0 {
            if let Err(err) = writer.sync_all() {
                warn!(error = %err, "flush after sequential write failed");
            }
        }
        let elapsed = started.elapsed();
        reporter.finish(written);

        PhaseOutcome {
            bytes: written,
            elapsed,
            bypass: writer.bypass_achieved(),
        }
    }

    fn read_phase(
        &self,
        mut reader: Box<dyn DirectFile>,
        block: &mut [u8],
        target: u64,
        progress: Option<&mpsc::Sender<ProgressUpdate>>,
    ) -> PhaseOutcome {
        let mut reporter = ProgressReporter::new(progress, Phase::Read, target);
        let started = Instant::now();
        let mut read = 0u64;

        while read < target {
            match reader.read_direct(block) {
                Ok(0) => {
                    debug!(offset = read, "end of file reached");
                    break;
                }
                Ok(n) => read += n as u64,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(offset = read, error = %err, "read failed, ending read phase");
                    break;
                }
            }
            reporter.tick(read);
        }

        let elapsed = started.elapsed();
        reporter.finish(read);

        PhaseOutcome {
            bytes: read,
            elapsed,
            bypass: reader.bypass_achieved(),
        }
    }
}

impl<D: DiskIO> Clone for SequentialBenchmark<D> {
    fn clone(&self) -> Self {
        Self {
            disk_io: Arc::clone(&self.disk_io),
            size: self.size,
            block_size: self.block_size,
        }
    }
}
