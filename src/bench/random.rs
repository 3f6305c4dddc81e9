//! Random-access IOPS benchmark
//!
//! Small-block random writes and reads at queue depth 1 and at a
//! configurable depth N, each for a fixed duration. Every worker runs on
//! its own blocking thread with a dedicated handle.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::worker::{fold_outcomes, OffsetSampler, RandomOp, RandomWorker};
use crate::config::{DEFAULT_DURATION, DEFAULT_QUEUE_DEPTH};
use crate::io::{DiskIO, PlatformDiskIO};
use crate::models::{IopsMeasurement, IopsResult};
use crate::util::units::{format_iops, format_latency_us};
use crate::{IoProbeError, Result};

/// Block size of every random operation
pub const IOPS_BLOCK_SIZE: u64 = 4096;

/// Random-access benchmark executor
pub struct RandomBenchmark<D: DiskIO = PlatformDiskIO> {
    disk_io: Arc<D>,
    duration: Duration,
    queue_depth: usize,
    sync_per_write: bool,
}

impl<D: DiskIO + 'static> RandomBenchmark<D> {
    pub fn new(disk_io: Arc<D>) -> Self {
        Self {
            disk_io,
            duration: DEFAULT_DURATION,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            sync_per_write: false,
        }
    }

    /// Run length of each measurement
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Worker count of the concurrent measurement
    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth.max(1);
        self
    }

    pub fn with_sync_per_write(mut self, sync: bool) -> Self {
        self.sync_per_write = sync;
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Run write then read at QD1, then write then read at the configured
    /// depth, against an existing file of `file_size` bytes. A configured
    /// depth of 1 yields a single result.
    pub async fn run(&self, path: &Path, file_size: u64) -> Result<Vec<IopsResult>> {
        let write = RandomOp::Write {
            sync_per_write: self.sync_per_write,
        };

        let mut depths = vec![1];
        if self.queue_depth > 1 {
            depths.push(self.queue_depth);
        }

        let mut results = Vec::with_capacity(depths.len());
        for depth in depths {
            let write_measurement = self.measure(path, file_size, write, depth).await?;
            let read_measurement = self.measure(path, file_size, RandomOp::Read, depth).await?;
            let result = IopsResult::new(
                depth,
                IOPS_BLOCK_SIZE,
                self.duration,
                write_measurement,
                read_measurement,
            );
            info!(
                label = %result.label,
                write_iops = %format_iops(result.write.iops),
                read_iops = %format_iops(result.read.iops),
                write_latency = %format_latency_us(result.write.avg_latency_us),
                read_latency = %format_latency_us(result.read.avg_latency_us),
                "random access measurement complete"
            );
            results.push(result);
        }

        Ok(results)
    }

    /// One timed measurement with `queue_depth` concurrent workers.
    ///
    /// Handles are opened before the deadline is fixed. A worker whose
    /// handle fails to open contributes zero operations.
    pub async fn measure(
        &self,
        path: &Path,
        file_size: u64,
        op: RandomOp,
        queue_depth: usize,
    ) -> Result<IopsMeasurement> {
        let mut workers = Vec::with_capacity(queue_depth);
        for id in 0..queue_depth {
            let opened = match op {
                RandomOp::Read => self.disk_io.open_direct_read(path),
                RandomOp::Write { .. } => self.disk_io.open_direct_read_write(path),
            };
            let handle = match opened {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(
                        worker = id,
                        op = op.name(),
                        path = %path.display(),
                        error = %err,
                        "worker failed to open test file"
                    );
                    continue;
                }
            };
            let buffer = self.disk_io.aligned_buffer(IOPS_BLOCK_SIZE as usize)?;
            let sampler = OffsetSampler::new(file_size, IOPS_BLOCK_SIZE)?;
            workers.push(RandomWorker::new(id, handle, buffer, sampler, op));
        }

        let deadline = Instant::now() + self.duration;
        let tasks: Vec<_> = workers
            .into_iter()
            .map(|worker| tokio::task::spawn_blocking(move || worker.run_until(deadline)))
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let outcome = task.await.map_err(|e| {
                IoProbeError::WorkerError(format!("Random {} worker failed: {}", op.name(), e))
            })?;
            outcomes.push(outcome);
        }

        let bypass_achieved =
            !outcomes.is_empty() && outcomes.iter().all(|outcome| outcome.bypass_achieved);
        let (total, worker_ops) = fold_outcomes(&outcomes, queue_depth);

        Ok(IopsMeasurement::from_totals(
            &total,
            self.duration,
            worker_ops,
            bypass_achieved,
        ))
    }
}

impl<D: DiskIO> Clone for RandomBenchmark<D> {
    fn clone(&self) -> Self {
        Self {
            disk_io: Arc::clone(&self.disk_io),
            duration: self.duration,
            queue_depth: self.queue_depth,
            sync_per_write: self.sync_per_write,
        }
    }
}
