//! Per-device orchestration
//!
//! Sizes the test file, runs the sequential and random-access benchmarks
//! in turn and tears every test file down afterwards. Setup failures stop
//! only the device they belong to.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::random::RandomBenchmark;
use super::sequential::{ProgressUpdate, SequentialBenchmark};
use super::sizing::resolve_test_size;
use crate::config::BenchmarkConfig;
use crate::io::{create_disk_io, CleanupRegistry, DiskIO, PlatformDiskIO, TestFile, TestKind};
use crate::models::{DeviceClassification, DeviceReport};
use crate::util::units::format_bytes;
use crate::{IoProbeError, Result};

/// Runs the configured benchmarks against one or more devices
pub struct DeviceRunner<D: DiskIO = PlatformDiskIO> {
    config: BenchmarkConfig,
    registry: CleanupRegistry,
    disk_io: Arc<D>,
}

impl DeviceRunner<PlatformDiskIO> {
    /// Validate `config` and use the platform's cache-bypassing I/O
    pub fn new(config: BenchmarkConfig, registry: CleanupRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_disk_io(config, registry, Arc::new(create_disk_io())))
    }
}

impl<D: DiskIO + 'static> DeviceRunner<D> {
    pub fn with_disk_io(
        config: BenchmarkConfig,
        registry: CleanupRegistry,
        disk_io: Arc<D>,
    ) -> Self {
        Self {
            config,
            registry,
            disk_io,
        }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Benchmark one device in its mount directory
    pub async fn run_device(
        &self,
        device: &DeviceClassification,
        progress: Option<mpsc::Sender<ProgressUpdate>>,
    ) -> Result<DeviceReport> {
        let dir = device.mount_path.as_path();
        if !dir.is_dir() {
            return Err(IoProbeError::SetupError(format!(
                "Mount path is not an existing directory: {}",
                dir.display()
            )));
        }

        let test_size = resolve_test_size(device.device_type, self.config.size_override, dir);
        info!(
            device = %device.device,
            device_type = %device.device_type,
            size = %format_bytes(test_size),
            "benchmarking device"
        );

        let mut report = DeviceReport::new(device.clone(), test_size);

        if self.config.run_sequential {
            let file = TestFile::reserve(&self.registry, dir, TestKind::Sequential, test_size);
            let bench = SequentialBenchmark::new(Arc::clone(&self.disk_io), test_size)
                .with_block_size(self.config.sequential_block_size);
            let result = bench.run(file.path().to_path_buf(), progress).await;
            self.finish_test_file(file);
            report.throughput = Some(result?);
        }

        if self.config.run_random {
            let file = TestFile::create(&self.registry, dir, TestKind::RandomAccess, test_size)?;
            let bench = RandomBenchmark::new(Arc::clone(&self.disk_io))
                .with_duration(self.config.duration)
                .with_queue_depth(self.config.queue_depth)
                .with_sync_per_write(self.config.sync_per_write);
            let results = bench.run(file.path(), test_size).await;
            self.finish_test_file(file);
            report.iops = results?;
        }

        Ok(report)
    }

    /// Benchmark each device in order. A failed device is logged and
    /// reported in its slot; the rest still run.
    pub async fn run_all(&self, devices: &[DeviceClassification]) -> Vec<Result<DeviceReport>> {
        let mut reports = Vec::with_capacity(devices.len());
        for device in devices {
            let report = self.run_device(device, None).await;
            if let Err(err) = &report {
                error!(device = %device.device, error = %err, "device benchmark failed");
            }
            reports.push(report);
        }
        reports
    }

    fn finish_test_file(&self, mut file: TestFile) {
        if self.config.keep_temp_files {
            info!(path = %file.path().display(), "keeping test file");
            file.keep_on_drop();
            return;
        }
        let path = file.path().to_path_buf();
        if let Err(err) = file.remove() {
            warn!(path = %path.display(), error = %err, "failed to remove test file");
        }
    }
}
