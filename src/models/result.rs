//! Benchmark result data models
//!
//! Contains the value records produced by the throughput and IOPS testers
//! and the running latency totals they are computed from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::device::DeviceClassification;
use crate::util::units::{
    calculate_iops, format_bytes, format_iops, format_latency_us, format_throughput,
};

/// Running operation count and latency sum for one worker.
///
/// Individual samples are never kept, only the totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyAccumulator {
    ops: u64,
    total_latency_ns: u64,
}

impl LatencyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one completed operation
    pub fn record(&mut self, latency: Duration) {
        self.ops += 1;
        self.total_latency_ns = self
            .total_latency_ns
            .saturating_add(latency.as_nanos().min(u64::MAX as u128) as u64);
    }

    /// Fold another worker's totals into this one
    pub fn merge(&mut self, other: &LatencyAccumulator) {
        self.ops += other.ops;
        self.total_latency_ns = self.total_latency_ns.saturating_add(other.total_latency_ns);
    }

    pub fn ops(&self) -> u64 {
        self.ops
    }

    pub fn total_latency_ns(&self) -> u64 {
        self.total_latency_ns
    }

    /// Mean latency in microseconds, zero when nothing completed
    pub fn average_latency_us(&self) -> f64 {
        if self.ops == 0 {
            0.0
        } else {
            self.total_latency_ns as f64 / self.ops as f64 / 1000.0
        }
    }
}

impl FromIterator<LatencyAccumulator> for LatencyAccumulator {
    fn from_iter<I: IntoIterator<Item = LatencyAccumulator>>(iter: I) -> Self {
        let mut total = LatencyAccumulator::default();
        for acc in iter {
            total.merge(&acc);
        }
        total
    }
}

/// Sequential write-then-read throughput
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputResult {
    pub timestamp: DateTime<Utc>,
    /// Bytes each phase targeted
    pub test_size: u64,
    pub block_size: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    #[serde(with = "duration_serde")]
    pub write_elapsed: Duration,
    #[serde(with = "duration_serde")]
    pub read_elapsed: Duration,
    /// Write throughput in MiB/s
    pub write_mbps: f64,
    /// Read throughput in MiB/s
    pub read_mbps: f64,
    pub write_bypass: bool,
    pub read_bypass: bool,
}

impl ThroughputResult {
    /// True when both phases ran with the OS cache bypassed
    pub fn bypass_achieved(&self) -> bool {
        self.write_bypass && self.read_bypass
    }

    /// True when either phase stopped short of the target size
    pub fn is_partial(&self) -> bool {
        self.bytes_written < self.test_size || self.bytes_read < self.test_size
    }

    pub fn summary(&self) -> String {
        format!(
            "Sequential {} ({} blocks): write {}, read {}{}",
            format_bytes(self.test_size),
            format_bytes(self.block_size),
            format_throughput(self.write_mbps),
            format_throughput(self.read_mbps),
            if self.bypass_achieved() { "" } else { " [buffered]" }
        )
    }
}

/// Aggregate of one random-access workload (read or write) at one queue depth
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IopsMeasurement {
    pub iops: f64,
    pub avg_latency_us: f64,
    pub total_ops: u64,
    /// Completed operations per worker, zero for workers that never started
    pub worker_ops: Vec<u64>,
    pub bypass_achieved: bool,
}

impl IopsMeasurement {
    /// Derive rates from folded totals.
    ///
    /// The rate divides by the configured duration, not the measured one,
    /// since every worker targets the same deadline.
    pub fn from_totals(
        total: &LatencyAccumulator,
        configured: Duration,
        worker_ops: Vec<u64>,
        bypass_achieved: bool,
    ) -> Self {
        Self {
            iops: calculate_iops(total.ops(), configured),
            avg_latency_us: total.average_latency_us(),
            total_ops: total.ops(),
            worker_ops,
            bypass_achieved,
        }
    }
}

/// Random read and write results at one queue depth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IopsResult {
    pub timestamp: DateTime<Utc>,
    /// Display label, e.g. "QD1"
    pub label: String,
    pub queue_depth: usize,
    pub block_size: u64,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub write: IopsMeasurement,
    pub read: IopsMeasurement,
}

impl IopsResult {
    pub fn new(
        queue_depth: usize,
        block_size: u64,
        duration: Duration,
        write: IopsMeasurement,
        read: IopsMeasurement,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            label: format!("QD{}", queue_depth),
            queue_depth,
            block_size,
            duration,
            write,
            read,
        }
    }

    pub fn bypass_achieved(&self) -> bool {
        self.write.bypass_achieved && self.read.bypass_achieved
    }

    pub fn summary(&self) -> String {
        format!(
            "Random {} {}: write {} ({} avg), read {} ({} avg){}",
            format_bytes(self.block_size),
            self.label,
            format_iops(self.write.iops),
            format_latency_us(self.write.avg_latency_us),
            format_iops(self.read.iops),
            format_latency_us(self.read.avg_latency_us),
            if self.bypass_achieved() { "" } else { " [buffered]" }
        )
    }
}

/// Everything measured for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub timestamp: DateTime<Utc>,
    pub device: DeviceClassification,
    /// File size chosen by the sizing policy
    pub test_size: u64,
    pub throughput: Option<ThroughputResult>,
    pub iops: Vec<IopsResult>,
}

impl DeviceReport {
    pub fn new(device: DeviceClassification, test_size: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            device,
            test_size,
            throughput: None,
            iops: Vec::new(),
        }
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{} ({}, {}) - test file {}",
            self.device.device,
            self.device.device_type,
            self.device.interface,
            format_bytes(self.test_size)
        )];
        if let Some(throughput) = &self.throughput {
            lines.push(format!("  {}", throughput.summary()));
        }
        for result in &self.iops {
            lines.push(format!("  {}", result.summary()));
        }
        lines.join("\n")
    }
}

// Durations are stored as integer nanoseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_nanos().min(u64::MAX as u128) as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::DeviceType;
    use std::path::PathBuf;

    fn accumulator(latencies_us: &[u64]) -> LatencyAccumulator {
        let mut acc = LatencyAccumulator::new();
        for &us in latencies_us {
            acc.record(Duration::from_micros(us));
        }
        acc
    }

    #[test]
    fn test_accumulator_record_and_average() {
        let acc = accumulator(&[100, 200, 300]);
        assert_eq!(acc.ops(), 3);
        assert_eq!(acc.total_latency_ns(), 600_000);
        assert!((acc.average_latency_us() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_accumulator_reports_zero_latency() {
        let acc = LatencyAccumulator::new();
        assert_eq!(acc.ops(), 0);
        assert_eq!(acc.average_latency_us(), 0.0);
    }

    #[test]
    fn test_fold_is_exact_sum_and_average_within_worker_bounds() {
        let workers = [
            accumulator(&[50, 60, 70, 80]),
            accumulator(&[400]),
            accumulator(&[120, 130]),
            LatencyAccumulator::new(),
        ];

        let total: LatencyAccumulator = workers.iter().copied().collect();
        let expected_ops: u64 = workers.iter().map(|w| w.ops()).sum();
        assert_eq!(total.ops(), expected_ops);

        let averages: Vec<f64> = workers
            .iter()
            .filter(|w| w.ops() > 0)
            .map(|w| w.average_latency_us())
            .collect();
        let min = averages.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = averages.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let avg = total.average_latency_us();
        assert!(avg >= min && avg <= max, "{} not in [{}, {}]", avg, min, max);
    }

    #[test]
    fn test_iops_uses_configured_duration() {
        let acc = accumulator(&[10; 500]);
        let measurement =
            IopsMeasurement::from_totals(&acc, Duration::from_secs(10), vec![500], true);
        assert!((measurement.iops - 50.0).abs() < 1e-9);
        assert!((measurement.avg_latency_us - 10.0).abs() < 1e-9);
        assert_eq!(measurement.total_ops, 500);
    }

    #[test]
    fn test_iops_with_no_ops() {
        let measurement = IopsMeasurement::from_totals(
            &LatencyAccumulator::new(),
            Duration::from_secs(10),
            vec![0, 0],
            false,
        );
        assert_eq!(measurement.iops, 0.0);
        assert_eq!(measurement.avg_latency_us, 0.0);
    }

    #[test]
    fn test_iops_result_label_and_bypass() {
        let write = IopsMeasurement {
            bypass_achieved: true,
            ..Default::default()
        };
        let read = IopsMeasurement::default();
        let result = IopsResult::new(4, 4096, Duration::from_secs(10), write, read);
        assert_eq!(result.label, "QD4");
        assert!(!result.bypass_achieved());
        assert!(result.summary().contains("[buffered]"));
    }

    #[test]
    fn test_throughput_partial_detection() {
        let result = ThroughputResult {
            timestamp: Utc::now(),
            test_size: 4096,
            block_size: 4096,
            bytes_written: 4096,
            bytes_read: 0,
            write_elapsed: Duration::from_millis(1),
            read_elapsed: Duration::ZERO,
            write_mbps: 3.9,
            read_mbps: 0.0,
            write_bypass: true,
            read_bypass: true,
        };
        assert!(result.is_partial());
        assert!(result.bypass_achieved());
    }

    #[test]
    fn test_device_report_json() {
        let device =
            DeviceClassification::new("/dev/nvme0n1", DeviceType::Nvme, PathBuf::from("/"));
        let mut report = DeviceReport::new(device, 2 * 1024 * 1024 * 1024);
        report.iops.push(IopsResult::new(
            1,
            4096,
            Duration::from_secs(10),
            IopsMeasurement::default(),
            IopsMeasurement::default(),
        ));

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"device_type\":\"nvme\""));
        let decoded: DeviceReport = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.iops[0].duration, Duration::from_secs(10));
        assert_eq!(decoded.device, report.device);

        let summary = report.summary();
        assert!(summary.contains("/dev/nvme0n1"));
        assert!(summary.contains("QD1"));
    }
}
