//! Benchmark engine module
//!
//! Contains test file sizing, the sequential throughput and random-access
//! IOPS benchmarks, their workers, and the per-device runner.

pub mod random;
pub mod runner;
pub mod sequential;
pub mod sizing;
pub mod worker;

// Re-export commonly used types
pub use random::{RandomBenchmark, IOPS_BLOCK_SIZE};
pub use runner::DeviceRunner;
pub use sequential::{Phase, ProgressUpdate, SequentialBenchmark};
pub use sizing::{base_size_for, bound_to_available_space, resolve_test_size, MIN_TEST_FILE_SIZE};
pub use worker::{OffsetSampler, RandomOp, RandomWorker, WorkerOutcome};
