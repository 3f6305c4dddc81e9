//! Data models module
//!
//! Device classification input and the result records the benchmarks emit.

pub mod device;
pub mod result;

// Re-export commonly used types
pub use device::{DeviceClassification, DeviceType};
pub use result::{
    DeviceReport,
    IopsMeasurement,
    IopsResult,
    LatencyAccumulator,
    ThroughputResult,
};
