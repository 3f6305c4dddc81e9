//! Utility functions module
//!
//! Contains helper functions for size parsing and for formatting
//! throughput, IOPS and latency figures.

pub mod units;

// Re-export commonly used functions
pub use units::{
    format_bytes, parse_size,
    calculate_throughput_mbps, calculate_iops,
    format_throughput, format_iops, format_latency_us,
};
