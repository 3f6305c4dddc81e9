//! Units formatting and conversion utilities
//!
//! Provides functions for human-readable formatting of sizes, durations,
//! and performance metrics like throughput and IOPS.

use std::time::Duration;

const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Format bytes into human-readable size with appropriate units
///
/// # Examples
/// ```
/// use ioprobe::util::units::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// assert_eq!(format_bytes(1048576), "1.0 MiB");
/// assert_eq!(format_bytes(1073741824), "1.0 GiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Parse a human-readable size string into bytes
///
/// Single-letter suffixes (`K`, `M`, `G`, `T`) and the `KiB` family are
/// binary; `KB`, `MB`, `GB` and `TB` are decimal. A bare number is bytes.
///
/// # Examples
/// ```
/// use ioprobe::util::units::parse_size;
///
/// assert_eq!(parse_size("256M").unwrap(), 268435456);
/// assert_eq!(parse_size("1.5 GiB").unwrap(), 1610612736);
/// assert_eq!(parse_size("2 GB").unwrap(), 2000000000);
/// ```
pub fn parse_size(input: &str) -> Result<u64, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Size is empty".to_string());
    }

    let (number_part, unit_part) = if let Some(space_pos) = input.rfind(' ') {
        (input[..space_pos].trim(), &input[space_pos + 1..])
    } else {
        let split_pos = input
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| i)
            .unwrap_or(input.len());
        (&input[..split_pos], &input[split_pos..])
    };

    let number: f64 = number_part
        .parse()
        .map_err(|_| format!("Invalid number: {}", number_part))?;

    if number < 0.0 || !number.is_finite() {
        return Err("Size must be a non-negative number".to_string());
    }

    let multiplier = match unit_part.to_uppercase().as_str() {
        "" | "B" => 1u64,
        "KB" => 1_000u64,
        "MB" => 1_000_000u64,
        "GB" => 1_000_000_000u64,
        "TB" => 1_000_000_000_000u64,
        "K" | "KIB" => 1_024u64,
        "M" | "MIB" => 1_048_576u64,
        "G" | "GIB" => 1_073_741_824u64,
        "T" | "TIB" => 1_099_511_627_776u64,
        _ => return Err(format!("Unknown unit: {}", unit_part)),
    };

    Ok((number * multiplier as f64) as u64)
}

/// Throughput in MiB/s; zero bytes or zero time gives exactly 0
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use ioprobe::util::units::calculate_throughput_mbps;
///
/// let throughput = calculate_throughput_mbps(1048576, Duration::from_secs(1));
/// assert!((throughput - 1.0).abs() < 0.01);
/// ```
pub fn calculate_throughput_mbps(bytes: u64, duration: Duration) -> f64 {
    if duration.is_zero() || bytes == 0 {
        return 0.0;
    }

    bytes as f64 / BYTES_PER_MIB / duration.as_secs_f64()
}

/// Calculate IOPS (Input/Output Operations Per Second)
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use ioprobe::util::units::calculate_iops;
///
/// let iops = calculate_iops(1000, Duration::from_secs(1));
/// assert!((iops - 1000.0).abs() < 0.01);
/// ```
pub fn calculate_iops(operations: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }

    operations as f64 / duration.as_secs_f64()
}

/// Format throughput value with appropriate units
///
/// # Examples
/// ```
/// use ioprobe::util::units::format_throughput;
///
/// assert_eq!(format_throughput(1024.0), "1.0 GiB/s");
/// assert_eq!(format_throughput(1.5), "1.5 MiB/s");
/// ```
pub fn format_throughput(mbps: f64) -> String {
    if mbps >= 1024.0 {
        format!("{:.1} GiB/s", mbps / 1024.0)
    } else if mbps >= 1.0 {
        format!("{:.1} MiB/s", mbps)
    } else if mbps >= 0.001 {
        format!("{:.1} KiB/s", mbps * 1024.0)
    } else {
        format!("{:.3} MiB/s", mbps)
    }
}

/// Format IOPS value with appropriate units
///
/// # Examples
/// ```
/// use ioprobe::util::units::format_iops;
///
/// assert_eq!(format_iops(1500.0), "1.5K IOPS");
/// assert_eq!(format_iops(2500000.0), "2.5M IOPS");
/// ```
pub fn format_iops(iops: f64) -> String {
    if iops >= 1_000_000.0 {
        format!("{:.1}M IOPS", iops / 1_000_000.0)
    } else if iops >= 1_000.0 {
        format!("{:.1}K IOPS", iops / 1_000.0)
    } else {
        format!("{:.0} IOPS", iops)
    }
}

/// Format an average latency given in microseconds
///
/// # Examples
/// ```
/// use ioprobe::util::units::format_latency_us;
///
/// assert_eq!(format_latency_us(5000.0), "5.00ms");
/// assert_eq!(format_latency_us(85.4), "85.4μs");
/// ```
pub fn format_latency_us(micros: f64) -> String {
    if micros >= 1000.0 {
        format!("{:.2}ms", micros / 1000.0)
    } else {
        format!("{:.1}μs", micros)
    }
}
