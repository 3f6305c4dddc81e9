//! Test file sizing policy
//!
//! Picks a per-device base size and bounds it by the free space on the
//! target filesystem.

use std::path::Path;

use tracing::{debug, warn};

use crate::io::space::available_space;
use crate::models::DeviceType;
use crate::{GIB, MIB};

/// Smallest test file the policy will ever choose
pub const MIN_TEST_FILE_SIZE: u64 = 64 * MIB;

/// Base test file size for a device category
pub fn base_size_for(device_type: DeviceType) -> u64 {
    match device_type {
        DeviceType::Nvme => 2 * GIB,
        DeviceType::Ssd => GIB,
        DeviceType::Hdd => 256 * MIB,
        DeviceType::Usb => 128 * MIB,
        DeviceType::Nfs => 256 * MIB,
        DeviceType::Raid => 4 * GIB,
        DeviceType::Unknown => GIB,
    }
}

/// Clamp `requested` to half of `free_bytes`, then raise it to the
/// [`MIN_TEST_FILE_SIZE`] floor.
///
/// The floor wins over the half-free bound when space is very tight.
pub fn bound_to_available_space(requested: u64, free_bytes: u64) -> u64 {
    requested.min(free_bytes / 2).max(MIN_TEST_FILE_SIZE)
}

/// [`bound_to_available_space`] against the filesystem holding `dir`.
///
/// When free space cannot be probed the request is returned unchanged.
pub fn bound_to_path(requested: u64, dir: &Path) -> u64 {
    match available_space(dir) {
        Ok(free) => {
            let bounded = bound_to_available_space(requested, free);
            if bounded != requested {
                debug!(requested, free, bounded, "test size adjusted to free space");
            }
            bounded
        }
        Err(err) => {
            warn!(
                path = %dir.display(),
                error = %err,
                "free space probe failed, keeping requested size"
            );
            requested
        }
    }
}

/// Final test file size for a device: the override when given, else the
/// base size for its type, always bounded by free space in `dir`.
pub fn resolve_test_size(device_type: DeviceType, size_override: Option<u64>, dir: &Path) -> u64 {
    let requested = size_override.unwrap_or_else(|| base_size_for(device_type));
    bound_to_path(requested, dir)
}
