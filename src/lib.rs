//! ioprobe - storage device benchmark engine
//!
//! Measures sequential throughput and random-access IOPS/latency while
//! bypassing the OS page cache wherever the platform allows it.

use std::fmt;

// Public re-exports
pub mod bench;
pub mod config;
pub mod io;
pub mod models;
pub mod util;

// Common error types
#[derive(Debug)]
pub enum IoProbeError {
    /// I/O operation failed
    IoError(std::io::Error),
    /// Configuration validation or parsing error
    ConfigError(String),
    /// Test file could not be created or opened, or the target is unusable
    SetupError(String),
    /// Permission denied for disk operations
    PermissionDenied(String),
    /// Insufficient disk space
    InsufficientSpace(String),
    /// A benchmark worker task could not be joined
    WorkerError(String),
    /// Result or configuration encoding error
    PersistenceError(String),
}

impl fmt::Display for IoProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoProbeError::IoError(err) => write!(f, "I/O error: {}", err),
            IoProbeError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            IoProbeError::SetupError(msg) => write!(f, "Setup error: {}", msg),
            IoProbeError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            IoProbeError::InsufficientSpace(msg) => write!(f, "Insufficient disk space: {}", msg),
            IoProbeError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
            IoProbeError::PersistenceError(msg) => write!(f, "Encoding error: {}", msg),
        }
    }
}

impl std::error::Error for IoProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoProbeError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for IoProbeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                IoProbeError::PermissionDenied(format!("Access denied: {}", err))
            }
            std::io::ErrorKind::StorageFull => {
                IoProbeError::InsufficientSpace(format!("Device full: {}", err))
            }
            _ => IoProbeError::IoError(err),
        }
    }
}

impl From<serde_json::Error> for IoProbeError {
    fn from(err: serde_json::Error) -> Self {
        IoProbeError::PersistenceError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for IoProbeError {
    fn from(err: toml::de::Error) -> Self {
        IoProbeError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for IoProbeError {
    fn from(err: toml::ser::Error) -> Self {
        IoProbeError::ConfigError(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for ioprobe operations
pub type Result<T> = std::result::Result<T, IoProbeError>;

/// Error reporting helpers for the outer surfaces
pub mod error {
    use super::IoProbeError;

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &IoProbeError) -> String {
        match error {
            IoProbeError::PermissionDenied(_) => {
                "Permission denied. Pick a writable directory or check file permissions."
                    .to_string()
            }
            IoProbeError::InsufficientSpace(_) => {
                "Insufficient disk space. Free up space or set a smaller size override."
                    .to_string()
            }
            IoProbeError::SetupError(msg) => {
                format!("Could not prepare the benchmark: {}", msg)
            }
            IoProbeError::ConfigError(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            _ => error.to_string(),
        }
    }

    /// Suggest a way forward for errors the user can act on
    pub fn create_fallback_strategy(error: &IoProbeError) -> Option<String> {
        match error {
            IoProbeError::PermissionDenied(_) => Some(
                "Try a different mount point or run with elevated privileges.".to_string(),
            ),
            IoProbeError::InsufficientSpace(_) => Some(
                "Reduce the size override or select a device with more free space.".to_string(),
            ),
            IoProbeError::SetupError(_) => Some(
                "Make sure the target directory exists and is writable.".to_string(),
            ),
            _ => None,
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "ioprobe";
pub const CONFIG_FILE: &str = "ioprobe.toml";
pub const TEMP_FILE_PREFIX: &str = ".ioprobe_";

pub(crate) const KIB: u64 = 1024;
pub(crate) const MIB: u64 = 1024 * KIB;
pub(crate) const GIB: u64 = 1024 * MIB;
