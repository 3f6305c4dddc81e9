//! Configuration management module
//!
//! Handles loading, saving, and validation of benchmark configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{IoProbeError, Result, APP_NAME, CONFIG_FILE, KIB, MIB};

/// Default random-access run length per measurement
pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);
/// Default sequential block size
pub const DEFAULT_SEQUENTIAL_BLOCK_SIZE: u64 = MIB;
/// Default worker count for the concurrent measurement
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

const MIN_DURATION: Duration = Duration::from_secs(1);
const MAX_DURATION: Duration = Duration::from_secs(3600);
const MIN_BLOCK_SIZE: u64 = 4 * KIB;
const MAX_BLOCK_SIZE: u64 = 64 * MIB;
const MAX_QUEUE_DEPTH: usize = 64;

/// Benchmark configuration structure containing all test parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Run length of each random-access measurement
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Flush to stable storage after every random write
    pub sync_per_write: bool,
    /// Replaces the per-device base size when set
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "size_serde::option"
    )]
    pub size_override: Option<u64>,
    /// Block size for the sequential throughput test
    #[serde(with = "size_serde")]
    pub sequential_block_size: u64,
    /// Worker count for the concurrent random-access measurement
    pub queue_depth: usize,
    pub run_sequential: bool,
    pub run_random: bool,
    /// Whether to keep test files after testing
    pub keep_temp_files: bool,
    /// Print the JSON report after the summary
    pub json_output: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            sync_per_write: false,
            size_override: None,
            sequential_block_size: DEFAULT_SEQUENTIAL_BLOCK_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            run_sequential: true,
            run_random: true,
            keep_temp_files: false,
            json_output: false,
        }
    }
}

impl BenchmarkConfig {
    /// Create a new benchmark configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.duration < MIN_DURATION || self.duration > MAX_DURATION {
            return Err(IoProbeError::ConfigError(format!(
                "Duration must be between {}s and {}s, got {}",
                MIN_DURATION.as_secs(),
                MAX_DURATION.as_secs(),
                humantime::format_duration(self.duration)
            )));
        }

        if !self.sequential_block_size.is_power_of_two() {
            return Err(IoProbeError::ConfigError(
                "Sequential block size must be a power of 2".to_string(),
            ));
        }

        if self.sequential_block_size < MIN_BLOCK_SIZE
            || self.sequential_block_size > MAX_BLOCK_SIZE
        {
            return Err(IoProbeError::ConfigError(format!(
                "Sequential block size must be between {} and {} bytes",
                MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            )));
        }

        if self.queue_depth == 0 || self.queue_depth > MAX_QUEUE_DEPTH {
            return Err(IoProbeError::ConfigError(format!(
                "Queue depth must be between 1 and {}, got {}",
                MAX_QUEUE_DEPTH, self.queue_depth
            )));
        }

        if self.size_override == Some(0) {
            return Err(IoProbeError::ConfigError(
                "Size override must be greater than 0".to_string(),
            ));
        }

        if !self.run_sequential && !self.run_random {
            return Err(IoProbeError::ConfigError(
                "At least one of run_sequential and run_random must be enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Set the random-access run length
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_sync_per_write(mut self, sync: bool) -> Self {
        self.sync_per_write = sync;
        self
    }

    /// Set an explicit test file size
    pub fn with_size_override(mut self, size: Option<u64>) -> Self {
        self.size_override = size;
        self
    }

    pub fn with_sequential_block_size(mut self, size: u64) -> Self {
        self.sequential_block_size = size;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Choose which tests run
    pub fn with_tests(mut self, sequential: bool, random: bool) -> Self {
        self.run_sequential = sequential;
        self.run_random = random;
        self
    }

    /// Set whether to keep temporary files
    pub fn with_keep_temp_files(mut self, keep: bool) -> Self {
        self.keep_temp_files = keep;
        self
    }

    pub fn with_json_output(mut self, json: bool) -> Self {
        self.json_output = json;
        self
    }

    /// Load configuration from the standard config file location
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load configuration from an explicit path, defaults when absent
    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| {
            IoProbeError::ConfigError(format!(
                "Failed to read config file {}: {}",
                config_path.display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            IoProbeError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                config_path.display(),
                e
            ))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to the standard config file location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                IoProbeError::ConfigError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(config_path, content).map_err(|e| {
            IoProbeError::ConfigError(format!(
                "Failed to write config file {}: {}",
                config_path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/ioprobe/ioprobe.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            IoProbeError::ConfigError("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

// Durations are written as humantime strings such as "10s" or "1m 30s"
mod duration_serde {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(D::Error::custom)
    }
}

// Sizes are written as "256M" style strings; plain integers are accepted too
mod size_serde {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::util::units::parse_size;
    use crate::{GIB, KIB, MIB};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeRepr {
        Bytes(u64),
        Text(String),
    }

    fn to_text(bytes: u64) -> String {
        match bytes {
            0 => "0".to_string(),
            b if b % GIB == 0 => format!("{}G", b / GIB),
            b if b % MIB == 0 => format!("{}M", b / MIB),
            b if b % KIB == 0 => format!("{}K", b / KIB),
            b => b.to_string(),
        }
    }

    fn from_repr<E: Error>(repr: SizeRepr) -> Result<u64, E> {
        match repr {
            SizeRepr::Bytes(bytes) => Ok(bytes),
            SizeRepr::Text(text) => parse_size(&text).map_err(E::custom),
        }
    }

    pub fn serialize<S>(bytes: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_text(*bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        from_repr(SizeRepr::deserialize(deserializer)?)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(bytes: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match bytes {
                Some(bytes) => serializer.serialize_str(&to_text(*bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<SizeRepr>::deserialize(deserializer)?
                .map(from_repr)
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GIB;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = BenchmarkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.duration, Duration::from_secs(10));
        assert_eq!(config.queue_depth, 4);
        assert_eq!(config.sequential_block_size, MIB);
        assert!(config.size_override.is_none());
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        let base = BenchmarkConfig::default();

        assert!(base.clone().with_duration(Duration::from_millis(500)).validate().is_err());
        assert!(base.clone().with_duration(Duration::from_secs(7200)).validate().is_err());
        assert!(base.clone().with_sequential_block_size(3 * MIB).validate().is_err());
        assert!(base.clone().with_sequential_block_size(512).validate().is_err());
        assert!(base.clone().with_sequential_block_size(128 * MIB).validate().is_err());
        assert!(base.clone().with_queue_depth(0).validate().is_err());
        assert!(base.clone().with_queue_depth(65).validate().is_err());
        assert!(base.clone().with_size_override(Some(0)).validate().is_err());
        assert!(base.clone().with_tests(false, false).validate().is_err());

        assert!(base
            .with_duration(Duration::from_secs(1))
            .with_queue_depth(64)
            .with_size_override(Some(MIB))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_toml_uses_human_strings() {
        let config = BenchmarkConfig::default()
            .with_duration(Duration::from_secs(90))
            .with_size_override(Some(GIB));
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("duration = \"1m 30s\""));
        assert!(toml_str.contains("size_override = \"1G\""));
        assert!(toml_str.contains("sequential_block_size = \"1M\""));

        let decoded: BenchmarkConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: BenchmarkConfig = toml::from_str(
            "duration = \"5s\"\nsize_override = \"256M\"\nsequential_block_size = 65536\n",
        )
        .unwrap();
        assert_eq!(config.duration, Duration::from_secs(5));
        assert_eq!(config.size_override, Some(256 * MIB));
        assert_eq!(config.sequential_block_size, 64 * KIB);
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert!(config.run_sequential && config.run_random);

        assert!(toml::from_str::<BenchmarkConfig>("duration = \"soon\"").is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("ioprobe.toml");

        let config = BenchmarkConfig::default()
            .with_sync_per_write(true)
            .with_json_output(true);
        config.save_to(&path).unwrap();

        assert_eq!(BenchmarkConfig::load_from(&path).unwrap(), config);
        assert_eq!(
            BenchmarkConfig::load_from(&temp_dir.path().join("missing.toml")).unwrap(),
            BenchmarkConfig::default()
        );
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("ioprobe.toml");
        fs::write(&path, "queue_depth = 0\n").unwrap();

        assert!(matches!(
            BenchmarkConfig::load_from(&path),
            Err(IoProbeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_config_file_path() {
        if let Ok(path) = BenchmarkConfig::config_file_path() {
            assert!(path.ends_with("ioprobe/ioprobe.toml"));
        }
    }
}
