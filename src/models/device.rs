//! Device classification supplied by the discovery side

use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Storage device category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Nvme,
    Ssd,
    Hdd,
    Usb,
    Nfs,
    Raid,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Nvme => "nvme",
            DeviceType::Ssd => "ssd",
            DeviceType::Hdd => "hdd",
            DeviceType::Usb => "usb",
            DeviceType::Nfs => "nfs",
            DeviceType::Raid => "raid",
            DeviceType::Unknown => "unknown",
        }
    }

    /// Best guess from a device path or mount source such as `/dev/nvme0n1`
    /// or `server:/export`. Falls back to SSD, the most common case.
    pub fn guess(device: &str) -> Self {
        let device = device.to_lowercase();
        if device.contains("nfs") || device.contains(':') {
            DeviceType::Nfs
        } else if device.contains("nvme") {
            DeviceType::Nvme
        } else if device.contains("usb") {
            DeviceType::Usb
        } else {
            DeviceType::Ssd
        }
    }
}

impl FromStr for DeviceType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "nvme" => DeviceType::Nvme,
            "ssd" => DeviceType::Ssd,
            "hdd" => DeviceType::Hdd,
            "usb" => DeviceType::Usb,
            "nfs" => DeviceType::Nfs,
            "raid" => DeviceType::Raid,
            _ => DeviceType::Unknown,
        })
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One target device as classified by the discovery collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceClassification {
    /// Device identity, e.g. `/dev/sda` or `server:/export`
    pub device: String,
    pub device_type: DeviceType,
    /// Interface label such as `SATA` or `PCIe/NVMe`
    pub interface: String,
    pub capacity_bytes: u64,
    /// Directory the benchmark files are written to
    pub mount_path: PathBuf,
}

impl DeviceClassification {
    pub fn new(device: impl Into<String>, device_type: DeviceType, mount_path: PathBuf) -> Self {
        Self {
            device: device.into(),
            device_type,
            interface: "Unknown".to_string(),
            capacity_bytes: 0,
            mount_path,
        }
    }

    /// Classification for a bare directory with nothing known about the device
    pub fn for_path(mount_path: PathBuf) -> Self {
        let device = mount_path.display().to_string();
        Self::new(device, DeviceType::Unknown, mount_path)
    }

    /// Classify the device holding `mount_path` from its mount source.
    ///
    /// Pseudo filesystems and platforms without a readable mount table fall
    /// back to guessing from the path itself.
    pub fn detect(mount_path: PathBuf) -> Self {
        let resolved = std::fs::canonicalize(&mount_path).unwrap_or_else(|_| mount_path.clone());
        let device = read_mount_table()
            .and_then(|mounts| mount_source_for(&mounts, &resolved))
            .filter(|source| source.starts_with('/') || source.contains(':'))
            .unwrap_or_else(|| mount_path.display().to_string());
        let device_type = DeviceType::guess(&device);
        Self::new(device, device_type, mount_path)
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    pub fn with_capacity(mut self, capacity_bytes: u64) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }
}

#[cfg(target_os = "linux")]
fn read_mount_table() -> Option<String> {
    std::fs::read_to_string("/proc/self/mounts").ok()
}

#[cfg(not(target_os = "linux"))]
fn read_mount_table() -> Option<String> {
    None
}

/// Source of the deepest mount point containing `path`, read from a
/// `/proc/mounts`-style table. Later entries win on the same mount point.
fn mount_source_for(mounts: &str, path: &Path) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;
    for line in mounts.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let mount_point = PathBuf::from(unescape_mount_field(parts[1]));
        if !path.starts_with(&mount_point) {
            continue;
        }
        let depth = mount_point.components().count();
        if best.map_or(true, |(best_depth, _)| depth >= best_depth) {
            best = Some((depth, parts[0]));
        }
    }
    best.map(|(_, source)| unescape_mount_field(source))
}

/// Undo the octal escapes (`\040` for a space) the kernel writes
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let code = bytes
                .get(i + 1..i + 4)
                .filter(|digits| digits.iter().all(|b| (b'0'..=b'7').contains(b)))
                .map(|digits| digits.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0')));
            if let Some(byte) = code.and_then(|code| u8::try_from(code).ok()) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_type() {
        assert_eq!("nvme".parse::<DeviceType>().unwrap(), DeviceType::Nvme);
        assert_eq!("HDD".parse::<DeviceType>().unwrap(), DeviceType::Hdd);
        assert_eq!(" raid ".parse::<DeviceType>().unwrap(), DeviceType::Raid);
        assert_eq!("floppy".parse::<DeviceType>().unwrap(), DeviceType::Unknown);
    }

    #[test]
    fn test_guess_device_type() {
        assert_eq!(DeviceType::guess("/dev/nvme0n1"), DeviceType::Nvme);
        assert_eq!(DeviceType::guess("fileserver:/export/home"), DeviceType::Nfs);
        assert_eq!(DeviceType::guess("/dev/disk/by-id/usb-SanDisk"), DeviceType::Usb);
        assert_eq!(DeviceType::guess("/dev/sda"), DeviceType::Ssd);
    }

    const MOUNTS: &str = "\
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
tmpfs /tmp tmpfs rw,nosuid 0 0
/dev/sdb1 /mnt/usb\\040stick vfat rw 0 0
fileserver:/export /mnt/nas nfs4 rw 0 0
/dev/sdc1 /mnt/nas/scratch ext4 rw 0 0
";

    #[test]
    fn test_mount_source_uses_deepest_mount_point() {
        let source = |path: &str| mount_source_for(MOUNTS, Path::new(path));
        assert_eq!(source("/home/user").as_deref(), Some("/dev/nvme0n1p2"));
        assert_eq!(source("/mnt/nas/projects").as_deref(), Some("fileserver:/export"));
        assert_eq!(source("/mnt/nas/scratch/run").as_deref(), Some("/dev/sdc1"));
        assert_eq!(source("/mnt/usb stick/bench").as_deref(), Some("/dev/sdb1"));
        // component-wise, not a string prefix
        assert_eq!(source("/mnt/nasty").as_deref(), Some("/dev/nvme0n1p2"));
        assert_eq!(mount_source_for("", Path::new("/data")), None);
    }

    #[test]
    fn test_mount_source_feeds_type_guess() {
        let guess =
            |path: &str| DeviceType::guess(&mount_source_for(MOUNTS, Path::new(path)).unwrap());
        assert_eq!(guess("/var/lib"), DeviceType::Nvme);
        assert_eq!(guess("/mnt/nas/projects"), DeviceType::Nfs);
        assert_eq!(guess("/mnt/nas/scratch"), DeviceType::Ssd);
    }

    #[test]
    fn test_detect_classifies_bare_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let device = DeviceClassification::detect(temp_dir.path().to_path_buf());
        assert_ne!(device.device_type, DeviceType::Unknown);
        assert_eq!(device.mount_path, temp_dir.path());
        assert!(!device.device.is_empty());

        // a path that does not exist still gets a guessed type
        let named = DeviceClassification::detect(PathBuf::from("/nonexistent/nvme0n1"));
        assert_ne!(named.device_type, DeviceType::Unknown);
    }

    #[test]
    fn test_display_matches_serde_name() {
        let json = serde_json::to_string(&DeviceType::Nvme).unwrap();
        assert_eq!(json, format!("\"{}\"", DeviceType::Nvme));
    }

    #[test]
    fn test_classification_builder() {
        let device =
            DeviceClassification::new("/dev/sdb", DeviceType::Hdd, PathBuf::from("/mnt/data"))
                .with_interface("SATA")
                .with_capacity(4 * 1024 * 1024 * 1024 * 1024);
        assert_eq!(device.interface, "SATA");
        assert_eq!(device.capacity_bytes, 4 * 1024 * 1024 * 1024 * 1024);

        let bare = DeviceClassification::for_path(PathBuf::from("/tmp"));
        assert_eq!(bare.device_type, DeviceType::Unknown);
        assert_eq!(bare.device, "/tmp");
    }
}
