//! USB port scanning
//!
//! A port is identified by its sysfs device name (`8-1`, `2-1`, ...). A
//! mass-storage device plugged into it shows up as a `block/sdX` directory
//! somewhere below the port's device directory.

use async_trait::async_trait;
use linecheck_core::{LineCheckError, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::sysfs::read_number;

/// Deepest directory level searched below a port for a block device
const MAX_SCAN_DEPTH: usize = 12;

/// A mass-storage device found on a port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbAttachment {
    pub port: String,
    /// Negotiated speed in Mb/s (12, 480, 5000, ...)
    pub speed_mbps: u32,
    /// Device node, e.g. `/dev/sda`
    pub block_device: PathBuf,
}

#[async_trait]
pub trait UsbBus: Send + Sync {
    /// Whether anything at all is plugged into `port`
    async fn is_occupied(&self, port: &str) -> Result<bool>;

    /// Mass-storage device on `port`, if one is attached and enumerated
    async fn attachment(&self, port: &str) -> Result<Option<UsbAttachment>>;
}

/// Reads `/sys/bus/usb/devices`
#[derive(Debug, Clone)]
pub struct SysfsUsb {
    root: PathBuf,
}

impl SysfsUsb {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl UsbBus for SysfsUsb {
    async fn is_occupied(&self, port: &str) -> Result<bool> {
        Ok(self.root.join(port).exists())
    }

    async fn attachment(&self, port: &str) -> Result<Option<UsbAttachment>> {
        let dir = self.root.join(port);
        if !dir.exists() {
            return Ok(None);
        }
        let speed = read_number(&dir.join("speed")).await?.unwrap_or(0).max(0) as u32;

        let scan_dir = dir.clone();
        let node = tokio::task::spawn_blocking(move || find_block_device(&scan_dir))
            .await
            .map_err(|e| LineCheckError::Other(format!("USB scan task failed: {}", e)))?;

        Ok(node.map(|name| UsbAttachment {
            port: port.to_string(),
            speed_mbps: speed,
            block_device: PathBuf::from("/dev").join(name),
        }))
    }
}

/// Name of the first `sdX` block device below `dir`.
///
/// Symlinks are not followed so the walk stays inside the port's subtree.
pub fn find_block_device(dir: &Path) -> Option<String> {
    fn walk(dir: &Path, depth: usize) -> Option<String> {
        if depth > MAX_SCAN_DEPTH {
            return None;
        }
        let mut entries: Vec<_> = fs::read_dir(dir).ok()?.flatten().collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "block" {
                let found = fs::read_dir(entry.path())
                    .ok()?
                    .flatten()
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|n| n.starts_with("sd"))
                    .min();
                if found.is_some() {
                    return found;
                }
            }
            if let Some(found) = walk(&entry.path(), depth + 1) {
                return Some(found);
            }
        }
        None
    }
    walk(dir, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Lay out `<root>/<port>/speed` and, optionally, a nested block device
    fn plug(root: &Path, port: &str, speed: &str, disk: Option<&str>) {
        let dir = root.join(port);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("speed"), speed).unwrap();
        if let Some(disk) = disk {
            let block = dir
                .join(format!("{}:1.0", port))
                .join("host0")
                .join("target0:0:0")
                .join("0:0:0:0")
                .join("block")
                .join(disk);
            fs::create_dir_all(block).unwrap();
        }
    }

    #[tokio::test]
    async fn test_empty_port() {
        let root = TempDir::new().unwrap();
        let usb = SysfsUsb::new(root.path());
        assert!(!usb.is_occupied("8-1").await.unwrap());
        assert_eq!(usb.attachment("8-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mass_storage_attachment() {
        let root = TempDir::new().unwrap();
        plug(root.path(), "8-1", "5000\n", Some("sdb"));
        let usb = SysfsUsb::new(root.path());

        let found = usb.attachment("8-1").await.unwrap().unwrap();
        assert_eq!(found.port, "8-1");
        assert_eq!(found.speed_mbps, 5000);
        assert_eq!(found.block_device, PathBuf::from("/dev/sdb"));
    }

    #[tokio::test]
    async fn test_non_storage_device() {
        let root = TempDir::new().unwrap();
        plug(root.path(), "2-1", "12\n", None);
        let usb = SysfsUsb::new(root.path());

        assert!(usb.is_occupied("2-1").await.unwrap());
        assert_eq!(usb.attachment("2-1").await.unwrap(), None);
    }

    #[test]
    fn test_find_block_device_only_under_block_dir() {
        let root = TempDir::new().unwrap();
        let block = root.path().join("a").join("block");
        fs::create_dir_all(block.join("sdc")).unwrap();
        fs::create_dir_all(block.join("sda")).unwrap();
        fs::create_dir_all(root.path().join("b").join("sdz")).unwrap();
        assert_eq!(find_block_device(root.path()).as_deref(), Some("sda"));
    }
}
