//! Memory and display information

use async_trait::async_trait;
use linecheck_core::config::SystemConfig;
use linecheck_core::{LineCheckError, Result};

use crate::sysfs::{parse_meminfo_total_mb, parse_virtual_size, read_attr};

/// Board memory and framebuffer facts
#[async_trait]
pub trait SystemInfo: Send + Sync {
    /// Total RAM in MiB
    async fn memory_mb(&self) -> Result<u64>;

    /// Framebuffer resolution as `(width, height)`
    async fn framebuffer_size(&self) -> Result<(u32, u32)>;
}

/// Reads `/proc/meminfo` and the framebuffer `virtual_size` attribute
#[derive(Debug, Clone)]
pub struct SysfsSystem {
    config: SystemConfig,
}

impl SysfsSystem {
    pub fn new(config: SystemConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SystemInfo for SysfsSystem {
    async fn memory_mb(&self) -> Result<u64> {
        let content = read_attr(&self.config.meminfo).await?.ok_or_else(|| {
            LineCheckError::ResourceUnavailable(self.config.meminfo.display().to_string())
        })?;
        parse_meminfo_total_mb(&content)
    }

    async fn framebuffer_size(&self) -> Result<(u32, u32)> {
        let content = read_attr(&self.config.framebuffer).await?.ok_or_else(|| {
            LineCheckError::ResourceUnavailable(self.config.framebuffer.display().to_string())
        })?;
        parse_virtual_size(&content)
    }
}

/// Marketed memory size in GB for a measured MiB total; 0 when unrecognised
pub fn classify_memory(total_mb: u64) -> u32 {
    if total_mb > 4096 && total_mb < 8192 {
        8
    } else if total_mb > 2048 && total_mb < 4096 {
        4
    } else {
        0
    }
}
