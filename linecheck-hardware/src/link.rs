//! Ethernet link speed control
//!
//! The speed is switched with `ethtool` and verified by re-reading the
//! interface's sysfs `speed` attribute.

use async_trait::async_trait;
use linecheck_core::config::{NetworkConfig, ProbeConfig, SystemConfig};
use linecheck_core::{LineCheckError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::command::ToolRunner;
use crate::sysfs::read_number;

/// Outcome of a speed switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedChange {
    /// The link already ran at the requested speed; nothing was done
    AlreadySet,
    /// The link was switched and the new speed confirmed
    Changed,
    /// The new speed was not confirmed within the verify budget
    Failed,
}

#[async_trait]
pub trait LinkControl: Send + Sync {
    /// Negotiated speed in Mbit/s; `None` when the link is down
    async fn current_speed(&self) -> Result<Option<u32>>;

    /// Switch to `mbps` full duplex and confirm
    async fn set_speed(&self, mbps: u32) -> Result<SpeedChange>;
}

/// `ethtool` + sysfs link control
pub struct EthtoolLink {
    runner: Arc<dyn ToolRunner>,
    interface: String,
    speed_path: PathBuf,
    verify_attempts: u32,
    verify_interval: Duration,
}

impl EthtoolLink {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        network: &NetworkConfig,
        system: &SystemConfig,
        probe: &ProbeConfig,
    ) -> Self {
        Self {
            runner,
            interface: network.interface.clone(),
            speed_path: system.net_class.join(&network.interface).join("speed"),
            verify_attempts: probe.link_verify_attempts,
            verify_interval: probe.link_verify_interval(),
        }
    }

    async fn read_speed(&self) -> Result<Option<u32>> {
        match read_number(&self.speed_path).await? {
            Some(speed) if speed > 0 => Ok(Some(speed as u32)),
            Some(_) => Ok(None),
            None => Err(LineCheckError::ResourceUnavailable(format!(
                "{} has no speed attribute",
                self.interface
            ))),
        }
    }
}

#[async_trait]
impl LinkControl for EthtoolLink {
    async fn current_speed(&self) -> Result<Option<u32>> {
        self.read_speed().await
    }

    async fn set_speed(&self, mbps: u32) -> Result<SpeedChange> {
        if self.read_speed().await? == Some(mbps) {
            debug!("{} already at {} Mb/s", self.interface, mbps);
            return Ok(SpeedChange::AlreadySet);
        }

        let args = vec![
            "-s".to_string(),
            self.interface.clone(),
            "speed".to_string(),
            mbps.to_string(),
            "duplex".to_string(),
            "full".to_string(),
        ];
        let output = self.runner.run("ethtool", &args).await?;
        if !output.success() {
            warn!("ethtool: {}", output.stderr.trim());
        }

        for remaining in (0..self.verify_attempts).rev() {
            // A link renegotiating reports no speed; keep polling
            let speed = self.read_speed().await.unwrap_or(None);
            if speed == Some(mbps) {
                return Ok(SpeedChange::Changed);
            }
            debug!(
                "{}: requested {} Mb/s, read {:?}, {} checks left",
                self.interface, mbps, speed, remaining
            );
            if remaining > 0 {
                tokio::time::sleep(self.verify_interval).await;
            }
        }
        Ok(SpeedChange::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::MockRunner;
    use std::fs;
    use tempfile::TempDir;

    fn link(dir: &TempDir, runner: Arc<MockRunner>) -> EthtoolLink {
        fs::create_dir_all(dir.path().join("eth0")).unwrap();
        let system = SystemConfig {
            net_class: dir.path().to_path_buf(),
            ..Default::default()
        };
        let probe = ProbeConfig {
            link_verify_attempts: 3,
            link_verify_interval_ms: 5,
            ..Default::default()
        };
        EthtoolLink::new(runner, &NetworkConfig::default(), &system, &probe)
    }

    fn write_speed(dir: &TempDir, speed: &str) {
        fs::write(dir.path().join("eth0").join("speed"), speed).unwrap();
    }

    #[tokio::test]
    async fn test_already_set_is_noop() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new());
        let link = link(&dir, runner.clone());
        write_speed(&dir, "1000\n");

        assert_eq!(link.set_speed(1000).await.unwrap(), SpeedChange::AlreadySet);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_changed_when_confirmed() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new());
        runner.queue_stdout("");
        let mut link = link(&dir, runner.clone());
        link.verify_attempts = 200;
        write_speed(&dir, "100\n");

        // the link comes back at the requested speed a few checks later
        let speed_file = dir.path().join("eth0").join("speed");
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fs::write(&speed_file, "1000\n").unwrap();
        });
        let change = link.set_speed(1000).await.unwrap();
        writer.await.unwrap();

        assert_eq!(change, SpeedChange::Changed);
        assert_eq!(
            runner.calls(),
            vec!["ethtool -s eth0 speed 1000 duplex full".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_when_never_confirmed() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new());
        runner.queue_stdout("");
        let link = link(&dir, runner);
        write_speed(&dir, "1000\n");

        assert_eq!(link.set_speed(100).await.unwrap(), SpeedChange::Failed);
    }

    #[tokio::test]
    async fn test_missing_interface_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let link = link(&dir, Arc::new(MockRunner::new()));
        assert!(matches!(
            link.set_speed(100).await,
            Err(LineCheckError::ResourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_link_down_reads_none() {
        let dir = TempDir::new().unwrap();
        let link = link(&dir, Arc::new(MockRunner::new()));
        write_speed(&dir, "-1\n");
        assert_eq!(link.current_speed().await.unwrap(), None);
    }
}
