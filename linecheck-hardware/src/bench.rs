//! Storage and network throughput benchmarks
//!
//! Storage speed is a direct sequential read of the block device with `dd`;
//! network speed is an `iperf3` UDP client run against the companion server.

use async_trait::async_trait;
use linecheck_core::config::{NetworkConfig, StorageConfig};
use linecheck_core::{DeviceClass, LineCheckError, Measurement, Result};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::command::ToolRunner;

/// Block device read benchmark
#[async_trait]
pub trait StorageBench: Send + Sync {
    /// Read speed of the configured node for `class`, as MB/s plus display text
    async fn measure(&self, class: DeviceClass) -> Result<Measurement>;

    /// Average MB/s over `passes` sequential reads of `node`
    async fn read_speed(&self, node: &Path, passes: u32) -> Result<u32>;
}

/// Network throughput benchmark
#[async_trait]
pub trait NetBench: Send + Sync {
    /// Throughput to `server` in Mbit/s
    async fn throughput(&self, server: IpAddr) -> Result<u32>;
}

/// `dd`-based storage benchmark
pub struct DdBench {
    runner: Arc<dyn ToolRunner>,
    config: StorageConfig,
}

impl DdBench {
    pub fn new(runner: Arc<dyn ToolRunner>, config: StorageConfig) -> Self {
        Self { runner, config }
    }

    async fn read_once(&self, node: &Path) -> Result<u32> {
        let args = vec![
            format!("if={}", node.display()),
            "of=/dev/null".to_string(),
            "bs=1M".to_string(),
            format!("count={}", self.config.read_size_mb),
            "iflag=direct".to_string(),
        ];
        let output = self.runner.run("dd", &args).await?;
        if !output.success() {
            return Err(LineCheckError::Tool {
                tool: "dd".to_string(),
                reason: output.stderr.trim().to_string(),
            });
        }
        // dd reports its transfer summary on stderr
        parse_dd_rate(&output.combined())
    }
}

#[async_trait]
impl StorageBench for DdBench {
    async fn measure(&self, class: DeviceClass) -> Result<Measurement> {
        let node = self.config.node(class);
        if !node.exists() {
            return Err(LineCheckError::ResourceUnavailable(format!(
                "{} device {} not present",
                class,
                node.display()
            )));
        }
        let speed = self.read_speed(node, 1).await?;
        Ok(Measurement::new(speed, format!("{} MB/s", speed)))
    }

    async fn read_speed(&self, node: &Path, passes: u32) -> Result<u32> {
        let passes = passes.max(1);
        let mut total = 0u64;
        for pass in 0..passes {
            let speed = self.read_once(node).await?;
            debug!("{} read pass {}: {} MB/s", node.display(), pass + 1, speed);
            total += u64::from(speed);
        }
        Ok((total / u64::from(passes)) as u32)
    }
}

/// Transfer rate in MB/s from `dd` output
/// (`... copied, 0.5 s, 210 MB/s`).
pub fn parse_dd_rate(output: &str) -> Result<u32> {
    let line = output
        .lines()
        .rev()
        .find(|line| line.contains("copied"))
        .ok_or_else(|| LineCheckError::Parse("dd summary line not found".to_string()))?;
    let rate = line
        .rsplit(',')
        .next()
        .map(str::trim)
        .ok_or_else(|| LineCheckError::Parse(format!("Malformed dd line: '{}'", line)))?;

    let (value, unit) = rate
        .split_once(' ')
        .ok_or_else(|| LineCheckError::Parse(format!("Malformed dd rate: '{}'", rate)))?;
    let value: f64 = value
        .replace(',', ".")
        .parse()
        .map_err(|_| LineCheckError::Parse(format!("Malformed dd rate: '{}'", rate)))?;

    let scale = match unit.trim() {
        "GB/s" => 1000.0,
        "GiB/s" => 1073.741824,
        "MB/s" => 1.0,
        "MiB/s" => 1.048576,
        "kB/s" => 0.001,
        "KiB/s" => 0.001024,
        "B/s" => 0.000001,
        other => {
            return Err(LineCheckError::Parse(format!("Unknown dd unit '{}'", other)));
        }
    };
    Ok((value * scale) as u32)
}

/// `iperf3` UDP client
pub struct Iperf3 {
    runner: Arc<dyn ToolRunner>,
    duration_secs: u32,
    bandwidth: String,
}

impl Iperf3 {
    pub fn new(runner: Arc<dyn ToolRunner>, config: &NetworkConfig) -> Self {
        Self {
            runner,
            duration_secs: config.iperf_duration_secs,
            bandwidth: config.iperf_bandwidth.clone(),
        }
    }
}

#[async_trait]
impl NetBench for Iperf3 {
    async fn throughput(&self, server: IpAddr) -> Result<u32> {
        let args = vec![
            "-c".to_string(),
            server.to_string(),
            "-u".to_string(),
            "-b".to_string(),
            self.bandwidth.clone(),
            "-t".to_string(),
            self.duration_secs.to_string(),
            "-J".to_string(),
        ];
        let output = self.runner.run("iperf3", &args).await?;
        parse_iperf_json(&output.stdout)
    }
}

/// Mbit/s from an `iperf3 -J` report
pub fn parse_iperf_json(report: &str) -> Result<u32> {
    let value: serde_json::Value = serde_json::from_str(report)?;
    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        return Err(LineCheckError::Tool {
            tool: "iperf3".to_string(),
            reason: error.to_string(),
        });
    }
    let end = &value["end"];
    let bps = end["sum"]["bits_per_second"]
        .as_f64()
        .or_else(|| end["sum_received"]["bits_per_second"].as_f64())
        .ok_or_else(|| LineCheckError::Parse("iperf3 report has no throughput".to_string()))?;
    Ok((bps / 1_000_000.0) as u32)
}
