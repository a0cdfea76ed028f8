//! External tool invocation
//!
//! Benchmarks, link configuration and efuse provisioning shell out to
//! system tools. Every invocation goes through [`ToolRunner`] so adapters can
//! be tested with queued outputs instead of real binaries.

use async_trait::async_trait;
use linecheck_core::{LineCheckError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Captured result of one tool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, for tools that report on either stream
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Trait for external tool abstraction
///
/// Implementations must bound the run time of every call.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput>;
}

/// Runs tools as child processes with a hard timeout
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout_duration: Duration,
}

impl SystemRunner {
    pub fn new(timeout_duration: Duration) -> Self {
        Self { timeout_duration }
    }
}

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput> {
        debug!("exec: {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LineCheckError::Tool {
                tool: program.to_string(),
                reason: e.to_string(),
            })?;

        let output = timeout(self.timeout_duration, child.wait_with_output())
            .await
            .map_err(|_| {
                warn!("{} timed out after {:?}", program, self.timeout_duration);
                LineCheckError::Timeout(format!("{} did not finish", program))
            })?
            .map_err(|e| LineCheckError::Tool {
                tool: program.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
