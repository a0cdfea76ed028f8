//! Hardware identifier provisioning
//!
//! The board MAC lives inside an identifier burned into the efuse. A fresh
//! board has none: an identifier is requested from the MAC server and
//! committed with the efuse tool, after which the MAC is its tail.

use async_trait::async_trait;
use linecheck_core::config::IdentityConfig;
use linecheck_core::{LineCheckError, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::ToolRunner;
use crate::sysfs::{extract_mac, read_attr};

/// Length of an identifier as issued by the MAC server
pub const IDENTIFIER_LEN: usize = 36;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// MAC (12 hex digits) found in the burned identifier; `None` when the
    /// identifier is unreadable or carries no vendor prefix
    async fn read_burned_identifier(&self) -> Result<Option<String>>;

    /// Ask the MAC server for a fresh identifier for `board`
    async fn request_identifier_from_server(&self, board: &str) -> Result<String>;

    /// Burn `identifier`. Returns whether the tool reported success.
    async fn commit_identifier(&self, identifier: &str) -> Result<bool>;
}

/// MAC portion of a server-issued identifier
/// (`c56d8ba1-14c8-408d-90f0-001e06510029` → `001e06510029`)
pub fn mac_from_identifier(identifier: &str) -> Option<String> {
    let tail = identifier.get(24..IDENTIFIER_LEN)?;
    tail.chars()
        .all(|c| c.is_ascii_hexdigit())
        .then(|| tail.to_string())
}

/// Efuse sysfs + MAC server + efuse tool
pub struct EfuseIdentity {
    runner: Arc<dyn ToolRunner>,
    client: Client,
    config: IdentityConfig,
}

impl EfuseIdentity {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        config: IdentityConfig,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("linecheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LineCheckError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            runner,
            client,
            config,
        })
    }
}

#[async_trait]
impl IdentityProvider for EfuseIdentity {
    async fn read_burned_identifier(&self) -> Result<Option<String>> {
        let Some(identifier) = read_attr(&self.config.efuse_uuid_path).await? else {
            return Ok(None);
        };
        let mac = extract_mac(&identifier, &self.config.oui);
        if mac.is_none() {
            debug!("efuse identifier without vendor prefix: {:?}", identifier);
        }
        Ok(mac)
    }

    async fn request_identifier_from_server(&self, board: &str) -> Result<String> {
        info!("Requesting identifier for board '{}'", board);
        let response = self
            .client
            .get(&self.config.mac_server_url)
            .query(&[("board", board)])
            .send()
            .await
            .map_err(|e| LineCheckError::Network(format!("MAC server unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(LineCheckError::Network(format!(
                "MAC server returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LineCheckError::Network(format!("MAC server read failed: {}", e)))?;
        let identifier = body.trim().to_string();
        if identifier.len() != IDENTIFIER_LEN {
            return Err(LineCheckError::Parse(format!(
                "MAC server returned malformed identifier '{}'",
                identifier
            )));
        }
        Ok(identifier)
    }

    async fn commit_identifier(&self, identifier: &str) -> Result<bool> {
        if !self.config.efuse_device.exists() {
            return Err(LineCheckError::ResourceUnavailable(format!(
                "{} not present",
                self.config.efuse_device.display()
            )));
        }
        let (program, base_args) = self
            .config
            .efuse_tool
            .split_first()
            .ok_or_else(|| LineCheckError::Config("efuse tool command is empty".to_string()))?;

        let mut args = base_args.to_vec();
        args.push(identifier.to_string());
        args.push(self.config.efuse_offset.to_string());

        let output = self.runner.run(program, &args).await?;
        let committed = output.combined().contains(&self.config.success_marker);
        if committed {
            info!("efuse write success, identifier = {}", identifier);
        } else {
            warn!("efuse write failed: {}", output.combined().trim());
        }
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::MockRunner;
    use std::fs;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const UUID: &str = "c56d8ba1-14c8-408d-90f0-001e06510029";

    fn make_identity(config: IdentityConfig, runner: Arc<MockRunner>) -> EfuseIdentity {
        EfuseIdentity::new(runner, config, Duration::from_secs(2)).unwrap()
    }

    /// One-shot HTTP server answering with `status` and `body`; returns its URL
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
        });
        format!("http://{}/uuid", addr)
    }

    #[test]
    fn test_mac_from_identifier() {
        assert_eq!(mac_from_identifier(UUID).as_deref(), Some("001e06510029"));
        assert_eq!(mac_from_identifier("short"), None);
    }

    #[tokio::test]
    async fn test_read_burned_identifier() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uuid");
        let config = IdentityConfig {
            efuse_uuid_path: path.clone(),
            ..Default::default()
        };
        let identity = make_identity(config, Arc::new(MockRunner::new()));

        // unreadable: button held or driver missing
        assert_eq!(identity.read_burned_identifier().await.unwrap(), None);

        fs::write(&path, "ffffffff-ffff-ffff-ffff-ffffffffffff\n").unwrap();
        assert_eq!(identity.read_burned_identifier().await.unwrap(), None);

        fs::write(&path, format!("{}\n", UUID)).unwrap();
        assert_eq!(
            identity.read_burned_identifier().await.unwrap().as_deref(),
            Some("001e06510029")
        );
    }

    #[tokio::test]
    async fn test_commit_detects_success_marker() {
        let device = NamedTempFile::new().unwrap();
        let runner = Arc::new(MockRunner::new());
        runner.queue_stdout("writing...\nefuse write success\n");
        runner.queue_stdout("efuse write error\n");
        let config = IdentityConfig {
            efuse_device: device.path().to_path_buf(),
            ..Default::default()
        };
        let identity = make_identity(config, runner.clone());

        assert!(identity.commit_identifier(UUID).await.unwrap());
        assert!(!identity.commit_identifier(UUID).await.unwrap());
        assert_eq!(
            runner.calls()[0],
            format!("python3 efuse/efuse_ctl.py -w {} 0", UUID)
        );
    }

    #[tokio::test]
    async fn test_commit_without_device() {
        let config = IdentityConfig {
            efuse_device: "/nonexistent/efuse".into(),
            ..Default::default()
        };
        let runner = Arc::new(MockRunner::new());
        let identity = make_identity(config, runner.clone());
        assert!(matches!(
            identity.commit_identifier(UUID).await,
            Err(LineCheckError::ResourceUnavailable(_))
        ));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_request_identifier_from_server() {
        let url = serve_once("200 OK", "c56d8ba1-14c8-408d-90f0-001e06510029\n").await;
        let config = IdentityConfig {
            mac_server_url: url,
            ..Default::default()
        };
        let identity = make_identity(config, Arc::new(MockRunner::new()));
        assert_eq!(identity.request_identifier_from_server("m1").await.unwrap(), UUID);
    }

    #[tokio::test]
    async fn test_request_identifier_rejects_errors() {
        let url = serve_once("500 Internal Server Error", "").await;
        let config = IdentityConfig {
            mac_server_url: url,
            ..Default::default()
        };
        let identity = make_identity(config, Arc::new(MockRunner::new()));
        assert!(matches!(
            identity.request_identifier_from_server("m1").await,
            Err(LineCheckError::Network(_))
        ));

        let url = serve_once("200 OK", "not-an-identifier").await;
        let config = IdentityConfig {
            mac_server_url: url,
            ..Default::default()
        };
        let identity = make_identity(config, Arc::new(MockRunner::new()));
        assert!(matches!(
            identity.request_identifier_from_server("m1").await,
            Err(LineCheckError::Parse(_))
        ));
    }
}
