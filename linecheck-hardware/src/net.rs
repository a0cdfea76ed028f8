//! Board network identity, companion server discovery and the remote log sink

use async_trait::async_trait;
use linecheck_core::config::NetworkConfig;
use linecheck_core::{LineCheckError, LogKind, Result};
use reqwest::Client;
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::command::ToolRunner;

#[async_trait]
pub trait NetworkIdentity: Send + Sync {
    /// IPv4 address of the board on the test interface
    async fn discover_local_address(&self) -> Result<Ipv4Addr>;

    /// Address of the companion server reachable from `local`
    async fn discover_companion_server(&self, local: Ipv4Addr) -> Result<Ipv4Addr>;
}

#[async_trait]
pub trait LogSink: Send + Sync {
    async fn send_log_message(&self, server: Ipv4Addr, kind: LogKind, payload: &str)
        -> Result<()>;
}

/// First IPv4 address in `ip -4 -o addr show` output
pub fn parse_interface_address(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        fields.find(|f| *f == "inet")?;
        let cidr = fields.next()?;
        cidr.split('/').next()?.parse().ok()
    })
}

/// Discovery over the test interface
pub struct LanDiscovery {
    runner: Arc<dyn ToolRunner>,
    interface: String,
    companion_host: Option<String>,
    port: u16,
    connect_timeout: Duration,
}

impl LanDiscovery {
    pub fn new(runner: Arc<dyn ToolRunner>, config: &NetworkConfig) -> Self {
        Self {
            runner,
            interface: config.interface.clone(),
            companion_host: config.companion_host.clone(),
            port: config.companion_port,
            connect_timeout: config.discovery_timeout(),
        }
    }

    async fn reachable(addr: Ipv4Addr, port: u16, connect_timeout: Duration) -> bool {
        matches!(
            timeout(connect_timeout, TcpStream::connect(SocketAddrV4::new(addr, port))).await,
            Ok(Ok(_))
        )
    }

    /// Probe every host of the /24 around `local` concurrently; first responder wins
    async fn scan_subnet(&self, local: Ipv4Addr) -> Option<Ipv4Addr> {
        let [a, b, c, own] = local.octets();
        let mut probes = JoinSet::new();
        for host in 1..=254u8 {
            if host == own {
                continue;
            }
            let candidate = Ipv4Addr::new(a, b, c, host);
            let (port, connect_timeout) = (self.port, self.connect_timeout);
            probes.spawn(async move {
                Self::reachable(candidate, port, connect_timeout)
                    .await
                    .then_some(candidate)
            });
        }
        while let Some(result) = probes.join_next().await {
            if let Ok(Some(found)) = result {
                return Some(found);
            }
        }
        None
    }
}

#[async_trait]
impl NetworkIdentity for LanDiscovery {
    async fn discover_local_address(&self) -> Result<Ipv4Addr> {
        let args = vec![
            "-4".to_string(),
            "-o".to_string(),
            "addr".to_string(),
            "show".to_string(),
            "dev".to_string(),
            self.interface.clone(),
        ];
        let output = self.runner.run("ip", &args).await?;
        parse_interface_address(&output.stdout).ok_or_else(|| {
            LineCheckError::Network(format!("{} has no IPv4 address", self.interface))
        })
    }

    async fn discover_companion_server(&self, local: Ipv4Addr) -> Result<Ipv4Addr> {
        let found = match &self.companion_host {
            Some(host) => {
                let addr: Ipv4Addr = host.parse().map_err(|_| {
                    LineCheckError::Config(format!("Invalid companion host '{}'", host))
                })?;
                Self::reachable(addr, self.port, self.connect_timeout)
                    .await
                    .then_some(addr)
            }
            None => self.scan_subnet(local).await,
        };
        match found {
            Some(addr) => {
                debug!("Companion server at {}:{}", addr, self.port);
                Ok(addr)
            }
            None => Err(LineCheckError::Network(format!(
                "No companion server answering on port {}",
                self.port
            ))),
        }
    }
}

#[derive(Serialize)]
struct LogMessage<'a> {
    kind: LogKind,
    payload: &'a str,
}

/// Posts log messages as JSON to the companion server's `/log` endpoint
pub struct HttpLogSink {
    client: Client,
    port: u16,
}

impl HttpLogSink {
    pub fn new(port: u16, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LineCheckError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, port })
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    async fn send_log_message(
        &self,
        server: Ipv4Addr,
        kind: LogKind,
        payload: &str,
    ) -> Result<()> {
        let url = format!("http://{}:{}/log", server, self.port);
        let response = self
            .client
            .post(&url)
            .json(&LogMessage { kind, payload })
            .send()
            .await
            .map_err(|e| LineCheckError::Network(format!("Log server unreachable: {}", e)))?;
        if !response.status().is_success() {
            warn!("Log server rejected {:?} message: {}", kind, response.status());
            return Err(LineCheckError::Network(format!(
                "Log server returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::MockRunner;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const IP_OUTPUT: &str = "2: eth0    inet 192.168.0.23/24 brd 192.168.0.255 scope global dynamic eth0\\       valid_lft 86052sec preferred_lft 86052sec\n";

    #[test]
    fn test_parse_interface_address() {
        assert_eq!(
            parse_interface_address(IP_OUTPUT),
            Some(Ipv4Addr::new(192, 168, 0, 23))
        );
        assert_eq!(parse_interface_address(""), None);
    }

    #[tokio::test]
    async fn test_discover_local_address() {
        let runner = Arc::new(MockRunner::new());
        runner.queue_stdout(IP_OUTPUT);
        runner.queue_stdout("");
        let discovery = LanDiscovery::new(runner.clone(), &NetworkConfig::default());

        assert_eq!(
            discovery.discover_local_address().await.unwrap(),
            Ipv4Addr::new(192, 168, 0, 23)
        );
        assert!(matches!(
            discovery.discover_local_address().await,
            Err(LineCheckError::Network(_))
        ));
        assert_eq!(runner.calls()[0], "ip -4 -o addr show dev eth0");
    }

    #[tokio::test]
    async fn test_configured_companion_must_answer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = NetworkConfig {
            companion_host: Some("127.0.0.1".to_string()),
            companion_port: port,
            ..Default::default()
        };
        let discovery = LanDiscovery::new(Arc::new(MockRunner::new()), &config);
        let local = Ipv4Addr::new(127, 0, 0, 1);
        assert_eq!(
            discovery.discover_companion_server(local).await.unwrap(),
            Ipv4Addr::LOCALHOST
        );

        drop(listener);
        assert!(discovery.discover_companion_server(local).await.is_err());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_subnet_scan_finds_companion() {
        // the whole 127/8 is loopback on Linux, so a /24 scan can be simulated
        let listener = TcpListener::bind("127.0.0.7:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = NetworkConfig {
            companion_port: port,
            discovery_timeout_ms: 200,
            ..Default::default()
        };
        let discovery = LanDiscovery::new(Arc::new(MockRunner::new()), &config);
        let found = discovery
            .discover_companion_server(Ipv4Addr::new(127, 0, 0, 1))
            .await
            .unwrap();
        assert_eq!(found, Ipv4Addr::new(127, 0, 0, 7));
    }

    #[tokio::test]
    async fn test_log_sink_posts_json() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !String::from_utf8_lossy(&request).contains("}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        let sink = HttpLogSink::new(port, Duration::from_secs(2)).unwrap();
        sink.send_log_message(Ipv4Addr::LOCALHOST, LogKind::Err, "EMMC,SATA,")
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /log"));
        assert!(request.contains(r#""kind":"err""#));
        assert!(request.contains(r#""payload":"EMMC,SATA,""#));
    }
}
