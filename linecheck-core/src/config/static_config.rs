//! Static configuration loaded once at startup
//!
//! This configuration is read-only after the daemon starts. Every section and
//! every field has a default, so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LineCheckError, Result};
use crate::types::{DeviceClass, Threshold};

/// Run timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Aggregation tick period in milliseconds
    pub tick_interval_ms: u64,
    /// Countdown shown as "RUNNING - N"; the run stops when it reaches zero
    pub timeout_ticks: u32,
    /// The countdown steps once every this many ticks
    pub countdown_divisor: u32,
    /// Display refresh period while parked after the run
    pub park_refresh_ms: u64,
    /// How long probes and sources get to exit once the run has halted
    pub wind_down_grace_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            timeout_ticks: 90,
            countdown_divisor: 2,
            park_refresh_ms: 1000,
            wind_down_grace_ms: 3000,
        }
    }
}

impl RunConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn park_refresh(&self) -> Duration {
        Duration::from_millis(self.park_refresh_ms)
    }

    pub fn wind_down_grace(&self) -> Duration {
        Duration::from_millis(self.wind_down_grace_ms)
    }
}

/// Probe retry and polling behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Attempts for storage benchmarks
    pub retry_count: u32,
    /// Attempts for the network throughput probe
    pub iperf_retry_count: u32,
    /// Sleep between attempts of a retry probe
    pub backoff_ms: u64,
    /// Poll interval of event-driven probes and input sources
    pub event_poll_ms: u64,
    /// Poll interval of the SPI button source
    pub button_poll_ms: u64,
    /// Poll interval of the USB port scanner
    pub usb_poll_ms: u64,
    /// Upper bound for any single external call
    pub tool_timeout_secs: u64,
    /// Settle time before and after the network throughput measurement
    pub settle_ms: u64,
    /// Link speed re-reads after a speed change
    pub link_verify_attempts: u32,
    pub link_verify_interval_ms: u64,
    /// Bootstrap retry period while the network is unavailable
    pub bootstrap_retry_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            retry_count: 5,
            iperf_retry_count: 10,
            backoff_ms: 200,
            event_poll_ms: 100,
            button_poll_ms: 200,
            usb_poll_ms: 100,
            tool_timeout_secs: 60,
            settle_ms: 1000,
            link_verify_attempts: 5,
            link_verify_interval_ms: 1000,
            bootstrap_retry_ms: 1000,
        }
    }
}

impl ProbeConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn event_poll(&self) -> Duration {
        Duration::from_millis(self.event_poll_ms)
    }

    pub fn button_poll(&self) -> Duration {
        Duration::from_millis(self.button_poll_ms)
    }

    pub fn usb_poll(&self) -> Duration {
        Duration::from_millis(self.usb_poll_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn link_verify_interval(&self) -> Duration {
        Duration::from_millis(self.link_verify_interval_ms)
    }

    pub fn bootstrap_retry(&self) -> Duration {
        Duration::from_millis(self.bootstrap_retry_ms)
    }
}

/// Pass thresholds. A measurement passes when it is at least the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// MB/s
    pub emmc: u32,
    pub sdmmc: u32,
    pub sata: u32,
    pub nvme: u32,
    /// Mbit/s
    pub iperf: u32,
    /// MB/s read from a mass-storage device on a USB 3.0 port
    pub usb3: u32,
    /// MB/s read from a mass-storage device on a USB 2.0 port
    pub usb2: u32,
    /// Expected framebuffer resolution as `WIDTHxHEIGHT`
    pub resolution: String,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            emmc: 150,
            sdmmc: 50,
            sata: 400,
            nvme: 1000,
            iperf: 800,
            usb3: 60,
            usb2: 20,
            resolution: "1920x1080".to_string(),
        }
    }
}

impl ThresholdsConfig {
    pub fn storage(&self, class: DeviceClass) -> Threshold {
        Threshold::new(match class {
            DeviceClass::Emmc => self.emmc,
            DeviceClass::Sdmmc => self.sdmmc,
            DeviceClass::Sata => self.sata,
            DeviceClass::Nvme => self.nvme,
        })
    }

    pub fn iperf(&self) -> Threshold {
        Threshold::new(self.iperf)
    }

    /// Expected resolution as `(width, height)`
    pub fn expected_resolution(&self) -> Result<(u32, u32)> {
        let (w, h) = self
            .resolution
            .split_once(['x', 'X'])
            .ok_or_else(|| {
                LineCheckError::Config(format!("Invalid resolution '{}'", self.resolution))
            })?;
        let parse = |s: &str| {
            s.trim().parse::<u32>().map_err(|_| {
                LineCheckError::Config(format!("Invalid resolution '{}'", self.resolution))
            })
        };
        Ok((parse(w)?, parse(h)?))
    }
}

/// Block device node per storage class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub emmc: PathBuf,
    pub sdmmc: PathBuf,
    pub sata: PathBuf,
    pub nvme: PathBuf,
    /// Amount read per benchmark pass, in MiB
    pub read_size_mb: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            emmc: PathBuf::from("/dev/mmcblk0"),
            sdmmc: PathBuf::from("/dev/mmcblk1"),
            sata: PathBuf::from("/dev/sda"),
            nvme: PathBuf::from("/dev/nvme0n1"),
            read_size_mb: 100,
        }
    }
}

impl StorageConfig {
    pub fn node(&self, class: DeviceClass) -> &PathBuf {
        match class {
            DeviceClass::Emmc => &self.emmc,
            DeviceClass::Sdmmc => &self.sdmmc,
            DeviceClass::Sata => &self.sata,
            DeviceClass::Nvme => &self.nvme,
        }
    }
}

/// Network interface and companion server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface whose link speed is switched
    pub interface: String,
    /// Companion server address. When unset, the board's /24 subnet is scanned.
    pub companion_host: Option<String>,
    /// Port of the companion's control/log endpoint
    pub companion_port: u16,
    /// Connect timeout used while scanning for the companion
    pub discovery_timeout_ms: u64,
    /// Link speed forced during bootstrap (Mbit/s)
    pub bootstrap_speed: u32,
    /// iperf3 client duration per measurement
    pub iperf_duration_secs: u32,
    /// iperf3 UDP target bandwidth
    pub iperf_bandwidth: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            companion_host: None,
            companion_port: 8888,
            discovery_timeout_ms: 300,
            bootstrap_speed: 1000,
            iperf_duration_secs: 3,
            iperf_bandwidth: "1000M".to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

/// Hardware identifier provisioning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Burned identifier exposed by the efuse driver
    pub efuse_uuid_path: PathBuf,
    /// Device node that must exist for a commit to be attempted
    pub efuse_device: PathBuf,
    /// Vendor prefix marking a valid MAC inside the identifier
    pub oui: String,
    /// Board name sent to the MAC server
    pub board: String,
    /// MAC server endpoint issuing fresh identifiers
    pub mac_server_url: String,
    /// Commit command; the identifier and offset are appended
    pub efuse_tool: Vec<String>,
    /// Efuse offset the identifier is written to
    pub efuse_offset: u32,
    /// Text the commit command prints on success
    pub success_marker: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            efuse_uuid_path: PathBuf::from("/sys/class/efuse/uuid"),
            efuse_device: PathBuf::from("/dev/efuse"),
            oui: "001e06".to_string(),
            board: "m1".to_string(),
            mac_server_url: "http://localhost:8080/uuid".to_string(),
            efuse_tool: vec![
                "python3".to_string(),
                "efuse/efuse_ctl.py".to_string(),
                "-w".to_string(),
            ],
            efuse_offset: 0,
            success_marker: "efuse write success".to_string(),
        }
    }
}

/// Input devices feeding the event sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// IR receiver
    pub ir_device: PathBuf,
    /// Headphone jack switch
    pub jack_device: PathBuf,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            ir_device: PathBuf::from("/dev/input/event0"),
            jack_device: PathBuf::from("/dev/input/event2"),
        }
    }
}

/// Kernel-exposed system information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub meminfo: PathBuf,
    /// Framebuffer `virtual_size` attribute
    pub framebuffer: PathBuf,
    /// Root of the sysfs net class
    pub net_class: PathBuf,
    /// Root of the sysfs USB device list
    pub usb_devices: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            meminfo: PathBuf::from("/proc/meminfo"),
            framebuffer: PathBuf::from("/sys/class/graphics/fb0/virtual_size"),
            net_class: PathBuf::from("/sys/class/net"),
            usb_devices: PathBuf::from("/sys/bus/usb/devices"),
        }
    }
}

/// USB port map: sysfs device names watched by each USB item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbConfig {
    pub usb3_up: Vec<String>,
    pub usb3_down: Vec<String>,
    pub usb2_up: Vec<String>,
    pub usb2_down: Vec<String>,
}

impl Default for UsbConfig {
    fn default() -> Self {
        let ports = |names: [&str; 2]| names.iter().map(|n| n.to_string()).collect();
        Self {
            usb3_up: ports(["8-1", "7-1"]),
            usb3_down: ports(["6-1", "5-1"]),
            usb2_up: ports(["1-1", "3-1"]),
            usb2_down: ports(["2-1", "4-1"]),
        }
    }
}

/// Status API server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    /// Server hostname
    pub hostname: String,
    /// Server port
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hostname: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Static configuration for the linecheck daemon.
///
/// Located at `~/.config/linecheck/config.toml` by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    pub run: RunConfig,
    pub probe: ProbeConfig,
    pub thresholds: ThresholdsConfig,
    pub storage: StorageConfig,
    pub network: NetworkConfig,
    pub identity: IdentityConfig,
    pub events: EventsConfig,
    pub system: SystemConfig,
    pub usb: UsbConfig,
    pub api: ApiConfig,
}

impl StaticConfig {
    /// Parse StaticConfig from TOML string.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize StaticConfig to TOML string.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject values the supervisor cannot run with
    pub fn validate(&self) -> Result<()> {
        // zero periods panic in tokio intervals or turn polls into busy loops
        for (name, value) in [
            ("run.tick_interval_ms", self.run.tick_interval_ms),
            ("run.park_refresh_ms", self.run.park_refresh_ms),
            ("probe.backoff_ms", self.probe.backoff_ms),
            ("probe.event_poll_ms", self.probe.event_poll_ms),
            ("probe.button_poll_ms", self.probe.button_poll_ms),
            ("probe.usb_poll_ms", self.probe.usb_poll_ms),
            ("probe.tool_timeout_secs", self.probe.tool_timeout_secs),
            ("probe.link_verify_interval_ms", self.probe.link_verify_interval_ms),
            ("probe.bootstrap_retry_ms", self.probe.bootstrap_retry_ms),
            ("network.discovery_timeout_ms", self.network.discovery_timeout_ms),
        ] {
            if value == 0 {
                return Err(LineCheckError::Config(format!("{} must be positive", name)));
            }
        }
        if self.run.timeout_ticks == 0 {
            return Err(LineCheckError::Config(
                "run.timeout_ticks must be positive".to_string(),
            ));
        }
        if self.run.countdown_divisor == 0 {
            return Err(LineCheckError::Config(
                "run.countdown_divisor must be positive".to_string(),
            ));
        }
        if self.probe.retry_count == 0 || self.probe.iperf_retry_count == 0 {
            return Err(LineCheckError::Config(
                "probe retry counts must be positive".to_string(),
            ));
        }
        if self.identity.efuse_tool.is_empty() {
            return Err(LineCheckError::Config(
                "identity.efuse_tool must name a command".to_string(),
            ));
        }
        for (name, ports) in [
            ("usb3_up", &self.usb.usb3_up),
            ("usb3_down", &self.usb.usb3_down),
            ("usb2_up", &self.usb.usb2_up),
            ("usb2_down", &self.usb.usb2_down),
        ] {
            if ports.is_empty() {
                return Err(LineCheckError::Config(format!(
                    "usb.{} must list at least one port",
                    name
                )));
            }
        }
        self.thresholds.expected_resolution()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_static_config() {
        let config = StaticConfig::default();
        assert_eq!(config.run.tick_interval_ms, 500);
        assert_eq!(config.run.timeout_ticks, 90);
        assert_eq!(config.probe.retry_count, 5);
        assert_eq!(config.probe.iperf_retry_count, 10);
        assert_eq!(config.thresholds.storage(DeviceClass::Nvme), Threshold::new(1000));
        assert_eq!(config.identity.oui, "001e06");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_static_config_serialization() {
        let config = StaticConfig::default();
        let toml_str = config.to_toml().unwrap();

        for section in [
            "[run]",
            "[probe]",
            "[thresholds]",
            "[storage]",
            "[network]",
            "[identity]",
            "[events]",
            "[system]",
            "[usb]",
            "[api]",
        ] {
            assert!(toml_str.contains(section), "missing {section}");
        }
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let toml_str = r#"
            [run]
            timeout_ticks = 30

            [thresholds]
            sata = 350

            [network]
            companion_host = "192.168.0.10"
        "#;

        let config = StaticConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.run.timeout_ticks, 30);
        assert_eq!(config.run.tick_interval_ms, 500);
        assert_eq!(config.thresholds.sata, 350);
        assert_eq!(config.thresholds.emmc, 150);
        assert_eq!(config.network.companion_host.as_deref(), Some("192.168.0.10"));
        assert_eq!(config.network.interface, "eth0");
        assert_eq!(config.api.port, 3000);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = StaticConfig::from_toml("").unwrap();
        assert_eq!(config.run.countdown_divisor, 2);
        assert_eq!(config.events.ir_device, PathBuf::from("/dev/input/event0"));
        assert_eq!(config.usb.usb3_up, vec!["8-1", "7-1"]);
    }

    #[test]
    fn test_expected_resolution() {
        let mut thresholds = ThresholdsConfig::default();
        assert_eq!(thresholds.expected_resolution().unwrap(), (1920, 1080));

        thresholds.resolution = "1280X720".to_string();
        assert_eq!(thresholds.expected_resolution().unwrap(), (1280, 720));

        thresholds.resolution = "wide".to_string();
        assert!(thresholds.expected_resolution().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = StaticConfig::default();
        config.run.timeout_ticks = 0;
        assert!(matches!(config.validate(), Err(LineCheckError::Config(_))));

        let mut config = StaticConfig::default();
        config.run.countdown_divisor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_periods() {
        for (section, field) in [
            ("run", "tick_interval_ms"),
            ("run", "park_refresh_ms"),
            ("probe", "backoff_ms"),
            ("probe", "event_poll_ms"),
            ("probe", "button_poll_ms"),
            ("probe", "usb_poll_ms"),
            ("probe", "tool_timeout_secs"),
            ("probe", "link_verify_interval_ms"),
            ("probe", "bootstrap_retry_ms"),
            ("network", "discovery_timeout_ms"),
        ] {
            let config = StaticConfig::from_toml(&format!("[{section}]\n{field} = 0\n")).unwrap();
            match config.validate() {
                Err(LineCheckError::Config(msg)) => {
                    assert_eq!(msg, format!("{section}.{field} must be positive"))
                }
                other => panic!("{section}.{field} = 0 accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn test_storage_nodes() {
        let storage = StorageConfig::default();
        assert_eq!(storage.node(DeviceClass::Emmc), &PathBuf::from("/dev/mmcblk0"));
        assert_eq!(storage.node(DeviceClass::Nvme), &PathBuf::from("/dev/nvme0n1"));
    }
}
