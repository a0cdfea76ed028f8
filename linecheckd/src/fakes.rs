//! Fake board for testing
//!
//! [`FakeBoard`] implements every hardware capability against scripted
//! in-memory state. It starts out as a healthy board on which every
//! measurement passes; tests override what they care about and inspect what
//! was asked of it afterwards.

use async_trait::async_trait;
use linecheck_core::{DeviceClass, LineCheckError, LogKind, Measurement, Result};
use linecheck_hardware::{
    IdentityProvider, LinkControl, LogSink, NetBench, NetworkIdentity, SpeedChange, StorageBench,
    SystemInfo, UsbAttachment, UsbBus,
};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::capabilities::Capabilities;

/// Queued readings; `None` is a failing call. The last entry repeats.
#[derive(Debug, Clone)]
struct Script {
    readings: VecDeque<Option<u32>>,
}

impl Script {
    fn new(readings: &[Option<u32>]) -> Self {
        Self {
            readings: readings.iter().copied().collect(),
        }
    }

    fn always(value: u32) -> Self {
        Self::new(&[Some(value)])
    }

    fn next(&mut self) -> Option<u32> {
        if self.readings.len() > 1 {
            self.readings.pop_front().flatten()
        } else {
            self.readings.front().copied().flatten()
        }
    }
}

struct BoardState {
    storage: HashMap<DeviceClass, Script>,
    iperf: Script,
    usb_read: Script,
    /// Delay before every benchmark answers
    bench_delay: Duration,
    /// Duration of efuse commits and link speed changes
    write_delay: Duration,
    memory_mb: Option<u64>,
    framebuffer: Option<(u32, u32)>,
    burned_mac: Option<String>,
    server_identifier: Option<String>,
    commit_ok: bool,
    link_speed: u32,
    link_broken: bool,
    local_address: Ipv4Addr,
    local_failures: u32,
    companion: Ipv4Addr,
    companion_failures: u32,
    usb_ports: HashMap<String, UsbAttachment>,
    usb_passes: Vec<u32>,
    logs: Vec<(LogKind, String)>,
    calls: HashMap<&'static str, u32>,
}

impl Default for BoardState {
    fn default() -> Self {
        let storage = [
            (DeviceClass::Emmc, Script::always(170)),
            (DeviceClass::Sdmmc, Script::always(80)),
            (DeviceClass::Sata, Script::always(520)),
            (DeviceClass::Nvme, Script::always(1500)),
        ]
        .into_iter()
        .collect();
        Self {
            storage,
            iperf: Script::always(940),
            usb_read: Script::always(110),
            bench_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            memory_mb: Some(7_800),
            framebuffer: Some((1920, 1080)),
            burned_mac: Some("001e06510029".to_string()),
            server_identifier: None,
            commit_ok: true,
            link_speed: 1000,
            link_broken: false,
            local_address: Ipv4Addr::new(192, 168, 0, 23),
            local_failures: 0,
            companion: Ipv4Addr::new(192, 168, 0, 10),
            companion_failures: 0,
            usb_ports: HashMap::new(),
            usb_passes: Vec::new(),
            logs: Vec::new(),
            calls: HashMap::new(),
        }
    }
}

/// Scripted stand-in for every board capability
#[derive(Default)]
pub struct FakeBoard {
    state: Mutex<BoardState>,
}

impl FakeBoard {
    /// A healthy board: every probe passes
    pub fn new() -> Self {
        Self::default()
    }

    /// Capability set backed by this board
    pub fn capabilities(self: &Arc<Self>) -> Capabilities {
        Capabilities {
            storage: self.clone(),
            net_bench: self.clone(),
            link: self.clone(),
            identity: self.clone(),
            network: self.clone(),
            log_sink: self.clone(),
            system: self.clone(),
            usb: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: &'static str) {
        *self.lock().calls.entry(call).or_default() += 1;
    }

    pub fn set_storage(&self, class: DeviceClass, readings: &[Option<u32>]) {
        self.lock().storage.insert(class, Script::new(readings));
    }

    pub fn set_iperf(&self, readings: &[Option<u32>]) {
        self.lock().iperf = Script::new(readings);
    }

    pub fn set_usb_read(&self, readings: &[Option<u32>]) {
        self.lock().usb_read = Script::new(readings);
    }

    pub fn set_bench_delay(&self, delay: Duration) {
        self.lock().bench_delay = delay;
    }

    /// Make efuse commits and link speed changes take `delay`
    pub fn set_write_delay(&self, delay: Duration) {
        self.lock().write_delay = delay;
    }

    pub fn set_memory_mb(&self, mb: Option<u64>) {
        self.lock().memory_mb = mb;
    }

    pub fn set_framebuffer(&self, size: Option<(u32, u32)>) {
        self.lock().framebuffer = size;
    }

    /// MAC (12 hex digits) readable from the efuse; `None` when unreadable
    pub fn set_burned_mac(&self, mac: Option<&str>) {
        self.lock().burned_mac = mac.map(str::to_string);
    }

    pub fn set_server_identifier(&self, identifier: Option<&str>) {
        self.lock().server_identifier = identifier.map(str::to_string);
    }

    pub fn set_commit_ok(&self, ok: bool) {
        self.lock().commit_ok = ok;
    }

    pub fn set_link_speed(&self, mbps: u32) {
        self.lock().link_speed = mbps;
    }

    /// Speed changes are never confirmed
    pub fn break_link(&self) {
        self.lock().link_broken = true;
    }

    /// Fail the next `n` local address lookups
    pub fn set_local_failures(&self, n: u32) {
        self.lock().local_failures = n;
    }

    /// Fail the next `n` companion lookups
    pub fn set_companion_failures(&self, n: u32) {
        self.lock().companion_failures = n;
    }

    /// Plug a mass-storage device into `port`
    pub fn attach_usb(&self, port: &str, speed_mbps: u32) {
        let letter = (b'a' + self.lock().usb_ports.len() as u8) as char;
        self.lock().usb_ports.insert(
            port.to_string(),
            UsbAttachment {
                port: port.to_string(),
                speed_mbps,
                block_device: PathBuf::from(format!("/dev/sd{}", letter)),
            },
        );
    }

    pub fn link_speed(&self) -> u32 {
        self.lock().link_speed
    }

    /// Log messages sent so far
    pub fn logs(&self) -> Vec<(LogKind, String)> {
        self.lock().logs.clone()
    }

    /// Read passes requested from USB benchmarks so far
    pub fn usb_passes(&self) -> Vec<u32> {
        self.lock().usb_passes.clone()
    }

    /// How many times `call` was made
    pub fn calls(&self, call: &str) -> u32 {
        self.lock().calls.get(call).copied().unwrap_or(0)
    }

    async fn bench_delay(&self) {
        let delay = self.lock().bench_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn write_delay(&self) {
        let delay = self.lock().write_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn scripted_failure(what: &str) -> LineCheckError {
    LineCheckError::Tool {
        tool: what.to_string(),
        reason: "scripted failure".to_string(),
    }
}

#[async_trait]
impl StorageBench for FakeBoard {
    async fn measure(&self, class: DeviceClass) -> Result<Measurement> {
        self.record("measure");
        self.bench_delay().await;
        let reading = self
            .lock()
            .storage
            .get_mut(&class)
            .and_then(Script::next);
        let mbs = reading.ok_or_else(|| scripted_failure("dd"))?;
        Ok(Measurement::new(mbs, format!("{} MB/s", mbs)))
    }

    async fn read_speed(&self, _node: &Path, passes: u32) -> Result<u32> {
        self.record("read_speed");
        self.lock().usb_passes.push(passes);
        self.bench_delay().await;
        let reading = self.lock().usb_read.next();
        reading.ok_or_else(|| scripted_failure("dd"))
    }
}

#[async_trait]
impl NetBench for FakeBoard {
    async fn throughput(&self, _server: IpAddr) -> Result<u32> {
        self.record("throughput");
        self.bench_delay().await;
        let reading = self.lock().iperf.next();
        reading.ok_or_else(|| scripted_failure("iperf3"))
    }
}

#[async_trait]
impl LinkControl for FakeBoard {
    async fn current_speed(&self) -> Result<Option<u32>> {
        Ok(Some(self.lock().link_speed))
    }

    async fn set_speed(&self, mbps: u32) -> Result<SpeedChange> {
        self.record("set_speed");
        if self.lock().link_speed == mbps {
            return Ok(SpeedChange::AlreadySet);
        }
        self.write_delay().await;
        self.record("set_speed:done");
        let mut state = self.lock();
        if state.link_broken {
            return Ok(SpeedChange::Failed);
        }
        state.link_speed = mbps;
        Ok(SpeedChange::Changed)
    }
}

#[async_trait]
impl IdentityProvider for FakeBoard {
    async fn read_burned_identifier(&self) -> Result<Option<String>> {
        self.record("read_burned_identifier");
        Ok(self.lock().burned_mac.clone())
    }

    async fn request_identifier_from_server(&self, _board: &str) -> Result<String> {
        self.record("request_identifier_from_server");
        self.lock()
            .server_identifier
            .clone()
            .ok_or_else(|| LineCheckError::Network("MAC server unreachable".to_string()))
    }

    async fn commit_identifier(&self, _identifier: &str) -> Result<bool> {
        self.record("commit_identifier");
        self.write_delay().await;
        self.record("commit_identifier:done");
        Ok(self.lock().commit_ok)
    }
}

#[async_trait]
impl NetworkIdentity for FakeBoard {
    async fn discover_local_address(&self) -> Result<Ipv4Addr> {
        self.record("discover_local_address");
        let mut state = self.lock();
        if state.local_failures > 0 {
            state.local_failures -= 1;
            return Err(LineCheckError::Network("eth0 has no IPv4 address".to_string()));
        }
        Ok(state.local_address)
    }

    async fn discover_companion_server(&self, _local: Ipv4Addr) -> Result<Ipv4Addr> {
        self.record("discover_companion_server");
        let mut state = self.lock();
        if state.companion_failures > 0 {
            state.companion_failures -= 1;
            return Err(LineCheckError::Network("no companion server".to_string()));
        }
        Ok(state.companion)
    }
}

#[async_trait]
impl LogSink for FakeBoard {
    async fn send_log_message(
        &self,
        _server: Ipv4Addr,
        kind: LogKind,
        payload: &str,
    ) -> Result<()> {
        self.lock().logs.push((kind, payload.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SystemInfo for FakeBoard {
    async fn memory_mb(&self) -> Result<u64> {
        self.lock()
            .memory_mb
            .ok_or_else(|| LineCheckError::ResourceUnavailable("/proc/meminfo".to_string()))
    }

    async fn framebuffer_size(&self) -> Result<(u32, u32)> {
        self.lock()
            .framebuffer
            .ok_or_else(|| LineCheckError::ResourceUnavailable("fb0".to_string()))
    }
}

#[async_trait]
impl UsbBus for FakeBoard {
    async fn is_occupied(&self, port: &str) -> Result<bool> {
        Ok(self.lock().usb_ports.contains_key(port))
    }

    async fn attachment(&self, port: &str) -> Result<Option<UsbAttachment>> {
        Ok(self.lock().usb_ports.get(port).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_repeats_last_reading() {
        let board = FakeBoard::new();
        board.set_iperf(&[None, Some(500), Some(900)]);
        let server = IpAddr::V4(Ipv4Addr::LOCALHOST);

        assert!(board.throughput(server).await.is_err());
        assert_eq!(board.throughput(server).await.unwrap(), 500);
        assert_eq!(board.throughput(server).await.unwrap(), 900);
        assert_eq!(board.throughput(server).await.unwrap(), 900);
        assert_eq!(board.calls("throughput"), 4);
    }

    #[tokio::test]
    async fn test_link_speed_changes() {
        let board = FakeBoard::new();
        assert_eq!(board.set_speed(1000).await.unwrap(), SpeedChange::AlreadySet);
        assert_eq!(board.set_speed(100).await.unwrap(), SpeedChange::Changed);
        assert_eq!(board.link_speed(), 100);

        board.break_link();
        assert_eq!(board.set_speed(1000).await.unwrap(), SpeedChange::Failed);
        assert_eq!(board.link_speed(), 100);
    }

    #[tokio::test]
    async fn test_usb_attachments_get_distinct_nodes() {
        let board = FakeBoard::new();
        board.attach_usb("8-1", 5000);
        board.attach_usb("1-1", 480);

        let first = board.attachment("8-1").await.unwrap().unwrap();
        let second = board.attachment("1-1").await.unwrap().unwrap();
        assert_ne!(first.block_device, second.block_device);
        assert!(board.attachment("2-1").await.unwrap().is_none());
    }
}
