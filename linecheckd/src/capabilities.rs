//! The set of hardware capabilities handed to bootstrap and probes

use linecheck_core::{Result, StaticConfig};
use linecheck_hardware::{
    DdBench, EfuseIdentity, EthtoolLink, HttpLogSink, IdentityProvider, Iperf3, LanDiscovery,
    LinkControl, LogSink, NetBench, NetworkIdentity, StorageBench, SysfsSystem, SysfsUsb,
    SystemInfo, SystemRunner, ToolRunner, UsbBus,
};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct Capabilities {
    pub storage: Arc<dyn StorageBench>,
    pub net_bench: Arc<dyn NetBench>,
    pub link: Arc<dyn LinkControl>,
    pub identity: Arc<dyn IdentityProvider>,
    pub network: Arc<dyn NetworkIdentity>,
    pub log_sink: Arc<dyn LogSink>,
    pub system: Arc<dyn SystemInfo>,
    pub usb: Arc<dyn UsbBus>,
}

impl Capabilities {
    /// Real implementations backed by sysfs, external tools and HTTP
    pub fn linux(config: &StaticConfig) -> Result<Self> {
        let timeout = config.probe.tool_timeout();
        let runner: Arc<dyn ToolRunner> = Arc::new(SystemRunner::new(timeout));
        debug!("External tool timeout: {:?}", timeout);

        Ok(Self {
            storage: Arc::new(DdBench::new(runner.clone(), config.storage.clone())),
            net_bench: Arc::new(Iperf3::new(runner.clone(), &config.network)),
            link: Arc::new(EthtoolLink::new(
                runner.clone(),
                &config.network,
                &config.system,
                &config.probe,
            )),
            identity: Arc::new(EfuseIdentity::new(
                runner.clone(),
                config.identity.clone(),
                timeout,
            )?),
            network: Arc::new(LanDiscovery::new(runner, &config.network)),
            log_sink: Arc::new(HttpLogSink::new(config.network.companion_port, timeout)?),
            system: Arc::new(SysfsSystem::new(config.system.clone())),
            usb: Arc::new(SysfsUsb::new(config.system.usb_devices.clone())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_linux_capabilities_build_from_defaults() {
        assert!(Capabilities::linux(&StaticConfig::default()).is_ok());
    }
}
