//! Probes: one concurrent task per test item
//!
//! Every probe owns the single [`ItemHandle`] of its item and drives it from
//! Waiting to a terminal status. Two shapes exist:
//!
//! - retry-until-threshold ([`retry::retry_until`]): storage, iperf
//! - event-driven wait ([`wait`]): jack, button, IR, Ethernet, USB
//!
//! Probes never return errors. Failing external calls become failing
//! measurements, and a halted run leaves Waiting items alone while Running
//! ones end Stopped.

pub mod ethernet;
pub mod events;
pub mod identity;
pub mod iperf;
pub mod retry;
pub mod storage;
pub mod system;
pub mod usb;
pub mod wait;

use async_trait::async_trait;
use linecheck_core::{
    DeviceClass, HaltReason, ItemHandle, ItemId, ItemStatus, ItemTable, LineCheckError, Outcome,
    Result, StaticConfig, StopSignal,
};
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::capabilities::Capabilities;
use crate::sources::EventBus;

pub use ethernet::EthernetProbe;
pub use events::{ButtonProbe, IrProbe, JackProbe};
pub use identity::EfuseProbe;
pub use iperf::IperfProbe;
pub use storage::StorageProbe;
pub use system::{DisplayProbe, MemoryProbe};
pub use usb::UsbProbe;

/// Held for as long as a probe needs the Ethernet link to itself
pub type LinkLock = Arc<Mutex<()>>;

/// Everything a probe may touch besides its own item
#[derive(Clone)]
pub struct ProbeContext {
    pub config: Arc<StaticConfig>,
    pub caps: Capabilities,
    pub stop: StopSignal,
    pub link: LinkLock,
    /// Companion server resolved during bootstrap
    pub companion: Ipv4Addr,
}

#[async_trait]
pub trait Probe: Send {
    fn item(&self) -> ItemId;

    /// Drive `handle` to a terminal status, or give it up on halt
    async fn run(self: Box<Self>, handle: ItemHandle, ctx: ProbeContext);
}

/// The full probe set for one run.
///
/// Event-driven probes subscribe here, before any source runs, so no event
/// published after launch can be missed.
pub fn build_probes(config: &StaticConfig, bus: &EventBus) -> Vec<Box<dyn Probe>> {
    let usb = &config.usb;
    let thresholds = &config.thresholds;
    vec![
        Box::new(IperfProbe),
        Box::new(EfuseProbe),
        Box::new(MemoryProbe),
        Box::new(DisplayProbe),
        Box::new(StorageProbe::new(ItemId::EmmcSpeed, DeviceClass::Emmc)),
        Box::new(StorageProbe::new(ItemId::SataSpeed, DeviceClass::Sata)),
        Box::new(StorageProbe::new(ItemId::NvmeSpeed, DeviceClass::Nvme)),
        Box::new(UsbProbe::usb3(ItemId::Usb30Up, usb.usb3_up.clone(), thresholds.usb3)),
        Box::new(UsbProbe::usb3(ItemId::Usb30Down, usb.usb3_down.clone(), thresholds.usb3)),
        Box::new(UsbProbe::usb2(ItemId::Usb20Up, usb.usb2_up.clone(), thresholds.usb2)),
        Box::new(UsbProbe::usb2(ItemId::Usb20Down, usb.usb2_down.clone(), thresholds.usb2)),
        Box::new(EthernetProbe::green(bus.ir())),
        Box::new(EthernetProbe::orange(bus.ir())),
        Box::new(JackProbe::inserted(bus.jack())),
        Box::new(JackProbe::removed(bus.jack())),
        Box::new(ButtonProbe::pressed(bus.button())),
        Box::new(ButtonProbe::released(bus.button())),
        Box::new(IrProbe::new(bus.ir())),
    ]
}

/// Claim each probe's item and spawn it
pub fn launch(
    probes: Vec<Box<dyn Probe>>,
    table: &Arc<ItemTable>,
    ctx: &ProbeContext,
) -> Result<JoinSet<()>> {
    let mut tasks = JoinSet::new();
    let count = probes.len();
    for probe in probes {
        let handle = table.claim(probe.item())?;
        tasks.spawn(probe.run(handle, ctx.clone()));
    }
    info!("Launched {} probes", count);
    Ok(tasks)
}

/// Await `work` unless the run halts first
pub async fn interruptible<T>(
    stop: &mut StopSignal,
    work: impl Future<Output = T>,
) -> std::result::Result<T, HaltReason> {
    if let Some(reason) = stop.reason() {
        return Err(reason);
    }
    tokio::select! {
        output = work => Ok(output),
        reason = stop.halted() => Err(reason),
    }
}

/// Run a hardware write on its own task and wait for it.
///
/// A halt or an abort of the calling probe leaves the write running until
/// it completes or hits its tool timeout, so a device is never left
/// half-written.
pub async fn shielded<T: Send + 'static>(
    write: impl Future<Output = Result<T>> + Send + 'static,
) -> Result<T> {
    tokio::spawn(write)
        .await
        .map_err(|e| LineCheckError::Other(format!("Write task failed: {}", e)))?
}

/// Give up on an item because the run halted: a Running item ends Stopped,
/// a Waiting one is left as it is.
pub fn abandon(handle: ItemHandle, reason: HaltReason) {
    let id = handle.id();
    if handle.status() == ItemStatus::Running {
        handle.complete(Outcome::stopped(None));
        debug!("{} stopped ({:?})", id, reason);
    } else {
        debug!("{} abandoned while waiting ({:?})", id, reason);
    }
}

/// Short display text for a failed external call
pub fn error_text(err: &LineCheckError) -> String {
    match err {
        LineCheckError::ResourceUnavailable(_) => "no device".to_string(),
        LineCheckError::Timeout(_) => "timeout".to_string(),
        LineCheckError::Tool { tool, .. } => format!("{} failed", tool),
        LineCheckError::Network(_) => "network error".to_string(),
        _ => "error".to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use linecheck_core::StopLatch;
    use std::time::Duration;

    #[test]
    fn test_probe_set_covers_every_item_once() {
        let bus = EventBus::new();
        let probes = build_probes(&StaticConfig::default(), &bus);
        let mut items: Vec<ItemId> = probes.iter().map(|p| p.item()).collect();
        items.sort();
        assert_eq!(items, ItemId::ALL.to_vec());
    }

    #[test]
    fn test_abandon_leaves_waiting_items() {
        let table = Arc::new(ItemTable::new());
        abandon(table.claim(ItemId::HpIn).unwrap(), HaltReason::EmergencyStop);
        assert_eq!(table.status(ItemId::HpIn), ItemStatus::Waiting);

        let handle = table.claim(ItemId::SataSpeed).unwrap();
        handle.start();
        abandon(handle, HaltReason::EmergencyStop);
        let item = table.get(ItemId::SataSpeed);
        assert_eq!(item.status, ItemStatus::Stopped);
        assert!(!item.result);
    }

    #[tokio::test]
    async fn test_interruptible() {
        let latch = StopLatch::new();
        let mut stop = latch.signal();
        assert_eq!(interruptible(&mut stop, async { 7 }).await, Ok(7));

        let halt = {
            let latch = latch.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                latch.emergency_stop();
            }
        };
        tokio::spawn(halt);
        let stuck = interruptible(&mut stop, std::future::pending::<()>()).await;
        assert_eq!(stuck, Err(HaltReason::EmergencyStop));
    }

    #[tokio::test]
    async fn test_shielded_write_outlives_its_caller() {
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let caller = tokio::spawn(shielded(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(done.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_error_text_is_short() {
        let err = LineCheckError::Tool {
            tool: "dd".to_string(),
            reason: "exit status 1: dd: /dev/nvme0n1: No such file or directory".to_string(),
        };
        assert_eq!(error_text(&err), "dd failed");
        assert_eq!(
            error_text(&LineCheckError::ResourceUnavailable("/dev/sda".to_string())),
            "no device"
        );
    }
}
