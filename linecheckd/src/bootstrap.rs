//! Network bootstrap
//!
//! Before any probe runs, the board needs its own address and the address of
//! the companion server (iperf peer and log sink). Both are retried until
//! they resolve or the run halts, with the two address widgets blinking
//! "Network Error!" in the meantime.

use linecheck_core::{
    ColorCategory, DisplayBinding, StaticConfig, StopSignal, BOARD_ADDRESS_BINDING,
    COMPANION_BINDING,
};
use std::net::Ipv4Addr;
use tracing::{info, warn};

use crate::capabilities::Capabilities;
use crate::probes::interruptible;
use crate::reporter::Reporter;

/// Text painted on an address widget that could not be resolved
pub const NETWORK_ERROR: &str = "Network Error!";

/// Addresses resolved during bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub local: Ipv4Addr,
    pub companion: Ipv4Addr,
}

/// Resolve the board and companion addresses.
///
/// Returns `None` only if the run halted before both were known.
pub async fn bootstrap(
    config: &StaticConfig,
    caps: &Capabilities,
    reporter: &dyn Reporter,
    stop: &mut StopSignal,
) -> Option<Endpoints> {
    let speed = config.network.bootstrap_speed;
    match interruptible(stop, caps.link.set_speed(speed)).await {
        Ok(Ok(change)) => info!("Link forced to {} Mb/s: {:?}", speed, change),
        Ok(Err(e)) => warn!("Could not force link to {} Mb/s: {}", speed, e),
        Err(_) => return None,
    }

    let retry = config.probe.bootstrap_retry();

    let mut attempt = 0u32;
    let local = loop {
        match interruptible(stop, caps.network.discover_local_address()).await {
            Ok(Ok(local)) => break local,
            Ok(Err(e)) => warn!("Board address unavailable: {}", e),
            Err(_) => return None,
        }
        show_error(reporter, BOARD_ADDRESS_BINDING, attempt);
        attempt += 1;
        if stop.sleep(retry).await.is_some() {
            return None;
        }
    };
    show_address(reporter, BOARD_ADDRESS_BINDING, local);
    info!("Board address {}", local);

    let mut attempt = 0u32;
    let companion = loop {
        match interruptible(stop, caps.network.discover_companion_server(local)).await {
            Ok(Ok(companion)) => break companion,
            Ok(Err(e)) => warn!("Companion server unavailable: {}", e),
            Err(_) => return None,
        }
        show_error(reporter, COMPANION_BINDING, attempt);
        attempt += 1;
        if stop.sleep(retry).await.is_some() {
            return None;
        }
    };
    show_address(reporter, COMPANION_BINDING, companion);
    info!("Companion server {}", companion);

    Some(Endpoints { local, companion })
}

fn show_error(reporter: &dyn Reporter, binding: DisplayBinding, attempt: u32) {
    let color = if attempt % 2 == 0 {
        ColorCategory::Red
    } else {
        ColorCategory::DimGray
    };
    reporter.set_item_text(binding, NETWORK_ERROR);
    reporter.set_item_color(binding, color);
    reporter.refresh();
}

fn show_address(reporter: &dyn Reporter, binding: DisplayBinding, address: Ipv4Addr) {
    reporter.set_item_text(binding, &address.to_string());
    reporter.set_item_color(binding, ColorCategory::Green);
    reporter.refresh();
}
