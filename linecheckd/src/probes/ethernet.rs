//! Ethernet LED / speed-switch items
//!
//! The operator switches the link from the IR remote: VOLUMEDOWN to 100 Mb/s
//! (green LED), then VOLUMEUP back to 1000 Mb/s (orange LED). A key press is
//! ignored while another probe holds the link, and the orange switch is only
//! accepted once the green one is graded.

use async_trait::async_trait;
use linecheck_core::{ItemHandle, ItemId, Outcome};
use linecheck_hardware::input::{KEY_VOLUMEDOWN, KEY_VOLUMEUP};
use linecheck_hardware::SpeedChange;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::wait::next_key;
use super::{abandon, error_text, shielded, Probe, ProbeContext};

pub struct EthernetProbe {
    item: ItemId,
    key: u16,
    speed: u32,
    keys: broadcast::Receiver<u16>,
}

impl EthernetProbe {
    pub fn green(keys: broadcast::Receiver<u16>) -> Self {
        Self {
            item: ItemId::EthGreen,
            key: KEY_VOLUMEDOWN,
            speed: 100,
            keys,
        }
    }

    pub fn orange(keys: broadcast::Receiver<u16>) -> Self {
        Self {
            item: ItemId::EthOrange,
            key: KEY_VOLUMEUP,
            speed: 1000,
            keys,
        }
    }

    fn prerequisite_met(&self, handle: &ItemHandle) -> bool {
        self.item != ItemId::EthOrange || handle.table().get(ItemId::EthGreen).is_terminal()
    }
}

#[async_trait]
impl Probe for EthernetProbe {
    fn item(&self) -> ItemId {
        self.item
    }

    async fn run(mut self: Box<Self>, handle: ItemHandle, mut ctx: ProbeContext) {
        let poll = ctx.config.probe.event_poll();
        let link = Arc::clone(&ctx.link);
        loop {
            let code = match next_key(&mut self.keys, &mut ctx.stop, poll).await {
                Ok(code) => code,
                Err(reason) => return abandon(handle, reason),
            };
            if code != self.key {
                continue;
            }
            if !self.prerequisite_met(&handle) {
                debug!("{}: ignored until ETH_G is graded", self.item);
                continue;
            }
            let Ok(busy) = Arc::clone(&link).try_lock_owned() else {
                info!("{}: link busy, switch ignored", self.item);
                continue;
            };

            handle.start();
            info!("{}: switching link to {} Mb/s", self.item, self.speed);
            // switch and verification run to completion, holding the link
            let control = Arc::clone(&ctx.caps.link);
            let speed = self.speed;
            let change = shielded(async move {
                let _busy = busy;
                control.set_speed(speed).await
            })
            .await;
            if let Some(reason) = ctx.stop.reason() {
                return abandon(handle, reason);
            }
            let outcome = match change {
                Ok(SpeedChange::AlreadySet) => {
                    info!("{}: link already at {} Mb/s", self.item, self.speed);
                    continue;
                }
                Ok(SpeedChange::Changed) => Outcome::pass(format!("{}M", self.speed)),
                Ok(SpeedChange::Failed) => {
                    warn!("{}: {} Mb/s never confirmed", self.item, self.speed);
                    Outcome::fail(format!("{}M no link", self.speed))
                }
                Err(e) => {
                    warn!("{}: speed switch failed: {}", self.item, e);
                    Outcome::fail(error_text(&e))
                }
            };
            handle.complete(outcome);
            return;
        }
    }
}
