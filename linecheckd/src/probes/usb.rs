//! USB port items
//!
//! Each item watches a pair of physical ports and waits for the operator to
//! plug a mass-storage stick into either one. The stick is read once it
//! enumerates; a full-speed (12 Mb/s) link or a slow read stops the item.

use async_trait::async_trait;
use linecheck_core::{ItemHandle, ItemId, Outcome};
use linecheck_hardware::UsbAttachment;
use tracing::{debug, info, warn};

use super::{abandon, error_text, interruptible, Probe, ProbeContext};

/// Link speeds at or below this are a USB 1.1 fallback
const FULL_SPEED_MBPS: u32 = 12;
/// High-speed USB 2.0
const HIGH_SPEED_MBPS: u32 = 480;

/// Read passes over a stick that negotiated the expected speed
const FULL_PASSES: u32 = 5;

pub struct UsbProbe {
    item: ItemId,
    ports: Vec<String>,
    threshold: u32,
    superspeed: bool,
}

impl UsbProbe {
    pub fn usb3(item: ItemId, ports: Vec<String>, threshold: u32) -> Self {
        Self {
            item,
            ports,
            threshold,
            superspeed: true,
        }
    }

    pub fn usb2(item: ItemId, ports: Vec<String>, threshold: u32) -> Self {
        Self {
            item,
            ports,
            threshold,
            superspeed: false,
        }
    }

    /// A USB 3 port that only negotiated 480 gets a single quick pass
    fn passes(&self, speed_mbps: u32) -> u32 {
        if !self.superspeed || speed_mbps > HIGH_SPEED_MBPS {
            FULL_PASSES
        } else {
            1
        }
    }

    async fn find_attachment(&self, ctx: &ProbeContext) -> Option<UsbAttachment> {
        for port in &self.ports {
            match ctx.caps.usb.attachment(port).await {
                Ok(Some(attachment)) => return Some(attachment),
                Ok(None) => {}
                Err(e) => debug!("{}: port {} unreadable: {}", self.item, port, e),
            }
        }
        None
    }

    async fn grade(&self, attachment: &UsbAttachment, ctx: &ProbeContext) -> Outcome {
        let speed = attachment.speed_mbps;
        if speed <= FULL_SPEED_MBPS {
            warn!("{}: {} linked at full speed only", self.item, attachment.port);
            return Outcome::stopped(None);
        }

        let passes = self.passes(speed);
        match ctx
            .caps
            .storage
            .read_speed(&attachment.block_device, passes)
            .await
        {
            Ok(mbs) => {
                let text = format!("{}M - {} MB/s", speed, mbs);
                info!(
                    "{}: {} ({} passes, threshold {})",
                    self.item, text, passes, self.threshold
                );
                if mbs >= self.threshold {
                    Outcome::pass(text)
                } else {
                    Outcome::stopped(Some(text))
                }
            }
            Err(e) => {
                warn!("{}: read of {:?} failed: {}", self.item, attachment.block_device, e);
                Outcome::stopped(Some(error_text(&e)))
            }
        }
    }
}

#[async_trait]
impl Probe for UsbProbe {
    fn item(&self) -> ItemId {
        self.item
    }

    async fn run(self: Box<Self>, handle: ItemHandle, mut ctx: ProbeContext) {
        let poll = ctx.config.probe.usb_poll();
        let attachment = loop {
            if let Some(reason) = ctx.stop.reason() {
                return abandon(handle, reason);
            }
            if let Some(attachment) = self.find_attachment(&ctx).await {
                break attachment;
            }
            if let Some(reason) = ctx.stop.sleep(poll).await {
                return abandon(handle, reason);
            }
        };

        handle.start();
        info!(
            "{}: {} on port {} at {}M",
            self.item,
            attachment.block_device.display(),
            attachment.port,
            attachment.speed_mbps
        );
        let mut stop = ctx.stop.clone();
        match interruptible(&mut stop, self.grade(&attachment, &ctx)).await {
            Ok(outcome) => {
                handle.complete(outcome);
            }
            Err(reason) => abandon(handle, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testing::Rig;
    use linecheck_core::ItemStatus;
    use std::time::Duration;

    fn usb3() -> UsbProbe {
        UsbProbe::usb3(ItemId::Usb30Up, vec!["8-1".into(), "7-1".into()], 60)
    }

    fn usb2() -> UsbProbe {
        UsbProbe::usb2(ItemId::Usb20Up, vec!["1-1".into(), "3-1".into()], 20)
    }

    #[tokio::test]
    async fn test_superspeed_stick_passes() {
        let rig = Rig::new();
        rig.board.attach_usb("7-1", 5000);
        rig.run(usb3()).await;

        let item = rig.table.get(ItemId::Usb30Up);
        assert_eq!(item.verdict(), Some(true));
        assert_eq!(item.response_text, "5000M - 110 MB/s");
        assert_eq!(rig.board.usb_passes(), vec![5]);
    }

    #[tokio::test]
    async fn test_high_speed_on_usb3_port_reads_once() {
        let rig = Rig::new();
        rig.board.set_usb_read(&[Some(35)]);
        rig.board.attach_usb("8-1", 480);
        rig.run(usb3()).await;

        let item = rig.table.get(ItemId::Usb30Up);
        assert_eq!(item.status, ItemStatus::Stopped);
        assert_eq!(item.response_text, "480M - 35 MB/s");
        assert_eq!(rig.board.usb_passes(), vec![1]);
    }

    #[tokio::test]
    async fn test_usb2_threshold() {
        let rig = Rig::new();
        rig.board.set_usb_read(&[Some(20)]);
        rig.board.attach_usb("3-1", 480);
        rig.run(usb2()).await;

        let item = rig.table.get(ItemId::Usb20Up);
        assert_eq!(item.verdict(), Some(true));
        assert_eq!(rig.board.usb_passes(), vec![5]);
    }

    #[tokio::test]
    async fn test_full_speed_stops_without_reading() {
        let rig = Rig::new();
        rig.board.attach_usb("1-1", 12);
        rig.run(usb2()).await;

        let item = rig.table.get(ItemId::Usb20Up);
        assert_eq!(item.status, ItemStatus::Stopped);
        assert!(!item.result);
        assert_eq!(rig.board.calls("read_speed"), 0);
    }

    #[tokio::test]
    async fn test_read_error_stops() {
        let rig = Rig::new();
        rig.board.set_usb_read(&[None]);
        rig.board.attach_usb("1-1", 480);
        rig.run(usb2()).await;

        let item = rig.table.get(ItemId::Usb20Up);
        assert_eq!(item.status, ItemStatus::Stopped);
        assert_eq!(item.response_text, "dd failed");
    }

    #[tokio::test]
    async fn test_waits_for_a_stick() {
        let rig = Rig::new();
        let handle = rig.handle(ItemId::Usb30Up);
        let ctx = rig.ctx.clone();
        let task = tokio::spawn(async move { Box::new(usb3()).run(handle, ctx).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rig.table.status(ItemId::Usb30Up), ItemStatus::Waiting);

        rig.board.attach_usb("8-1", 5000);
        task.await.unwrap();
        assert_eq!(rig.table.get(ItemId::Usb30Up).verdict(), Some(true));
    }

    #[tokio::test]
    async fn test_empty_port_on_emergency_stays_waiting() {
        let rig = Rig::new();
        let handle = rig.handle(ItemId::Usb20Down);
        let ctx = rig.ctx.clone();
        let probe = UsbProbe::usb2(ItemId::Usb20Down, vec!["2-1".into()], 20);
        let task = tokio::spawn(async move { Box::new(probe).run(handle, ctx).await });

        rig.latch.emergency_stop();
        tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rig.table.status(ItemId::Usb20Down), ItemStatus::Waiting);
    }
}
