//! One-shot board checks: installed memory and display resolution

use async_trait::async_trait;
use linecheck_core::{ItemHandle, ItemId, Outcome};
use linecheck_hardware::classify_memory;
use tracing::{info, warn};

use super::{abandon, interruptible, Probe, ProbeContext};

pub struct MemoryProbe;

#[async_trait]
impl Probe for MemoryProbe {
    fn item(&self) -> ItemId {
        ItemId::BoardMem
    }

    async fn run(self: Box<Self>, handle: ItemHandle, mut ctx: ProbeContext) {
        handle.start();
        let system = ctx.caps.system.clone();
        let total = match interruptible(&mut ctx.stop, system.memory_mb()).await {
            Ok(total) => total,
            Err(reason) => return abandon(handle, reason),
        };
        let gb = match total {
            Ok(mb) => {
                let gb = classify_memory(mb);
                info!("Memory: {} MB total, {} GB class", mb, gb);
                gb
            }
            Err(e) => {
                warn!("Memory size unavailable: {}", e);
                0
            }
        };
        handle.complete(Outcome::finished(gb != 0, Some(format!("{} GB", gb))));
    }
}

pub struct DisplayProbe;

#[async_trait]
impl Probe for DisplayProbe {
    fn item(&self) -> ItemId {
        ItemId::FbSize
    }

    async fn run(self: Box<Self>, handle: ItemHandle, mut ctx: ProbeContext) {
        handle.start();
        let system = ctx.caps.system.clone();
        let size = match interruptible(&mut ctx.stop, system.framebuffer_size()).await {
            Ok(size) => size,
            Err(reason) => return abandon(handle, reason),
        };
        let outcome = match (size, ctx.config.thresholds.expected_resolution()) {
            (Ok((width, height)), Ok(expected)) => {
                let pass = (width, height) == expected;
                info!(
                    "Display: {} x {} (expected {} x {})",
                    width, height, expected.0, expected.1
                );
                Outcome::finished(pass, Some(format!("{} x {}", width, height)))
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Display check failed: {}", e);
                Outcome::fail("no display")
            }
        };
        handle.complete(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testing::Rig;

    #[tokio::test]
    async fn test_memory_classes() {
        for (mb, text, pass) in [
            (Some(7_800), "8 GB", true),
            (Some(3_900), "4 GB", true),
            (Some(1_900), "0 GB", false),
            (None, "0 GB", false),
        ] {
            let rig = Rig::new();
            rig.board.set_memory_mb(mb);
            rig.run(MemoryProbe).await;

            let item = rig.table.get(ItemId::BoardMem);
            assert_eq!(item.verdict(), Some(pass), "{:?}", mb);
            assert_eq!(item.response_text, text);
        }
    }

    #[tokio::test]
    async fn test_display_resolution() {
        let rig = Rig::new();
        rig.run(DisplayProbe).await;
        let item = rig.table.get(ItemId::FbSize);
        assert_eq!(item.verdict(), Some(true));
        assert_eq!(item.response_text, "1920 x 1080");

        let rig = Rig::new();
        rig.board.set_framebuffer(Some((1280, 720)));
        rig.run(DisplayProbe).await;
        let item = rig.table.get(ItemId::FbSize);
        assert_eq!(item.verdict(), Some(false));
        assert_eq!(item.response_text, "1280 x 720");
    }

    #[tokio::test]
    async fn test_display_missing() {
        let rig = Rig::new();
        rig.board.set_framebuffer(None);
        rig.run(DisplayProbe).await;
        let item = rig.table.get(ItemId::FbSize);
        assert_eq!(item.verdict(), Some(false));
        assert_eq!(item.response_text, "no display");
    }
}
