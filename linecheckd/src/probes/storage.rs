//! Storage read-speed probes (eMMC, SATA, NVMe)

use async_trait::async_trait;
use linecheck_core::{DeviceClass, ItemHandle, ItemId, Outcome};
use std::sync::Arc;
use tracing::info;

use super::retry::{retry_until, Attempts, RetryPolicy};
use super::{abandon, Probe, ProbeContext};

pub struct StorageProbe {
    item: ItemId,
    class: DeviceClass,
}

impl StorageProbe {
    pub fn new(item: ItemId, class: DeviceClass) -> Self {
        Self { item, class }
    }
}

#[async_trait]
impl Probe for StorageProbe {
    fn item(&self) -> ItemId {
        self.item
    }

    async fn run(self: Box<Self>, handle: ItemHandle, mut ctx: ProbeContext) {
        let threshold = ctx.config.thresholds.storage(self.class);
        let policy = RetryPolicy {
            budget: ctx.config.probe.retry_count,
            backoff: ctx.config.probe.backoff(),
            threshold,
        };
        handle.start();

        let bench = Arc::clone(&ctx.caps.storage);
        let class = self.class;
        let attempts = retry_until(&handle, &mut ctx.stop, policy, move || {
            let bench = Arc::clone(&bench);
            async move { bench.measure(class).await }
        })
        .await;

        match attempts {
            Attempts::Completed { measurement, used } => {
                let pass = threshold.passes(measurement.value);
                info!(
                    "{}: {} after {} attempt(s), threshold {} MB/s: {}",
                    self.class,
                    measurement.text,
                    used,
                    threshold.min,
                    if pass { "pass" } else { "fail" }
                );
                handle.complete(Outcome::finished(pass, Some(measurement.text)));
            }
            Attempts::Halted(reason) => abandon(handle, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testing::Rig;
    use linecheck_core::ItemStatus;

    #[tokio::test]
    async fn test_storage_pass() {
        let rig = Rig::new();
        rig.run(StorageProbe::new(ItemId::EmmcSpeed, DeviceClass::Emmc))
            .await;

        let item = rig.table.get(ItemId::EmmcSpeed);
        assert_eq!(item.status, ItemStatus::Finished);
        assert!(item.result);
        assert_eq!(item.response_text, "170 MB/s");
        assert_eq!(rig.board.calls("measure"), 1);
    }

    #[tokio::test]
    async fn test_storage_below_threshold_retries_then_fails() {
        let rig = Rig::new();
        rig.board.set_storage(DeviceClass::Sata, &[Some(390)]);
        rig.run(StorageProbe::new(ItemId::SataSpeed, DeviceClass::Sata))
            .await;

        let item = rig.table.get(ItemId::SataSpeed);
        assert_eq!(item.verdict(), Some(false));
        assert_eq!(item.response_text, "390 MB/s");
        assert_eq!(rig.board.calls("measure"), 5);
    }

    #[tokio::test]
    async fn test_storage_recovers_on_retry() {
        let rig = Rig::new();
        rig.board
            .set_storage(DeviceClass::Nvme, &[None, Some(900), Some(1200)]);
        rig.run(StorageProbe::new(ItemId::NvmeSpeed, DeviceClass::Nvme))
            .await;

        assert_eq!(rig.table.get(ItemId::NvmeSpeed).verdict(), Some(true));
        assert_eq!(rig.board.calls("measure"), 3);
    }

    #[tokio::test]
    async fn test_missing_device_fails_item() {
        let rig = Rig::new();
        rig.board.set_storage(DeviceClass::Nvme, &[None]);
        rig.run(StorageProbe::new(ItemId::NvmeSpeed, DeviceClass::Nvme))
            .await;

        let item = rig.table.get(ItemId::NvmeSpeed);
        assert_eq!(item.status, ItemStatus::Finished);
        assert!(!item.result);
        assert_eq!(item.response_text, "dd failed");
    }
}
