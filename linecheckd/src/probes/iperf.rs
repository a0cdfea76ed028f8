//! Network throughput probe
//!
//! The companion server is told to start its iperf session before the
//! measurement and to stop it afterwards, with a settle delay on both sides.
//! The Ethernet link is held for the whole session.

use async_trait::async_trait;
use linecheck_core::{ItemHandle, ItemId, LogKind, Measurement, Outcome};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

use super::retry::{retry_until, Attempts, RetryPolicy};
use super::{abandon, interruptible, Probe, ProbeContext};

pub struct IperfProbe;

impl IperfProbe {
    async fn notify(ctx: &ProbeContext, command: &str) {
        if let Err(e) = ctx
            .caps
            .log_sink
            .send_log_message(ctx.companion, LogKind::Udp, command)
            .await
        {
            warn!("iperf '{}' not delivered to {}: {}", command, ctx.companion, e);
        }
    }
}

#[async_trait]
impl Probe for IperfProbe {
    fn item(&self) -> ItemId {
        ItemId::IperfSpeed
    }

    async fn run(self: Box<Self>, handle: ItemHandle, mut ctx: ProbeContext) {
        let link = Arc::clone(&ctx.link);
        let busy = match interruptible(&mut ctx.stop, link.lock()).await {
            Ok(guard) => guard,
            Err(reason) => return abandon(handle, reason),
        };
        handle.start();

        Self::notify(&ctx, "start").await;
        let settle = ctx.config.probe.settle();
        if let Some(reason) = ctx.stop.sleep(settle).await {
            Self::notify(&ctx, "stop").await;
            return abandon(handle, reason);
        }

        let threshold = ctx.config.thresholds.iperf();
        let policy = RetryPolicy {
            budget: ctx.config.probe.iperf_retry_count,
            backoff: settle,
            threshold,
        };
        let bench = Arc::clone(&ctx.caps.net_bench);
        let server = IpAddr::V4(ctx.companion);
        let attempts = retry_until(&handle, &mut ctx.stop, policy, move || {
            let bench = Arc::clone(&bench);
            async move {
                let mbits = bench.throughput(server).await?;
                Ok(Measurement::new(mbits, format!("{} MBits/sec", mbits)))
            }
        })
        .await;

        // the server side must not be left running on any path
        if !ctx.stop.is_set() {
            let _ = ctx.stop.sleep(settle).await;
        }
        Self::notify(&ctx, "stop").await;
        // free the link before the item turns terminal
        drop(busy);

        match attempts {
            Attempts::Completed { measurement, used } => {
                let pass = threshold.passes(measurement.value);
                info!(
                    "iperf: {} after {} attempt(s): {}",
                    measurement.text,
                    used,
                    if pass { "pass" } else { "fail" }
                );
                handle.complete(Outcome::finished(pass, Some(measurement.text)));
            }
            Attempts::Halted(reason) => abandon(handle, reason),
        }
    }
}
