//! Supervisor: the tick loop around the run state machine
//!
//! The supervisor is the only reader of the whole item table and the only
//! writer of the reporter and of [`RunState`]. On every tick it hands a
//! snapshot to the [`Aggregator`], forwards the resulting display events,
//! refreshes the reporter and publishes the new state. It never awaits a
//! probe.

use linecheck_core::config::RunConfig;
use linecheck_core::{
    Aggregator, HaltReason, ItemId, ItemTable, LogKind, RunState, RunSummary, StopLatch,
    ERROR_LINE_MAX,
};
use linecheck_hardware::LogSink;
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::probes::identity::UNKNOWN_MAC;
use crate::reporter::{apply, Reporter};

pub struct Supervisor {
    aggregator: Aggregator,
    table: Arc<ItemTable>,
    reporter: Arc<dyn Reporter>,
    latch: StopLatch,
    state: watch::Sender<RunState>,
    tick_interval: Duration,
    park_refresh: Duration,
}

impl Supervisor {
    pub fn new(
        config: &RunConfig,
        table: Arc<ItemTable>,
        reporter: Arc<dyn Reporter>,
        latch: StopLatch,
        state: watch::Sender<RunState>,
    ) -> Self {
        let aggregator = Aggregator::new(config.timeout_ticks, config.countdown_divisor);
        state.send_replace(aggregator.state().clone());
        Self {
            aggregator,
            table,
            reporter,
            latch,
            state,
            tick_interval: config.tick_interval(),
            park_refresh: config.park_refresh(),
        }
    }

    pub fn state(&self) -> &RunState {
        self.aggregator.state()
    }

    /// Items that went terminal after the run did
    pub fn late_transitions(&self) -> &[ItemId] {
        self.aggregator.late_transitions()
    }

    /// Tick until the run is terminal, then latch the run-ended halt.
    ///
    /// The run leaves Waiting on the first tick after `launched` turns true.
    pub async fn run(&mut self, mut launched: watch::Receiver<bool>) -> RunSummary {
        apply(self.reporter.as_ref(), &self.aggregator.waiting_events());
        self.reporter.refresh();

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if *launched.borrow_and_update() {
                self.aggregator.begin();
            }
            if let Some(summary) = self.tick() {
                info!(
                    "Run {} after {} ticks; failing: [{}]",
                    summary.status,
                    self.state().ticks,
                    summary.error_tags().join(", ")
                );
                if self.latch.trigger(HaltReason::RunEnded) {
                    debug!("Run-ended halt latched");
                }
                return summary;
            }
        }
    }

    /// One aggregation step; returns the summary on the tick the run ends
    pub fn tick(&mut self) -> Option<RunSummary> {
        let snapshot = self.table.snapshot();
        let report = self.aggregator.tick(&snapshot, self.latch.is_emergency());

        apply(self.reporter.as_ref(), &report.events);
        self.reporter.refresh();
        self.state.send_replace(self.aggregator.state().clone());

        for id in &report.late {
            warn!("{} ended after the run was over; not counted", id);
        }
        report.summary
    }

    /// Keep the terminal display alive until `until` resolves
    pub async fn park(&mut self, until: impl Future<Output = ()>) {
        info!("Run over, holding the display");
        tokio::pin!(until);
        let mut interval = tokio::time::interval(self.park_refresh);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut until => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
        info!("Leaving park state");
    }
}

/// Send the identifier, then the failing tags, to the companion's log sink.
///
/// Delivery failures are logged and do not stop the remaining lines.
pub async fn send_final_report(sink: &dyn LogSink, server: Ipv4Addr, summary: &RunSummary) {
    let mac = summary.identifier.as_deref().unwrap_or(UNKNOWN_MAC);
    if let Err(e) = sink.send_log_message(server, LogKind::Mac, mac).await {
        warn!("Failed to report MAC to {}: {}", server, e);
    }
    for line in summary.error_lines(ERROR_LINE_MAX) {
        if let Err(e) = sink.send_log_message(server, LogKind::Err, &line).await {
            warn!("Failed to report errors to {}: {}", server, e);
        }
    }
    info!("Final report sent to {}", server);
}
