//! One complete board test run
//!
//! [`LineTest`] wires the pieces together in order: the supervisor starts
//! ticking, bootstrap resolves the network, every probe is built and
//! launched, then the event sources start feeding them. When the supervisor
//! reaches a terminal state the final report goes to the companion server
//! and the caller gets a [`Completed`] run to park on and wind down.

use linecheck_core::{
    HaltReason, ItemTable, LineCheckError, Result, RunState, RunStatus, RunSummary, StaticConfig,
    StopLatch,
};
use linecheck_hardware::InputEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::bootstrap::{bootstrap, Endpoints};
use crate::capabilities::Capabilities;
use crate::probes::{build_probes, launch, ProbeContext};
use crate::reporter::Reporter;
use crate::sources::{run_button_source, run_ir_source, run_jack_source, EventBus};
use crate::supervisor::{send_final_report, Supervisor};

/// Decoded input device streams. A missing device leaves its items Waiting.
#[derive(Default)]
pub struct Inputs {
    pub ir: Option<mpsc::Receiver<InputEvent>>,
    pub jack: Option<mpsc::Receiver<InputEvent>>,
}

pub struct LineTest {
    config: Arc<StaticConfig>,
    caps: Capabilities,
    reporter: Arc<dyn Reporter>,
    inputs: Inputs,
    table: Arc<ItemTable>,
    latch: StopLatch,
    state: watch::Sender<RunState>,
}

impl LineTest {
    pub fn new(config: StaticConfig, caps: Capabilities, reporter: Arc<dyn Reporter>) -> Self {
        let (state, _) = watch::channel(RunState {
            status: RunStatus::Waiting,
            remaining_timeout_ticks: config.run.timeout_ticks,
            emergency_stop: false,
            ticks: 0,
        });
        Self {
            config: Arc::new(config),
            caps,
            reporter,
            inputs: Inputs::default(),
            table: Arc::new(ItemTable::new()),
            latch: StopLatch::new(),
            state,
        }
    }

    pub fn with_inputs(mut self, inputs: Inputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn table(&self) -> Arc<ItemTable> {
        Arc::clone(&self.table)
    }

    pub fn latch(&self) -> StopLatch {
        self.latch.clone()
    }

    /// Run state as published by the supervisor
    pub fn run_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Drive the run to a terminal state and send the final report
    pub async fn run(self) -> Result<Completed> {
        let LineTest {
            config,
            caps,
            reporter,
            inputs,
            table,
            latch,
            state,
        } = self;

        let mut supervisor = Supervisor::new(
            &config.run,
            Arc::clone(&table),
            Arc::clone(&reporter),
            latch.clone(),
            state,
        );
        let (launched, launched_rx) = watch::channel(false);
        let supervise = tokio::spawn(async move {
            let summary = supervisor.run(launched_rx).await;
            (supervisor, summary)
        });

        let mut tasks = JoinSet::new();
        let endpoints = bootstrap(&config, &caps, reporter.as_ref(), &mut latch.signal()).await;
        if let Some(endpoints) = endpoints {
            let bus = EventBus::new();
            let ctx = ProbeContext {
                config: Arc::clone(&config),
                caps: caps.clone(),
                stop: latch.signal(),
                link: Arc::new(Mutex::new(())),
                companion: endpoints.companion,
            };
            tasks = match launch(build_probes(&config, &bus), &table, &ctx) {
                Ok(tasks) => tasks,
                Err(e) => {
                    latch.trigger(HaltReason::RunEnded);
                    supervise.abort();
                    return Err(e);
                }
            };
            launched.send_replace(true);
            spawn_sources(&mut tasks, inputs, &bus, &caps, &config, &latch);
        } else {
            info!("Halted during bootstrap; no probe launched");
        }

        let (supervisor, summary) = supervise
            .await
            .map_err(|e| LineCheckError::Other(format!("Supervisor task failed: {}", e)))?;

        match endpoints {
            Some(Endpoints { companion, .. }) => {
                send_final_report(caps.log_sink.as_ref(), companion, &summary).await
            }
            None => warn!("No companion server known; final report not sent"),
        }

        Ok(Completed {
            summary,
            endpoints,
            supervisor,
            tasks,
            grace: config.run.wind_down_grace(),
        })
    }
}

fn spawn_sources(
    tasks: &mut JoinSet<()>,
    inputs: Inputs,
    bus: &EventBus,
    caps: &Capabilities,
    config: &StaticConfig,
    latch: &StopLatch,
) {
    match inputs.ir {
        Some(events) => {
            tasks.spawn(run_ir_source(events, bus.ir_sender(), latch.clone()));
        }
        None => warn!("No IR input: IR, Ethernet and emergency stop are unavailable"),
    }
    match inputs.jack {
        Some(events) => {
            tasks.spawn(run_jack_source(events, bus.jack_sender(), latch.signal()));
        }
        None => warn!("No headphone jack input: HP_I and HP_O stay waiting"),
    }
    tasks.spawn(run_button_source(
        Arc::clone(&caps.identity),
        bus.button_sender(),
        config.probe.button_poll(),
        latch.signal(),
    ));
    info!("Event sources started");
}

/// A run that reached a terminal state
pub struct Completed {
    pub summary: RunSummary,
    /// `None` when the run halted during bootstrap
    pub endpoints: Option<Endpoints>,
    pub supervisor: Supervisor,
    tasks: JoinSet<()>,
    grace: Duration,
}

impl Completed {
    /// Wait for probes and sources to exit; whatever outlives the grace
    /// period is aborted. Returns how many tasks had to be aborted.
    pub async fn wind_down(&mut self) -> usize {
        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!("Task ended abnormally: {}", e);
                }
            }
        })
        .await;

        if drained.is_ok() {
            info!("All probes and sources exited");
            return 0;
        }
        let left = self.tasks.len();
        warn!("{} tasks still running after {:?}, aborting", left, self.grace);
        self.tasks.abort_all();
        left
    }
}
