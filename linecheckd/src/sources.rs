//! Event sources
//!
//! Each source owns the sending half of one typed channel and is the only
//! writer of it. Probes subscribe to the receiving half:
//!
//! - jack: `watch` of which transitions have been seen so far
//! - button: `watch` of the press/release stage
//! - IR: `broadcast` of pressed keycodes
//!
//! The IR source is also the only place the emergency stop is latched from.

use linecheck_core::{StopLatch, StopSignal};
use linecheck_hardware::input::{EV_KEY, EV_SW, KEY_HOME, SW_HEADPHONE_INSERT};
use linecheck_hardware::{IdentityProvider, InputEvent};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

/// Keycodes buffered per IR subscriber
const IR_QUEUE_DEPTH: usize = 32;

/// Jack transitions observed since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JackState {
    pub inserted: bool,
    pub removed: bool,
}

/// Button stage. Only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonState {
    #[default]
    Idle,
    Pressed,
    Released,
}

/// Channels between the event sources and the probes
pub struct EventBus {
    jack: Arc<watch::Sender<JackState>>,
    button: Arc<watch::Sender<ButtonState>>,
    ir: broadcast::Sender<u16>,
}

impl EventBus {
    pub fn new() -> Self {
        let (jack, _) = watch::channel(JackState::default());
        let (button, _) = watch::channel(ButtonState::default());
        let (ir, _) = broadcast::channel(IR_QUEUE_DEPTH);
        Self {
            jack: Arc::new(jack),
            button: Arc::new(button),
            ir,
        }
    }

    pub fn jack(&self) -> watch::Receiver<JackState> {
        self.jack.subscribe()
    }

    pub fn button(&self) -> watch::Receiver<ButtonState> {
        self.button.subscribe()
    }

    /// Keycodes pressed from now on
    pub fn ir(&self) -> broadcast::Receiver<u16> {
        self.ir.subscribe()
    }

    pub fn jack_sender(&self) -> Arc<watch::Sender<JackState>> {
        Arc::clone(&self.jack)
    }

    pub fn button_sender(&self) -> Arc<watch::Sender<ButtonState>> {
        Arc::clone(&self.button)
    }

    pub fn ir_sender(&self) -> broadcast::Sender<u16> {
        self.ir.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Publish IR key presses; HOME latches the emergency stop.
///
/// Returns when the device stream ends or the run halts.
pub async fn run_ir_source(
    mut events: mpsc::Receiver<InputEvent>,
    keys: broadcast::Sender<u16>,
    latch: StopLatch,
) {
    let mut stop = latch.signal();
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            reason = stop.halted() => {
                debug!("IR source exiting: {:?}", reason);
                return;
            }
        };
        let Some(event) = event else {
            warn!("IR input stream closed");
            return;
        };
        if event.kind != EV_KEY || event.value != 1 {
            continue;
        }
        debug!("IR key {}", event.code);
        if event.code == KEY_HOME && latch.emergency_stop() {
            warn!("Emergency stop requested from IR remote");
        }
        // no subscribers left is fine
        let _ = keys.send(event.code);
    }
}

/// Record headphone jack transitions
pub async fn run_jack_source(
    mut events: mpsc::Receiver<InputEvent>,
    state: Arc<watch::Sender<JackState>>,
    mut stop: StopSignal,
) {
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = stop.halted() => return,
        };
        let Some(event) = event else {
            warn!("Jack input stream closed");
            return;
        };
        if event.kind != EV_SW || event.code != SW_HEADPHONE_INSERT {
            continue;
        }
        let inserted = event.value != 0;
        info!("Headphone jack {}", if inserted { "inserted" } else { "removed" });
        state.send_modify(|jack| {
            if inserted {
                jack.inserted = true;
            } else {
                jack.removed = true;
            }
        });
    }
}

/// Track the SPI button through the efuse bus it shares: the identifier
/// reads back as missing while the button is held.
pub async fn run_button_source(
    identity: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<ButtonState>>,
    poll: Duration,
    mut stop: StopSignal,
) {
    loop {
        let readable = matches!(identity.read_burned_identifier().await, Ok(Some(_)));
        let current = *state.borrow();
        let next = match (current, readable) {
            (ButtonState::Idle, false) => ButtonState::Pressed,
            (ButtonState::Pressed, true) => ButtonState::Released,
            (stage, _) => stage,
        };
        if next != current {
            info!("SPI button {:?}", next);
            state.send_replace(next);
        }
        if next == ButtonState::Released {
            return;
        }
        if stop.sleep(poll).await.is_some() {
            return;
        }
    }
}
