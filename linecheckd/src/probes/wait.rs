//! Event-driven waits
//!
//! Both helpers wake on the channel, on the halt latch, and at least once per
//! poll interval. A source that goes away never wakes them again, so the
//! wait then lasts until the run halts.

use linecheck_core::{HaltReason, StopSignal};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Wait until `ready` holds for the published state
pub async fn wait_for_state<T>(
    state: &mut watch::Receiver<T>,
    stop: &mut StopSignal,
    poll: Duration,
    ready: impl Fn(&T) -> bool,
) -> Result<(), HaltReason> {
    let mut open = true;
    loop {
        if ready(&state.borrow_and_update()) {
            return Ok(());
        }
        if let Some(reason) = stop.reason() {
            return Err(reason);
        }
        tokio::select! {
            changed = state.changed(), if open => {
                if changed.is_err() {
                    debug!("event source closed");
                    open = false;
                }
            }
            reason = stop.halted() => return Err(reason),
            _ = tokio::time::sleep(poll) => {}
        }
    }
}

/// Next keycode published
pub async fn next_key(
    keys: &mut broadcast::Receiver<u16>,
    stop: &mut StopSignal,
    poll: Duration,
) -> Result<u16, HaltReason> {
    let mut open = true;
    loop {
        if let Some(reason) = stop.reason() {
            return Err(reason);
        }
        tokio::select! {
            key = keys.recv(), if open => match key {
                Ok(code) => return Ok(code),
                Err(RecvError::Lagged(skipped)) => debug!("{} keys skipped", skipped),
                Err(RecvError::Closed) => open = false,
            },
            reason = stop.halted() => return Err(reason),
            _ = tokio::time::sleep(poll) => {}
        }
    }
}
