//! Process-wide halt latch
//!
//! One latch per run. The IR event source latches it with
//! [`HaltReason::EmergencyStop`] when the operator presses the stop key; the
//! supervisor latches it with [`HaltReason::RunEnded`] once the run is
//! terminal so the remaining probes and sources wind down. The first reason
//! wins and the latch is never cleared.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Why the run was halted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// Operator abort
    EmergencyStop,
    /// The supervisor declared Finished or Stopped
    RunEnded,
}

/// Setter side of the latch
#[derive(Clone)]
pub struct StopLatch {
    tx: Arc<watch::Sender<Option<HaltReason>>>,
}

impl StopLatch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Latch `reason` unless already latched. Returns whether this call set it.
    pub fn trigger(&self, reason: HaltReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }

    pub fn emergency_stop(&self) -> bool {
        self.trigger(HaltReason::EmergencyStop)
    }

    pub fn reason(&self) -> Option<HaltReason> {
        *self.tx.borrow()
    }

    pub fn is_set(&self) -> bool {
        self.reason().is_some()
    }

    pub fn is_emergency(&self) -> bool {
        self.reason() == Some(HaltReason::EmergencyStop)
    }

    /// Observer handle for probes and event sources
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StopLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the latch
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<Option<HaltReason>>,
}

impl StopSignal {
    pub fn is_set(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<HaltReason> {
        *self.rx.borrow()
    }

    /// Resolve once the latch is set. Never resolves if the latch is dropped unset.
    pub async fn halted(&mut self) -> HaltReason {
        let reason = match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => None,
        };
        match reason {
            Some(reason) => reason,
            None => std::future::pending().await,
        }
    }

    /// Sleep for `duration` unless the latch fires first.
    ///
    /// Returns the halt reason when interrupted.
    pub async fn sleep(&mut self, duration: Duration) -> Option<HaltReason> {
        if let Some(reason) = self.reason() {
            return Some(reason);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => None,
            reason = self.halted() => Some(reason),
        }
    }
}
