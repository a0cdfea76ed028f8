//! Operator-driven items: headphone jack, SPI button, IR remote
//!
//! These stay Waiting until the operator acts; the first matching event
//! passes them.

use async_trait::async_trait;
use linecheck_core::{ItemHandle, ItemId, Outcome};
use tokio::sync::{broadcast, watch};
use tracing::info;

use super::wait::{next_key, wait_for_state};
use super::{abandon, Probe, ProbeContext};
use crate::sources::{ButtonState, JackState};

pub struct JackProbe {
    item: ItemId,
    state: watch::Receiver<JackState>,
}

impl JackProbe {
    /// HP_I: passes once a plug goes in
    pub fn inserted(state: watch::Receiver<JackState>) -> Self {
        Self {
            item: ItemId::HpIn,
            state,
        }
    }

    /// HP_O: passes once a plug comes out
    pub fn removed(state: watch::Receiver<JackState>) -> Self {
        Self {
            item: ItemId::HpOut,
            state,
        }
    }
}

#[async_trait]
impl Probe for JackProbe {
    fn item(&self) -> ItemId {
        self.item
    }

    async fn run(mut self: Box<Self>, handle: ItemHandle, mut ctx: ProbeContext) {
        let poll = ctx.config.probe.event_poll();
        let want_insert = self.item == ItemId::HpIn;
        let seen = wait_for_state(&mut self.state, &mut ctx.stop, poll, |jack| {
            if want_insert {
                jack.inserted
            } else {
                jack.removed
            }
        })
        .await;
        match seen {
            Ok(()) => {
                info!("{} passed", self.item);
                handle.complete(Outcome::pass("PASS"));
            }
            Err(reason) => abandon(handle, reason),
        }
    }
}

pub struct ButtonProbe {
    item: ItemId,
    stage: ButtonState,
    state: watch::Receiver<ButtonState>,
}

impl ButtonProbe {
    /// BT_DN
    pub fn pressed(state: watch::Receiver<ButtonState>) -> Self {
        Self {
            item: ItemId::SpiBtDown,
            stage: ButtonState::Pressed,
            state,
        }
    }

    /// BT_UP
    pub fn released(state: watch::Receiver<ButtonState>) -> Self {
        Self {
            item: ItemId::SpiBtUp,
            stage: ButtonState::Released,
            state,
        }
    }
}

#[async_trait]
impl Probe for ButtonProbe {
    fn item(&self) -> ItemId {
        self.item
    }

    async fn run(mut self: Box<Self>, handle: ItemHandle, mut ctx: ProbeContext) {
        let poll = ctx.config.probe.event_poll();
        let stage = self.stage;
        // stages only move forward, so a skipped intermediate value is still seen
        let reached = wait_for_state(&mut self.state, &mut ctx.stop, poll, |state| *state >= stage)
            .await;
        match reached {
            Ok(()) => {
                info!("{} passed", self.item);
                handle.complete(Outcome::pass("PASS"));
            }
            Err(reason) => abandon(handle, reason),
        }
    }
}

/// IR_IN: any key on the remote
pub struct IrProbe {
    keys: broadcast::Receiver<u16>,
}

impl IrProbe {
    pub fn new(keys: broadcast::Receiver<u16>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl Probe for IrProbe {
    fn item(&self) -> ItemId {
        ItemId::IrInput
    }

    async fn run(mut self: Box<Self>, handle: ItemHandle, mut ctx: ProbeContext) {
        let poll = ctx.config.probe.event_poll();
        match next_key(&mut self.keys, &mut ctx.stop, poll).await {
            Ok(code) => {
                info!("IR input: key {}", code);
                handle.complete(Outcome::pass("PASS"));
            }
            Err(reason) => abandon(handle, reason),
        }
    }
}
