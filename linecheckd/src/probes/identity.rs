//! Efuse identity probe
//!
//! Reads the MAC burned into the efuse. A blank board gets an identifier
//! from the MAC server, which is then committed with the efuse tool.

use async_trait::async_trait;
use linecheck_core::{ItemHandle, ItemId, Outcome};
use linecheck_hardware::identity::mac_from_identifier;
use linecheck_hardware::sysfs::format_mac;
use std::sync::Arc;
use tracing::{info, warn};

use super::{abandon, interruptible, shielded, Probe, ProbeContext};

/// Text shown when no MAC could be resolved
pub const UNKNOWN_MAC: &str = "unknown mac";

pub struct EfuseProbe;

/// Where the board MAC comes from
enum Provisioning {
    Burned(String),
    /// Identifier from the MAC server, not yet written
    Fresh(String),
}

impl EfuseProbe {
    /// Burned MAC, or an identifier to burn. Nothing is written here.
    async fn lookup(ctx: &ProbeContext) -> Option<Provisioning> {
        let identity = &ctx.caps.identity;
        match identity.read_burned_identifier().await {
            Ok(Some(mac)) => return Some(Provisioning::Burned(mac)),
            Ok(None) => info!("No identifier burned, provisioning"),
            Err(e) => warn!("efuse read failed, provisioning: {}", e),
        }

        let board = &ctx.config.identity.board;
        match identity.request_identifier_from_server(board).await {
            Ok(identifier) => Some(Provisioning::Fresh(identifier)),
            Err(e) => {
                warn!("No identifier from MAC server: {}", e);
                None
            }
        }
    }

    /// Commit `identifier` to the efuse and return its MAC (12 hex digits).
    ///
    /// The efuse takes a limited number of writes, so once started the
    /// commit is shielded from halts and aborts.
    async fn burn(ctx: &ProbeContext, identifier: String) -> Option<String> {
        let identity = Arc::clone(&ctx.caps.identity);
        let committed = shielded(async move {
            let committed = identity.commit_identifier(&identifier).await;
            committed.map(|ok| ok.then_some(identifier))
        })
        .await;
        let identifier = match committed {
            Ok(Some(identifier)) => identifier,
            Ok(None) => return None,
            Err(e) => {
                warn!("efuse commit failed: {}", e);
                return None;
            }
        };

        let mac = mac_from_identifier(&identifier)?;
        mac.to_ascii_lowercase()
            .starts_with(&ctx.config.identity.oui.to_ascii_lowercase())
            .then_some(mac)
    }
}

#[async_trait]
impl Probe for EfuseProbe {
    fn item(&self) -> ItemId {
        ItemId::EfuseUuid
    }

    async fn run(self: Box<Self>, handle: ItemHandle, ctx: ProbeContext) {
        handle.start();
        let mut stop = ctx.stop.clone();
        let mac = match interruptible(&mut stop, Self::lookup(&ctx)).await {
            Ok(None) => None,
            Ok(Some(Provisioning::Burned(mac))) => Some(mac),
            Ok(Some(Provisioning::Fresh(identifier))) => Self::burn(&ctx, identifier).await,
            Err(reason) => return abandon(handle, reason),
        };

        if let Some(reason) = stop.reason() {
            if let Some(mac) = &mac {
                info!("Board MAC {} resolved after the run halted", format_mac(mac));
            }
            return abandon(handle, reason);
        }
        match mac {
            Some(mac) => {
                let text = format_mac(&mac);
                info!("Board MAC {}", text);
                handle.complete(Outcome::pass(text));
            }
            None => {
                handle.complete(Outcome::fail(UNKNOWN_MAC));
            }
        }
    }
}
