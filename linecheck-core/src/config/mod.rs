//! Configuration types for linecheck
//!
//! A single [`StaticConfig`] TOML file carries every tunable of a run: tick
//! and timeout budget, retry and poll intervals, pass thresholds, device
//! paths and the network collaborators. It is read once at startup.

mod paths;
mod static_config;

pub use paths::default_config_path;
pub use static_config::{
    ApiConfig, EventsConfig, IdentityConfig, NetworkConfig, ProbeConfig, RunConfig, StaticConfig,
    StorageConfig, SystemConfig, ThresholdsConfig, UsbConfig,
};
