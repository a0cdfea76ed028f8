//! linecheck core library
//!
//! Shared types for the linecheck board tester: the test item catalogue, the
//! single-writer item table, the halt latch, the tick-driven run state
//! machine, configuration and API models. Used by the hardware adapters and
//! the daemon.

pub mod api;
pub mod config;
pub mod error;
pub mod item;
pub mod run;
pub mod stop;
pub mod table;
pub mod types;

// Re-export commonly used types
pub use config::{default_config_path, StaticConfig};
pub use error::*;
pub use item::{ItemId, ItemStatus, TestItem, ITEM_COUNT};
pub use run::{
    Aggregator, ReporterEvent, RunState, RunStatus, RunSummary, TickReport, ERROR_LINE_MAX,
};
pub use stop::{HaltReason, StopLatch, StopSignal};
pub use table::{ItemHandle, ItemTable, Outcome};
pub use types::*;
