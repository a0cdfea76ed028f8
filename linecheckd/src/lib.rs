//! linecheckd
//!
//! Production-line test daemon for the ODROID-M1. One process runs one board
//! through every test item concurrently, paints progress to its reporters,
//! sends the verdict to the companion server and parks until it is signalled.
//!
//! Layout:
//! - [`runner`]: wires bootstrap, probes, event sources and the supervisor
//! - [`supervisor`]: the aggregation tick loop and the final report
//! - [`probes`]: one task per test item
//! - [`sources`]: input device and button pollers feeding the probes
//! - [`reporter`]: display sinks
//! - [`api`]: read-only status API
//! - `fakes`: scripted board used by the tests (`test-support` feature)

pub mod api;
pub mod bootstrap;
pub mod capabilities;
pub mod config;
#[cfg(any(test, feature = "test-support"))]
pub mod fakes;
pub mod probes;
pub mod reporter;
pub mod runner;
pub mod shutdown;
pub mod sources;
pub mod supervisor;
