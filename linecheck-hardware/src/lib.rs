//! linecheck-hardware
//!
//! Capability traits for everything a probe touches on the board, plus their
//! Linux implementations. The daemon only sees the traits, so every probe can
//! run against fakes in tests.
//!
//! Public API:
//! - `command::ToolRunner` / `SystemRunner`: bounded external tool runs
//! - `bench::StorageBench` / `DdBench`, `bench::NetBench` / `Iperf3`
//! - `link::LinkControl` / `EthtoolLink`: Ethernet speed switching
//! - `identity::IdentityProvider` / `EfuseIdentity`: MAC provisioning
//! - `net::NetworkIdentity` / `LanDiscovery`, `net::LogSink` / `HttpLogSink`
//! - `system::SystemInfo` / `SysfsSystem`: memory and framebuffer
//! - `usb::UsbBus` / `SysfsUsb`: USB port attachments
//! - `input`: input event device streams

pub mod bench;
pub mod command;
pub mod identity;
pub mod input;
pub mod link;
pub mod net;
pub mod sysfs;
pub mod system;
pub mod usb;

pub use bench::{DdBench, Iperf3, NetBench, StorageBench};
pub use command::{SystemRunner, ToolOutput, ToolRunner};
pub use identity::{EfuseIdentity, IdentityProvider};
pub use input::{open_input_device, InputEvent};
pub use link::{EthtoolLink, LinkControl, SpeedChange};
pub use net::{HttpLogSink, LanDiscovery, LogSink, NetworkIdentity};
pub use system::{classify_memory, SysfsSystem, SystemInfo};
pub use usb::{SysfsUsb, UsbAttachment, UsbBus};
