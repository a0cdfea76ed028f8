//! Core value types shared by probes, the supervisor and reporters

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle correlating an item (or run-level field) to a display widget.
///
/// The core never interprets the value; reporters map it to whatever their
/// rendering surface uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayBinding(pub u16);

impl fmt::Display for DisplayBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Overall run status widget
pub const STATUS_BINDING: DisplayBinding = DisplayBinding(47);
/// Board network address widget
pub const BOARD_ADDRESS_BINDING: DisplayBinding = DisplayBinding(4);
/// Companion server address widget
pub const COMPANION_BINDING: DisplayBinding = DisplayBinding(24);

/// Color categories understood by reporters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorCategory {
    Gray,
    DimGray,
    Yellow,
    Green,
    Red,
    /// Bright phase of the blinking "running" box
    RunBoxOn,
    /// Dim phase of the blinking "running" box
    RunBoxOff,
}

impl ColorCategory {
    /// Pass/fail color for a terminal item
    pub fn verdict(pass: bool) -> Self {
        if pass {
            ColorCategory::Green
        } else {
            ColorCategory::Red
        }
    }
}

/// Message kinds accepted by the remote log server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Resolved hardware identifier
    Mac,
    /// Aggregated failure tags
    Err,
    /// Iperf UDP session control ("start"/"stop")
    Udp,
}

/// Pass threshold for a numeric measurement.
///
/// A value that meets the threshold passes (`value >= min`). All probes use
/// this one convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Threshold {
    pub min: u32,
}

impl Threshold {
    pub const fn new(min: u32) -> Self {
        Self { min }
    }

    pub fn passes(&self, value: u32) -> bool {
        value >= self.min
    }
}

/// One measurement taken by a retry probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub value: u32,
    pub text: String,
}

impl Measurement {
    pub fn new(value: u32, text: impl Into<String>) -> Self {
        Self {
            value,
            text: text.into(),
        }
    }

    /// A failed attempt: counts as a zero reading with a diagnostic text
    pub fn failed(text: impl Into<String>) -> Self {
        Self::new(0, text)
    }
}

/// Storage device classes benchmarked by the storage probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Emmc,
    Sdmmc,
    Sata,
    Nvme,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Emmc => "emmc",
            DeviceClass::Sdmmc => "sdmmc",
            DeviceClass::Sata => "sata",
            DeviceClass::Nvme => "nvme",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
