//! Test item catalogue and per-item record
//!
//! Every hardware aspect under test has one [`ItemId`]. The id order is the
//! display and summary order; the error tags are the short codes sent to the
//! log server when an item fails.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LineCheckError;
use crate::types::DisplayBinding;

/// Number of test items on the board
pub const ITEM_COUNT: usize = 18;

/// Response text buffer size; stored text holds at most `RESPONSE_TEXT_MAX - 1` chars
pub const RESPONSE_TEXT_MAX: usize = 32;

/// Stable identity of a test item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemId {
    IperfSpeed,
    EfuseUuid,
    BoardMem,
    FbSize,
    EmmcSpeed,
    SataSpeed,
    NvmeSpeed,
    Usb30Up,
    Usb30Down,
    Usb20Up,
    Usb20Down,
    EthGreen,
    EthOrange,
    HpIn,
    HpOut,
    SpiBtDown,
    SpiBtUp,
    IrInput,
}

impl ItemId {
    /// All items in id order
    pub const ALL: [ItemId; ITEM_COUNT] = [
        ItemId::IperfSpeed,
        ItemId::EfuseUuid,
        ItemId::BoardMem,
        ItemId::FbSize,
        ItemId::EmmcSpeed,
        ItemId::SataSpeed,
        ItemId::NvmeSpeed,
        ItemId::Usb30Up,
        ItemId::Usb30Down,
        ItemId::Usb20Up,
        ItemId::Usb20Down,
        ItemId::EthGreen,
        ItemId::EthOrange,
        ItemId::HpIn,
        ItemId::HpOut,
        ItemId::SpiBtDown,
        ItemId::SpiBtUp,
        ItemId::IrInput,
    ];

    /// Position in the item table
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short fixed code used in aggregated failure summaries
    pub const fn error_tag(self) -> &'static str {
        match self {
            ItemId::IperfSpeed => "IPERF",
            ItemId::EfuseUuid => "EFUSE",
            ItemId::BoardMem => "MEM",
            ItemId::FbSize => "HDMI",
            ItemId::EmmcSpeed => "EMMC",
            ItemId::SataSpeed => "SATA",
            ItemId::NvmeSpeed => "NVME",
            ItemId::Usb30Up => "USB3U",
            ItemId::Usb30Down => "USB3D",
            ItemId::Usb20Up => "USB2U",
            ItemId::Usb20Down => "USB2D",
            ItemId::EthGreen => "ETH_G",
            ItemId::EthOrange => "ETH_O",
            ItemId::HpIn => "HP_I",
            ItemId::HpOut => "HP_O",
            ItemId::SpiBtDown => "BT_DN",
            ItemId::SpiBtUp => "BT_UP",
            ItemId::IrInput => "IR_IN",
        }
    }

    /// Display widget this item is rendered into
    pub const fn display_binding(self) -> DisplayBinding {
        let slot = match self {
            ItemId::IperfSpeed => 147,
            ItemId::EfuseUuid => 167,
            ItemId::BoardMem => 8,
            ItemId::FbSize => 42,
            ItemId::EmmcSpeed => 62,
            ItemId::SataSpeed => 82,
            ItemId::NvmeSpeed => 87,
            ItemId::Usb30Up => 102,
            ItemId::Usb30Down => 122,
            ItemId::Usb20Up => 107,
            ItemId::Usb20Down => 127,
            ItemId::EthGreen => 162,
            ItemId::EthOrange => 163,
            ItemId::HpIn => 182,
            ItemId::HpOut => 183,
            ItemId::SpiBtDown => 187,
            ItemId::SpiBtUp => 188,
            ItemId::IrInput => 142,
        };
        DisplayBinding(slot)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.error_tag())
    }
}

impl FromStr for ItemId {
    type Err = LineCheckError;

    /// Parse an item from its error tag (case-insensitive), e.g. `eth_g`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemId::ALL
            .iter()
            .copied()
            .find(|id| id.error_tag().eq_ignore_ascii_case(s))
            .ok_or_else(|| LineCheckError::InvalidInput(format!("Unknown test item: {}", s)))
    }
}

/// Lifecycle of a single test item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Waiting,
    Running,
    Finished,
    Stopped,
}

impl ItemStatus {
    /// Finished and Stopped admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Finished | ItemStatus::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Waiting => "waiting",
            ItemStatus::Running => "running",
            ItemStatus::Finished => "finished",
            ItemStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one test item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestItem {
    pub id: ItemId,
    pub status: ItemStatus,
    /// Only meaningful once `status` is terminal
    pub result: bool,
    pub response_text: String,
    pub display_binding: DisplayBinding,
    pub error_tag: &'static str,
}

impl TestItem {
    /// Fresh item: Waiting, failing result, empty text
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            status: ItemStatus::Waiting,
            result: false,
            response_text: String::new(),
            display_binding: id.display_binding(),
            error_tag: id.error_tag(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Result as a reader may trust it: `None` until terminal
    pub fn verdict(&self) -> Option<bool> {
        self.is_terminal().then_some(self.result)
    }
}

/// Clamp a response text to the item text buffer
pub fn bounded_text(text: &str) -> String {
    text.chars().take(RESPONSE_TEXT_MAX - 1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalogue_is_consistent() {
        assert_eq!(ItemId::ALL.len(), ITEM_COUNT);
        for (i, id) in ItemId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }

        let tags: HashSet<_> = ItemId::ALL.iter().map(|id| id.error_tag()).collect();
        assert_eq!(tags.len(), ITEM_COUNT, "error tags must be unique");

        let bindings: HashSet<_> = ItemId::ALL.iter().map(|id| id.display_binding()).collect();
        assert_eq!(bindings.len(), ITEM_COUNT, "display bindings must be unique");
    }

    #[test]
    fn test_item_from_tag() {
        assert_eq!("EMMC".parse::<ItemId>().unwrap(), ItemId::EmmcSpeed);
        assert_eq!("eth_o".parse::<ItemId>().unwrap(), ItemId::EthOrange);
        assert!("FAN".parse::<ItemId>().is_err());
    }

    #[test]
    fn test_new_item_defaults() {
        let item = TestItem::new(ItemId::HpOut);
        assert_eq!(item.status, ItemStatus::Waiting);
        assert!(!item.result);
        assert!(item.response_text.is_empty());
        assert_eq!(item.display_binding, DisplayBinding(183));
        assert_eq!(item.verdict(), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ItemStatus::Waiting.is_terminal());
        assert!(!ItemStatus::Running.is_terminal());
        assert!(ItemStatus::Finished.is_terminal());
        assert!(ItemStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_bounded_text() {
        assert_eq!(bounded_text("512 MB/s"), "512 MB/s");
        let long = "x".repeat(80);
        assert_eq!(bounded_text(&long).len(), RESPONSE_TEXT_MAX - 1);
        // multi-byte characters are never split
        let wide = "é".repeat(40);
        assert_eq!(bounded_text(&wide).chars().count(), RESPONSE_TEXT_MAX - 1);
    }
}
