//! Shared test item table
//!
//! The table is the only mutable state shared between probes and the
//! supervisor. Each item has exactly one writer, obtained through
//! [`ItemTable::claim`]; the supervisor (and the status API) read snapshots.
//!
//! A terminal transition consumes the [`ItemHandle`], so an item can never
//! leave Finished/Stopped and its result is written exactly once. Status,
//! result and text of a transition are written under a single lock
//! acquisition, so readers never see a terminal status next to a stale result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{LineCheckError, Result};
use crate::item::{bounded_text, ItemId, ItemStatus, TestItem, ITEM_COUNT};

struct ItemSlot {
    record: RwLock<TestItem>,
    claimed: AtomicBool,
}

impl ItemSlot {
    fn new(id: ItemId) -> Self {
        Self {
            record: RwLock::new(TestItem::new(id)),
            claimed: AtomicBool::new(false),
        }
    }

    fn read(&self) -> TestItem {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut TestItem)) -> TestItem {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut record);
        record.clone()
    }
}

/// Fixed-size table of all test items, pre-populated in Waiting state
pub struct ItemTable {
    slots: [ItemSlot; ITEM_COUNT],
}

impl ItemTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|i| ItemSlot::new(ItemId::ALL[i])),
        }
    }

    /// Hand out the single writer handle for `id`
    pub fn claim(self: &Arc<Self>, id: ItemId) -> Result<ItemHandle> {
        let slot = &self.slots[id.index()];
        if slot.claimed.swap(true, Ordering::AcqRel) {
            return Err(LineCheckError::ItemClaimed(id));
        }
        Ok(ItemHandle {
            table: Arc::clone(self),
            id,
        })
    }

    /// Current state of one item
    pub fn get(&self, id: ItemId) -> TestItem {
        self.slots[id.index()].read()
    }

    pub fn status(&self, id: ItemId) -> ItemStatus {
        self.get(id).status
    }

    /// Consistent per-item copies of every item, in id order
    pub fn snapshot(&self) -> Vec<TestItem> {
        self.slots.iter().map(ItemSlot::read).collect()
    }

    fn slot(&self, id: ItemId) -> &ItemSlot {
        &self.slots[id.index()]
    }
}

impl Default for ItemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal outcome a probe writes into its item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: ItemStatus,
    pub result: bool,
    /// `None` keeps whatever text the probe wrote while running
    pub text: Option<String>,
}

impl Outcome {
    /// Finished with a passing result
    pub fn pass(text: impl Into<String>) -> Self {
        Self::finished(true, Some(text.into()))
    }

    /// Finished with a failing result
    pub fn fail(text: impl Into<String>) -> Self {
        Self::finished(false, Some(text.into()))
    }

    pub fn finished(result: bool, text: Option<String>) -> Self {
        Self {
            status: ItemStatus::Finished,
            result,
            text,
        }
    }

    /// Stopped without a passing result
    pub fn stopped(text: Option<String>) -> Self {
        Self {
            status: ItemStatus::Stopped,
            result: false,
            text,
        }
    }
}

/// Exclusive writer for one item
pub struct ItemHandle {
    table: Arc<ItemTable>,
    id: ItemId,
}

impl ItemHandle {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn status(&self) -> ItemStatus {
        self.table.status(self.id)
    }

    /// Read access to the rest of the table (for ordering preconditions)
    pub fn table(&self) -> &ItemTable {
        &self.table
    }

    /// Waiting → Running. A no-op when already running.
    pub fn start(&self) {
        self.table.slot(self.id).update(|item| {
            if item.status == ItemStatus::Waiting {
                item.status = ItemStatus::Running;
            }
        });
    }

    /// Overwrite the response text of a non-terminal item (e.g. between retries)
    pub fn set_text(&self, text: &str) {
        let text = bounded_text(text);
        self.table.slot(self.id).update(|item| item.response_text = text);
    }

    /// Drive the item to its terminal status, consuming the writer
    pub fn complete(self, outcome: Outcome) -> TestItem {
        debug_assert!(outcome.status.is_terminal());
        let text = outcome.text.as_deref().map(bounded_text);
        self.table.slot(self.id).update(move |item| {
            if let Some(text) = text {
                item.response_text = text;
            }
            item.result = outcome.result;
            item.status = outcome.status;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_table_starts_waiting() {
        let table = ItemTable::new();
        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), ITEM_COUNT);
        for (item, id) in snapshot.iter().zip(ItemId::ALL) {
            assert_eq!(item.id, id);
            assert_eq!(item.status, ItemStatus::Waiting);
            assert!(item.response_text.is_empty());
        }
    }

    #[test]
    fn test_claim_is_exclusive() {
        let table = Arc::new(ItemTable::new());
        let _handle = table.claim(ItemId::EmmcSpeed).unwrap();
        let second = table.claim(ItemId::EmmcSpeed);
        assert!(matches!(
            second,
            Err(LineCheckError::ItemClaimed(ItemId::EmmcSpeed))
        ));
        assert!(table.claim(ItemId::SataSpeed).is_ok());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let table = Arc::new(ItemTable::new());
        let handle = table.claim(ItemId::BoardMem).unwrap();

        handle.start();
        assert_eq!(table.status(ItemId::BoardMem), ItemStatus::Running);
        handle.start();
        assert_eq!(table.status(ItemId::BoardMem), ItemStatus::Running);

        handle.set_text("attempt 1");
        assert_eq!(table.get(ItemId::BoardMem).response_text, "attempt 1");

        let item = handle.complete(Outcome::pass("8 GB"));
        assert_eq!(item.status, ItemStatus::Finished);
        assert!(item.result);
        assert_eq!(table.get(ItemId::BoardMem).verdict(), Some(true));
        assert_eq!(table.get(ItemId::BoardMem).response_text, "8 GB");
    }

    #[test]
    fn test_stopped_keeps_running_text() {
        let table = Arc::new(ItemTable::new());
        let handle = table.claim(ItemId::Usb30Up).unwrap();
        handle.start();
        handle.set_text("5000M - 12 MB/s");
        let item = handle.complete(Outcome::stopped(None));
        assert_eq!(item.status, ItemStatus::Stopped);
        assert!(!item.result);
        assert_eq!(item.response_text, "5000M - 12 MB/s");
    }

    #[test]
    fn test_complete_from_waiting() {
        let table = Arc::new(ItemTable::new());
        let handle = table.claim(ItemId::IrInput).unwrap();
        handle.complete(Outcome::pass("PASS"));
        assert_eq!(table.status(ItemId::IrInput), ItemStatus::Finished);
    }

    #[test]
    fn test_text_is_bounded() {
        let table = Arc::new(ItemTable::new());
        let handle = table.claim(ItemId::EfuseUuid).unwrap();
        handle.complete(Outcome::fail("z".repeat(100)));
        assert_eq!(table.get(ItemId::EfuseUuid).response_text.len(), 31);
    }

    #[test]
    fn test_concurrent_readers_never_see_stale_result() {
        // Writers pass every item with an id-specific text; readers spin on
        // snapshots and must never observe a terminal item whose result or
        // text does not belong to the completed write.
        for _ in 0..20 {
            let table = Arc::new(ItemTable::new());
            let handles: Vec<_> = ItemId::ALL
                .iter()
                .map(|&id| table.claim(id).unwrap())
                .collect();

            let readers: Vec<_> = (0..4)
                .map(|_| {
                    let table = Arc::clone(&table);
                    thread::spawn(move || loop {
                        let snapshot = table.snapshot();
                        let mut done = 0;
                        for item in &snapshot {
                            if item.is_terminal() {
                                assert!(item.result, "terminal item with stale result");
                                assert_eq!(item.response_text, format!("ok {}", item.error_tag));
                                done += 1;
                            }
                        }
                        if done == ITEM_COUNT {
                            break;
                        }
                    })
                })
                .collect();

            let writers: Vec<_> = handles
                .into_iter()
                .map(|handle| {
                    thread::spawn(move || {
                        handle.start();
                        handle.set_text("measuring");
                        let text = format!("ok {}", handle.id().error_tag());
                        handle.complete(Outcome::pass(text));
                    })
                })
                .collect();

            for w in writers {
                w.join().unwrap();
            }
            for r in readers {
                r.join().unwrap();
            }
        }
    }
}
