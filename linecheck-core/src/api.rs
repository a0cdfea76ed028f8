//! API models for the linecheck status API
//!
//! Read-only views of the run state and item table served by the daemon so
//! an operator station can mirror the board display.

use serde::{Deserialize, Serialize};

use crate::item::{ItemStatus, TestItem};
use crate::run::RunState;
use crate::types::ColorCategory;

/// Generic API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ApiResponse<T> {
    #[serde(rename = "success")]
    Success { data: T },
    #[serde(rename = "error")]
    Error { error: String },
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T) -> Self {
        Self::Success { data }
    }

    /// Create an error response
    pub fn error(error: String) -> Self {
        Self::Error { error }
    }
}

/// One item as exposed over the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    /// Error tag, also accepted as the item path parameter
    pub tag: String,
    pub status: ItemStatus,
    /// `None` while the item is not terminal
    pub result: Option<bool>,
    pub text: String,
    pub binding: u16,
}

impl From<&TestItem> for ItemView {
    fn from(item: &TestItem) -> Self {
        Self {
            tag: item.error_tag.to_string(),
            status: item.status,
            result: item.verdict(),
            text: item.response_text.clone(),
            binding: item.display_binding.0,
        }
    }
}

/// Response for `GET /api/v0/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub run: RunState,
    /// Failing tags so far (non-terminal items count as failing)
    pub failing: Vec<String>,
    pub items: Vec<ItemView>,
}

impl StatusResponse {
    pub fn new(run: RunState, items: &[TestItem]) -> Self {
        let failing = items
            .iter()
            .filter(|item| item.verdict() != Some(true))
            .map(|item| item.error_tag.to_string())
            .collect();
        Self {
            run,
            failing,
            items: items.iter().map(ItemView::from).collect(),
        }
    }
}

/// One display widget as last painted, for `GET /api/v0/board`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetView {
    pub binding: u16,
    /// Item tag or run-level field name
    pub label: String,
    pub text: String,
    pub color: Option<ColorCategory>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemId;
    use crate::run::RunStatus;

    #[test]
    fn test_api_response_tagging() {
        let ok = ApiResponse::success(42);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"], 42);

        let err: ApiResponse<()> = ApiResponse::error("boom".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn test_item_view_hides_result_until_terminal() {
        let mut item = TestItem::new(ItemId::EmmcSpeed);
        item.status = ItemStatus::Running;
        item.result = true;
        assert_eq!(ItemView::from(&item).result, None);

        item.status = ItemStatus::Finished;
        let view = ItemView::from(&item);
        assert_eq!(view.result, Some(true));
        assert_eq!(view.tag, "EMMC");
        assert_eq!(view.binding, 62);
    }

    #[test]
    fn test_status_response_roundtrip() {
        let mut passed = TestItem::new(ItemId::BoardMem);
        passed.status = ItemStatus::Finished;
        passed.result = true;
        let items = vec![passed, TestItem::new(ItemId::HpIn)];
        let run = RunState {
            status: RunStatus::Running,
            remaining_timeout_ticks: 12,
            emergency_stop: false,
            ticks: 3,
        };

        let response = StatusResponse::new(run, &items);
        assert_eq!(response.failing, vec!["HP_I".to_string()]);

        let json = serde_json::to_string(&ApiResponse::success(response)).unwrap();
        let parsed: ApiResponse<StatusResponse> = serde_json::from_str(&json).unwrap();
        match parsed {
            ApiResponse::Success { data } => {
                assert_eq!(data.run.status, RunStatus::Running);
                assert_eq!(data.items.len(), 2);
                assert_eq!(data.items[1].status, ItemStatus::Waiting);
            }
            ApiResponse::Error { .. } => panic!("expected success"),
        }
    }
}
