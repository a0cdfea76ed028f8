//! Run status handlers

use axum::{
    extract::{Path, State},
    Json,
};
use linecheck_core::api::{ApiResponse, ItemView, StatusResponse, WidgetView};
use linecheck_core::ItemId;
use tracing::debug;

use crate::api::{error::ApiError, AppState};

/// Get the run state together with every item.
///
/// # Endpoint
///
/// `GET /api/v0/status`
///
/// # Returns
///
/// - `run` - status, remaining countdown, emergency flag and tick count
/// - `failing` - tags of items without a passing result so far
/// - `items` - every item in id order
pub(crate) async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StatusResponse>>, ApiError> {
    debug!("Request: GET /api/v0/status");

    let run = state.run.borrow().clone();
    let items = state.table.snapshot();

    Ok(Json(ApiResponse::success(StatusResponse::new(run, &items))))
}

/// Get a single item by its error tag.
///
/// # Endpoint
///
/// `GET /api/v0/items/{tag}`
///
/// # Path Parameters
///
/// - `tag` - Item error tag, case-insensitive (e.g. `EMMC`, `eth_g`)
///
/// # Errors
///
/// Returns 404 if no item carries the tag.
pub(crate) async fn get_item(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<ApiResponse<ItemView>>, ApiError> {
    debug!("Request: GET /api/v0/items/{}", tag);

    let id: ItemId = tag.parse()?;
    let item = state.table.get(id);

    Ok(Json(ApiResponse::success(ItemView::from(&item))))
}

/// Get the display widgets as last painted.
///
/// # Endpoint
///
/// `GET /api/v0/board`
///
/// # Returns
///
/// Every widget painted so far, in binding order, with its label, text and
/// color category.
pub(crate) async fn get_board(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<WidgetView>>>, ApiError> {
    debug!("Request: GET /api/v0/board");

    Ok(Json(ApiResponse::success(state.board.widgets())))
}
