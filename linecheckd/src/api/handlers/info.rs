//! Root endpoint

use crate::api::error::ApiError;
use crate::api::AppState;

use axum::{extract::State, Json};
use linecheck_core::api::ApiResponse;
use serde_json::{json, Value};
use tracing::debug;

/// Handle the root endpoint.
///
/// Identify the service. Useful for health checks from the operator station.
///
/// # Endpoint
///
/// `GET /`
///
/// # Returns
///
/// Service name, version, current run status and uptime in seconds.
pub(crate) async fn root(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    debug!("Request: GET /");

    let run = state.run.borrow().status;
    let data = json!({
        "service": "linecheck status API",
        "version": env!("CARGO_PKG_VERSION"),
        "run": run,
        "uptime": state.start_time.elapsed().as_secs(),
    });

    Ok(Json(ApiResponse::success(data)))
}
