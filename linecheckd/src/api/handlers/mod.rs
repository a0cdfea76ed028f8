//! API request handlers for the linecheck status API.
//!
//! # Handler Modules
//!
//! - [`info`] - Root endpoint
//! - [`status`] - Run state, single items and the display board
//!
//! All handlers accept `State<AppState>`, return
//! `Result<Json<ApiResponse<T>>, ApiError>` and only read: the run is driven
//! by the supervisor alone.

pub mod info;
pub mod status;
