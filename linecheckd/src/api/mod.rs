//! Status API for the linecheck daemon
//!
//! A read-only REST view of the run: run state, item table and the board
//! display as last painted. Built with Axum; every response is wrapped in
//! [`ApiResponse`](linecheck_core::api::ApiResponse).

pub(crate) mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use linecheck_core::{ItemTable, RunState};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::reporter::StatusBoard;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Item table of the current run
    pub table: Arc<ItemTable>,
    /// Run state published by the supervisor
    pub run: watch::Receiver<RunState>,
    /// Display widgets as last painted
    pub board: Arc<StatusBoard>,
    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        table: Arc<ItemTable>,
        run: watch::Receiver<RunState>,
        board: Arc<StatusBoard>,
    ) -> Self {
        Self {
            table,
            run,
            board,
            start_time: Instant::now(),
        }
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    info!("Setting up API router...");

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024)); // 1MB limit

    Router::new()
        // Run endpoints
        .route("/api/v0/status", get(handlers::status::get_status))
        .route("/api/v0/items/:tag", get(handlers::status::get_item))
        .route("/api/v0/board", get(handlers::status::get_board))
        // Root endpoint
        .route("/", get(handlers::info::root))
        .layer(middleware_stack)
        .with_state(state)
}

/// Error handling utilities
pub(crate) mod error {
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
        Json,
    };
    use linecheck_core::api::ApiResponse;
    use linecheck_core::LineCheckError;

    use tracing::error;

    /// Error returned by handlers, rendered as an `ApiResponse::Error`
    #[derive(Debug)]
    pub struct ApiError {
        pub status_code: StatusCode,
        pub message: String,
    }

    impl ApiError {
        pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
            Self {
                status_code,
                message: message.into(),
            }
        }

        pub fn bad_request(message: impl Into<String>) -> Self {
            Self::new(StatusCode::BAD_REQUEST, message)
        }

        pub fn not_found(message: impl Into<String>) -> Self {
            Self::new(StatusCode::NOT_FOUND, message)
        }

        pub fn internal_error(message: impl Into<String>) -> Self {
            Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
        }

        /// Hardware or collaborator not reachable
        pub fn service_unavailable(message: impl Into<String>) -> Self {
            Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            error!("API Error {}: {}", self.status_code, self.message);

            let response: ApiResponse<()> = ApiResponse::error(self.message);

            (self.status_code, Json(response)).into_response()
        }
    }

    impl From<LineCheckError> for ApiError {
        fn from(err: LineCheckError) -> Self {
            match err {
                LineCheckError::InvalidInput(msg) => Self::not_found(msg),
                LineCheckError::Parse(msg) => Self::bad_request(msg),
                LineCheckError::ResourceUnavailable(msg) | LineCheckError::Hardware(msg) => {
                    Self::service_unavailable(msg)
                }
                LineCheckError::Network(msg) | LineCheckError::Timeout(msg) => {
                    Self::service_unavailable(msg)
                }
                _ => Self::internal_error(err.to_string()),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_error_mapping() {
            let err: ApiError = LineCheckError::InvalidInput("Unknown test item: X".into()).into();
            assert_eq!(err.status_code, StatusCode::NOT_FOUND);

            let err: ApiError = LineCheckError::Timeout("dd".into()).into();
            assert_eq!(err.status_code, StatusCode::SERVICE_UNAVAILABLE);

            let err: ApiError = LineCheckError::Other("boom".into()).into();
            assert_eq!(err.status_code, StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
