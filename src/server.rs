//! HTTP query API for persisted transfers
//!
//! Handlers validate at the boundary and return structured JSON errors;
//! the store is the only shared state.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::error::Result;
use crate::indexer::MAX_PAGE_SIZE;
use crate::store::{AddressRole, RecordStore, TransferFilter, TransferRecord};

/// Page size served when the request does not name one.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Record persistence, shared with the scanner.
    pub store: Arc<dyn RecordStore>,
}

/// Query parameters for transfer listing.
///
/// Numeric fields arrive as text so an out-of-range value produces a
/// structured 400 instead of axum's default rejection.
#[derive(Debug, Deserialize)]
pub struct TransfersQuery {
    /// Address to filter on (hex, 0x-prefixed). Required.
    pub address: Option<String>,
    /// Which side to match: "from" (default) or "to".
    pub role: Option<String>,
    /// 1-indexed page, defaults to 1.
    pub page: Option<String>,
    /// Page size, defaults to [`DEFAULT_PAGE_SIZE`], capped at
    /// [`MAX_PAGE_SIZE`].
    pub limit: Option<String>,
}

/// Response for transfer queries.
#[derive(Debug, Serialize)]
pub struct TransfersResponse {
    /// Echoed filter address.
    pub address: String,
    /// Role the query matched against.
    pub role: String,
    /// 1-indexed page served.
    pub page: u64,
    /// Page size served, after capping.
    pub limit: u64,
    /// Total matches across all pages.
    pub total: u64,
    /// Records for this page, newest block first.
    pub items: Vec<TransferRecord>,
}

/// Errors a request can fail with. Serialized as `{"error": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing required parameter 'address'")]
    MissingAddress,

    #[error("invalid address '{value}': must be 0x-prefixed followed by 40 hex characters")]
    InvalidAddress { value: String },

    #[error("invalid role '{value}': expected 'from' or 'to'")]
    InvalidRole { value: String },

    #[error("invalid parameter '{param}': expected a positive integer")]
    InvalidParam { param: String },

    #[error("internal error")]
    Internal,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Validate that a string is a valid hex address (0x + 40 hex chars).
fn validate_hex_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_param(value: Option<&str>, name: &str) -> std::result::Result<Option<u64>, ApiError> {
    value
        .map(|v| v.parse::<u64>())
        .transpose()
        .map_err(|_| ApiError::InvalidParam {
            param: name.to_string(),
        })
}

/// `GET /api/transfers` — page through persisted transfers for an address.
pub async fn handle_transfers(
    State(state): State<AppState>,
    Query(params): Query<TransfersQuery>,
) -> std::result::Result<Json<TransfersResponse>, ApiError> {
    let address = params.address.ok_or(ApiError::MissingAddress)?;
    if !validate_hex_address(&address) {
        return Err(ApiError::InvalidAddress { value: address });
    }

    let role = match params.role.as_deref() {
        None => AddressRole::From,
        Some(value) => value.parse().map_err(|_| ApiError::InvalidRole {
            value: value.to_string(),
        })?,
    };

    let page = parse_param(params.page.as_deref(), "page")?
        .unwrap_or(1)
        .max(1);
    let limit = parse_param(params.limit.as_deref(), "limit")?
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let skip = (page - 1)
        .checked_mul(limit)
        .ok_or(ApiError::InvalidParam {
            param: "page".to_string(),
        })?;

    let filter = TransferFilter {
        address: address.clone(),
        role,
    };
    let (items, total) = state.store.query(&filter, skip, limit).map_err(|e| {
        tracing::error!("Transfer query failed: {}", e);
        ApiError::Internal
    })?;

    Ok(Json(TransfersResponse {
        address,
        role: role.to_string(),
        page,
        limit,
        total,
        items,
    }))
}

/// `GET /health` — liveness probe.
pub async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Builds the axum router with all API routes.
///
/// Routes:
/// - `GET /health` — health check
/// - `GET /api/transfers` — paged transfer lookup by address
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/transfers", get(handle_transfers))
        .with_state(state)
}

/// Serve the query API until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = build_router(state);

    tracing::info!("Serving transfer queries on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
