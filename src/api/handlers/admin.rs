//! Administrator handlers: raw provider orders and recorded anomalies.
//!
//! Errors from these handlers carry internal details.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};

use crate::api::dto::{AnomaliesParams, AnomalyListResponse, OrdersParams};
use crate::app_state::AppState;
use crate::auth::{ApiQuery, Caller, require_elevated};
use crate::error::{DetailedError, ErrorResponse};
use crate::provider::OrderPage;

const DEFAULT_ANOMALY_LIMIT: u32 = 100;

/// `GET /orders`: One raw page of provider orders.
///
/// # Errors
///
/// Returns [`DetailedError`] for non-administrators, invalid filters, a
/// missing credential, or a failed provider call.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "Admin",
    summary = "Query provider orders",
    description = "Forwards one order query to the settlement provider and returns the page unchanged. Administrators only.",
    params(OrdersParams),
    responses(
        (status = 200, description = "Provider order page", body = OrderPage),
        (status = 400, description = "Missing wallet or invalid filter", body = ErrorResponse),
        (status = 401, description = "No identity", body = ErrorResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse),
        (status = 503, description = "Provider credential not configured", body = ErrorResponse),
    )
)]
pub async fn provider_orders(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<OrdersParams>,
) -> Result<impl IntoResponse, DetailedError> {
    require_elevated(caller.identity())?;
    let filter = params.into_filter()?;
    let page = state
        .transaction_service
        .provider_orders(caller.identity(), &filter)
        .await?;
    Ok(Json(page))
}

/// `GET /admin/anomalies`: Recorded reconciliation anomalies.
///
/// # Errors
///
/// Returns [`DetailedError`] for non-administrators or storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/admin/anomalies",
    tag = "Admin",
    summary = "List anomalies",
    description = "Returns anomaly events recorded after `after`, oldest first. Administrators only.",
    params(AnomaliesParams),
    responses(
        (status = 200, description = "Anomaly events", body = AnomalyListResponse),
        (status = 401, description = "No identity", body = ErrorResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse),
    )
)]
pub async fn list_anomalies(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<AnomaliesParams>,
) -> Result<impl IntoResponse, DetailedError> {
    let data = state
        .transaction_service
        .anomalies(
            caller.identity(),
            params.after.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            params.limit.unwrap_or(DEFAULT_ANOMALY_LIMIT),
        )
        .await?;
    Ok(Json(AnomalyListResponse { data }))
}

/// Administrator routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(provider_orders))
        .route("/admin/anomalies", get(list_anomalies))
}
