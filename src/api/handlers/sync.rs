//! Explicit reconciliation handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{SyncResponse, WalletParams};
use crate::app_state::AppState;
use crate::auth::{ApiQuery, Caller};
use crate::error::{AppError, ErrorResponse};

/// `POST /sync`: Reconcile the caller's wallets now.
///
/// # Errors
///
/// Returns [`AppError`] on missing identity, out-of-scope wallets, a
/// missing credential, or a failed provider call.
#[utoipa::path(
    post,
    path = "/api/v1/sync",
    tag = "Sync",
    summary = "Reconcile wallets",
    description = "Fetches every provider order of the caller's wallets (or the given wallet for administrators) and merges them into the ledger.",
    params(WalletParams),
    responses(
        (status = 200, description = "Per-wallet reports", body = SyncResponse),
        (status = 401, description = "No identity", body = ErrorResponse),
        (status = 403, description = "Wallet out of scope", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse),
        (status = 503, description = "Provider credential not configured", body = ErrorResponse),
    )
)]
pub async fn sync_wallets(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<WalletParams>,
) -> Result<impl IntoResponse, AppError> {
    let reports = state
        .transaction_service
        .sync(caller.identity(), params.wallet_address.as_deref())
        .await?;
    Ok(Json(SyncResponse { reports }))
}

/// Sync routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sync", post(sync_wallets))
}
