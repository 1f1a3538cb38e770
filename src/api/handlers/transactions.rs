//! Transaction read handlers: list, summary, get.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{ListTransactionsParams, SummaryParams, TransactionListResponse};
use crate::app_state::AppState;
use crate::auth::{ApiQuery, Caller};
use crate::domain::{Transaction, TransactionId};
use crate::error::{AppError, ErrorResponse};
use crate::service::TransactionSummary;

/// `GET /transactions`: List the caller's transactions.
///
/// # Errors
///
/// Returns [`AppError`] on missing identity, out-of-scope wallets, or
/// invalid paging.
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    tag = "Transactions",
    summary = "List transactions",
    description = "Returns the caller's transactions, newest first. Without `page` and `rows` every row is returned. The caller's wallets are reconciled with the settlement provider first; if that fails, local data is served and `sync` reports `stale`.",
    params(ListTransactionsParams),
    responses(
        (status = 200, description = "Transaction page", body = TransactionListResponse),
        (status = 400, description = "Invalid paging or status", body = ErrorResponse),
        (status = 401, description = "No identity", body = ErrorResponse),
        (status = 403, description = "Wallet out of scope", body = ErrorResponse),
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<ListTransactionsParams>,
) -> Result<impl IntoResponse, AppError> {
    let request = params.into_request()?;
    let page = state
        .transaction_service
        .list_transactions(caller.identity(), request)
        .await?;
    Ok(Json(TransactionListResponse::from(page)))
}

/// `GET /transactions/summary`: Per-status counts for the caller's scope.
///
/// # Errors
///
/// Returns [`AppError`] on missing identity or out-of-scope wallets.
#[utoipa::path(
    get,
    path = "/api/v1/transactions/summary",
    tag = "Transactions",
    summary = "Summarise transactions",
    description = "Counts transactions per status and sums completed fiat amounts per currency, from local data only.",
    params(SummaryParams),
    responses(
        (status = 200, description = "Summary", body = TransactionSummary),
        (status = 401, description = "No identity", body = ErrorResponse),
        (status = 403, description = "Wallet out of scope", body = ErrorResponse),
    )
)]
pub async fn transaction_summary(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<SummaryParams>,
) -> Result<impl IntoResponse, AppError> {
    let summary = state
        .transaction_service
        .summary(
            caller.identity(),
            params.wallet_address.as_deref(),
            params.recent,
        )
        .await?;
    Ok(Json(summary))
}

/// `GET /transactions/{id}`: One transaction.
///
/// # Errors
///
/// Returns [`AppError::TransactionNotFound`] if the transaction does not
/// exist or belongs to someone else.
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    tag = "Transactions",
    summary = "Get a transaction",
    description = "Returns one transaction with its full status history.",
    params(
        ("id" = String, Path, description = "Transaction id (provider order id)"),
    ),
    responses(
        (status = 200, description = "Transaction", body = Transaction),
        (status = 401, description = "No identity", body = ErrorResponse),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
    )
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .transaction_service
        .get_transaction(caller.identity(), &TransactionId::new(id))
        .await?;
    Ok(Json(tx))
}

/// Transaction read routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/transactions", get(list_transactions))
        .route("/transactions/summary", get(transaction_summary))
        .route("/transactions/{id}", get(get_transaction))
}
