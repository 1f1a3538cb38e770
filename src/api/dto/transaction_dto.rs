//! Transaction, sync, and admin DTOs.

use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common_dto::PaginationMeta;
use crate::domain::{Direction, Transaction, TransactionStatus};
use crate::error::AppError;
use crate::persistence::StoredEvent;
use crate::provider::{DEFAULT_PAGE_SIZE, OrderFilter, SortOrder, StatusFilter};
use crate::reconcile::SyncReport;
use crate::service::{ListRequest, SyncState, TransactionPage};

fn parse_status(raw: &str) -> Result<TransactionStatus, AppError> {
    raw.parse::<TransactionStatus>()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))
}

/// Query parameters for `GET /transactions`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListTransactionsParams {
    /// 1-indexed page. Omit with `rows` to receive every row.
    pub page: Option<u32>,
    /// Page size, capped at 100.
    pub rows: Option<u32>,
    /// Restrict to the recent window.
    #[serde(default)]
    pub recent: bool,
    /// Case-insensitive substring over currency and wallet fields.
    pub search: Option<String>,
    /// Exact status, e.g. `COMPLETED`.
    pub status: Option<String>,
    /// Wallet to narrow to. Required for administrators.
    pub wallet_address: Option<String>,
}

impl ListTransactionsParams {
    /// Converts into a service request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRequest`] for an unknown status.
    pub fn into_request(self) -> Result<ListRequest, AppError> {
        let status = self.status.as_deref().map(parse_status).transpose()?;
        Ok(ListRequest {
            page: self.page,
            rows: self.rows,
            recent: self.recent,
            search: self.search,
            status,
            wallet_address: self.wallet_address,
        })
    }
}

/// Response body for `GET /transactions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionListResponse {
    /// Transactions on this page, newest first.
    pub data: Vec<Transaction>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
    /// Freshness of the data.
    pub sync: SyncState,
}

impl From<TransactionPage> for TransactionListResponse {
    fn from(page: TransactionPage) -> Self {
        Self {
            pagination: PaginationMeta::new(page.page, page.rows, page.total),
            data: page.items,
            sync: page.sync,
        }
    }
}

/// Query parameters for `GET /transactions/summary`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SummaryParams {
    /// Wallet to narrow to. Required for administrators.
    pub wallet_address: Option<String>,
    /// Restrict to the recent window.
    #[serde(default)]
    pub recent: bool,
}

/// Response body for `POST /sync`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    /// One report per reconciled wallet.
    pub reports: Vec<SyncReport>,
}

/// Query parameters for `GET /orders`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OrdersParams {
    /// Wallet whose orders are requested. Required.
    pub wallet_address: Option<String>,
    /// Status filter; `any` disables it. Defaults to completed orders.
    pub status: Option<String>,
    /// `BUY` or `SELL`. Defaults to `BUY`.
    pub product_type: Option<String>,
    /// `desc` (default) or `asc`.
    pub sort_order: Option<SortOrder>,
    /// Page size, default 100.
    pub limit: Option<u32>,
    /// Offset, default 0.
    pub skip: Option<u32>,
}

impl OrdersParams {
    /// Converts into a provider filter.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRequest`] for a missing or blank wallet,
    /// `limit=0`, or an unknown status or product type.
    pub fn into_filter(self) -> Result<OrderFilter, AppError> {
        let wallet = self
            .wallet_address
            .as_deref()
            .map(str::trim)
            .filter(|wallet| !wallet.is_empty())
            .ok_or_else(|| AppError::InvalidRequest("walletAddress is required".to_string()))?;
        let status = match self.status.as_deref().map(str::trim) {
            None => StatusFilter::CompletedOnly,
            Some(raw) if raw.eq_ignore_ascii_case("any") => StatusFilter::Any,
            Some(raw) => StatusFilter::Only(parse_status(raw)?),
        };
        let limit = match self.limit {
            None => DEFAULT_PAGE_SIZE,
            Some(n) => NonZeroU32::new(n)
                .ok_or_else(|| AppError::InvalidRequest("limit must be at least 1".to_string()))?,
        };

        let mut filter = OrderFilter::for_wallet(wallet)
            .with_status(status)
            .with_page(limit, self.skip.unwrap_or(0));
        if let Some(raw) = self.product_type.as_deref() {
            filter.product_type = raw.parse::<Direction>().map_err(AppError::InvalidRequest)?;
        }
        if let Some(order) = self.sort_order {
            filter.sort_order = order;
        }
        Ok(filter)
    }
}

/// Query parameters for `GET /admin/anomalies`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AnomaliesParams {
    /// Only anomalies recorded after this instant. Defaults to the epoch.
    pub after: Option<DateTime<Utc>>,
    /// Maximum number of entries, default 100.
    pub limit: Option<u32>,
}

/// Response body for `GET /admin/anomalies`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnomalyListResponse {
    /// Recorded anomaly events, oldest first.
    pub data: Vec<StoredEvent>,
}
