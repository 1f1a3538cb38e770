//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Pagination metadata included in list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PaginationMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub rows: u32,
    /// Total number of items.
    pub total: u64,
    /// Total number of pages.
    pub total_pages: u64,
}

impl PaginationMeta {
    /// Builds the metadata for `total` items split into pages of `rows`.
    #[must_use]
    pub fn new(page: u32, rows: u32, total: u64) -> Self {
        let total_pages = if total == 0 || rows == 0 {
            0
        } else {
            total.div_ceil(u64::from(rows))
        };
        Self {
            page,
            rows,
            total,
            total_pages,
        }
    }
}

/// Optional wallet selector shared by scope-bound endpoints.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct WalletParams {
    /// Wallet to narrow to. Required for administrators.
    pub wallet_address: Option<String>,
}
