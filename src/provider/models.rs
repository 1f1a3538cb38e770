//! Order query filter and the provider's order schema.
//!
//! The response schema is validated at the boundary: anything the provider
//! may omit is an `Option`, and a body that does not fit is a
//! [`super::ProviderError::MalformedResponse`].

use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Direction, ProviderDetails, TransactionStatus};

/// Default page size for provider order queries.
pub const DEFAULT_PAGE_SIZE: NonZeroU32 = match NonZeroU32::new(100) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

/// Which order statuses to request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    /// Completed orders only, matching the buy-history view.
    #[default]
    CompletedOnly,
    /// One specific status.
    Only(TransactionStatus),
    /// No status filter.
    Any,
}

impl StatusFilter {
    fn as_query_value(self) -> Option<&'static str> {
        match self {
            Self::CompletedOnly => Some(TransactionStatus::Completed.as_str()),
            Self::Only(status) => Some(status.as_str()),
            Self::Any => None,
        }
    }
}

/// Ordering of provider results by recency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest first.
    #[default]
    Desc,
    /// Oldest first.
    Asc,
}

impl SortOrder {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Desc => "desc",
            Self::Asc => "asc",
        }
    }
}

/// Parameters of one order query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFilter {
    /// Wallet whose orders are requested. The provider requires one.
    pub wallet_address: String,
    /// Status restriction.
    pub status: StatusFilter,
    /// Product type, buy by default.
    pub product_type: Direction,
    /// Recency ordering.
    pub sort_order: SortOrder,
    /// Page size.
    pub limit: NonZeroU32,
    /// Offset of the first order.
    pub skip: u32,
}

impl OrderFilter {
    /// Filter with product defaults for `wallet_address`.
    #[must_use]
    pub fn for_wallet(wallet_address: impl Into<String>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            status: StatusFilter::default(),
            product_type: Direction::Buy,
            sort_order: SortOrder::default(),
            limit: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }

    /// Replaces the status restriction.
    #[must_use]
    pub const fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    /// Replaces the page window.
    #[must_use]
    pub const fn with_page(mut self, limit: NonZeroU32, skip: u32) -> Self {
        self.limit = limit;
        self.skip = skip;
        self
    }

    /// Same filter, advanced past the `fetched` orders of the current page.
    ///
    /// The provider may return fewer orders than `limit`, so the offset
    /// follows what was actually received.
    #[must_use]
    pub fn next_page(&self, fetched: u32) -> Self {
        let mut next = self.clone();
        next.skip = self.skip.saturating_add(fetched);
        next
    }

    /// Query parameters in the provider's encoding. Array-valued filters are
    /// JSON-encoded; URL escaping happens when the request is built.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let products = serde_json::json!([self.product_type.as_str()]).to_string();
        let mut pairs = vec![
            ("limit", self.limit.get().to_string()),
            ("skip", self.skip.to_string()),
            ("filter[productsAvailed]", products),
        ];
        if let Some(status) = self.status.as_query_value() {
            pairs.push(("filter[status]", status.to_string()));
        }
        pairs.push(("filter[sortOrder]", self.sort_order.as_str().to_string()));
        pairs.push(("filter[walletAddress]", self.wallet_address.clone()));
        pairs
    }
}

/// One status change as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatusEntry {
    /// Raw status string.
    pub status: String,
    /// Time of the change.
    pub created_at: Option<DateTime<Utc>>,
    /// Optional explanation.
    pub message: Option<String>,
}

/// An order as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOrder {
    /// Provider order id.
    pub id: String,
    /// Raw status string; mapped to [`TransactionStatus`] during
    /// reconciliation.
    pub status: String,
    /// Order creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Provider explanation of the current status.
    pub status_reason: Option<String>,
    /// `"BUY"` or `"SELL"`.
    pub is_buy_or_sell: Option<String>,
    /// Crypto currency code.
    pub crypto_currency: Option<String>,
    /// Fiat currency code.
    pub fiat_currency: Option<String>,
    /// Fiat amount.
    pub fiat_amount: Option<Decimal>,
    /// Fiat amount in USD.
    pub fiat_amount_in_usd: Option<Decimal>,
    /// Wallet address.
    pub wallet_address: Option<String>,
    /// Wallet explorer link.
    pub wallet_link: Option<String>,
    /// Chain.
    pub network: Option<String>,
    /// Payment method id.
    pub payment_option_id: Option<String>,
    /// Provider-side status history.
    #[serde(default)]
    pub status_histories: Vec<ProviderStatusEntry>,
}

impl ProviderOrder {
    /// When the order entered its reported status.
    ///
    /// Prefers the provider's own history entry for that status, then
    /// `updatedAt`, `completedAt`, and finally `createdAt`.
    #[must_use]
    pub fn status_changed_at(&self) -> Option<DateTime<Utc>> {
        let from_history = self
            .status_histories
            .iter()
            .filter(|entry| entry.status.eq_ignore_ascii_case(self.status.trim()))
            .filter_map(|entry| entry.created_at)
            .max();
        from_history
            .or(self.updated_at)
            .or(self.completed_at)
            .or(self.created_at)
    }

    /// Message attached to the reported status, if any.
    #[must_use]
    pub fn status_message(&self) -> Option<String> {
        self.status_histories
            .iter()
            .rev()
            .find(|entry| entry.status.eq_ignore_ascii_case(self.status.trim()))
            .and_then(|entry| entry.message.clone())
            .or_else(|| self.status_reason.clone())
    }

    /// Descriptive attributes overwritten on every sync.
    #[must_use]
    pub fn details(&self) -> ProviderDetails {
        ProviderDetails {
            network: self.network.clone(),
            wallet_address: self.wallet_address.clone(),
            wallet_link: self.wallet_link.clone(),
            payment_option_id: self.payment_option_id.clone(),
            fiat_amount_in_usd: self.fiat_amount_in_usd,
        }
    }
}

/// Pagination metadata returned alongside orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Total orders matching the filter.
    pub total_count: Option<u64>,
    /// Page size echoed by the provider.
    pub limit: Option<u32>,
    /// Offset echoed by the provider.
    pub skip: Option<u32>,
}

/// One page of provider orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderPage {
    /// Pagination metadata.
    #[serde(default)]
    pub meta: Option<PageMeta>,
    /// Orders on this page.
    pub data: Vec<ProviderOrder>,
}
