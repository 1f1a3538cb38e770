//! Persistence layer: transactions, wallet ownership, credentials, and the
//! reconciliation event log.
//!
//! Storage is reached through the traits below. [`PostgresPersistence`]
//! implements them on `sqlx::PgPool`; [`InMemoryPersistence`] backs local
//! development with persistence disabled and the test suite.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ReconciliationEvent, Transaction, TransactionId, TransactionStatus, UserId,
};
use crate::error::AppError;

pub use memory::InMemoryPersistence;
pub use models::StoredEvent;
pub use postgres::PostgresPersistence;

/// Offset/limit window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Rows to skip.
    pub offset: u64,
    /// Rows to return.
    pub limit: u64,
}

/// Filters for listing transactions. `None` fields do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Owning user.
    pub user_id: Option<UserId>,
    /// Wallet address, compared case-insensitively.
    pub wallet_address: Option<String>,
    /// Exact status.
    pub status: Option<TransactionStatus>,
    /// Case-insensitive substring over currency, wallet, and network fields.
    pub search: Option<String>,
    /// Lower bound on `created_at`.
    pub created_after: Option<DateTime<Utc>>,
    /// Page window; `None` returns every matching row.
    pub window: Option<PageWindow>,
}

impl TransactionQuery {
    /// Returns `true` if `tx` passes every filter except the window.
    #[must_use]
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.user_id.as_ref().is_none_or(|id| *id == tx.user_id)
            && self.wallet_address.as_deref().is_none_or(|wallet| {
                tx.details
                    .wallet_address
                    .as_deref()
                    .is_some_and(|own| own.eq_ignore_ascii_case(wallet))
            })
            && self.status.is_none_or(|status| status == tx.status)
            && self
                .search
                .as_deref()
                .is_none_or(|needle| tx.matches_search(needle))
            && self.created_after.is_none_or(|after| tx.created_at >= after)
    }
}

/// One page of transactions plus the unpaged total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionListing {
    /// Rows on the page, newest first.
    pub items: Vec<Transaction>,
    /// Rows matching the filters.
    pub total: u64,
}

/// Stored state a merge was computed from.
///
/// Updates only apply when the row still has this revision, so two writers
/// can never interleave history appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    /// Status at read time.
    pub status: TransactionStatus,
    /// History length at read time.
    pub history_len: usize,
}

impl Revision {
    /// Revision of `tx` as currently held.
    #[must_use]
    pub fn of(tx: &Transaction) -> Self {
        Self {
            status: tx.status,
            history_len: tx.status_history.len(),
        }
    }
}

/// Local system of record for transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync + std::fmt::Debug {
    /// Loads one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`] on storage failure.
    async fn find(&self, id: &TransactionId) -> Result<Option<Transaction>, AppError>;

    /// Inserts a transaction unless one with the same id exists.
    ///
    /// Returns `false` when the id was already taken.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`] on storage failure.
    async fn insert(&self, tx: &Transaction) -> Result<bool, AppError>;

    /// Replaces status, history, and descriptive fields in one atomic write,
    /// provided the stored row still has `expected` revision.
    ///
    /// Returns `false` when the row changed underneath the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`] on storage failure.
    async fn update(&self, tx: &Transaction, expected: Revision) -> Result<bool, AppError>;

    /// Lists transactions newest first, ties broken by id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`] on storage failure.
    async fn list(&self, query: &TransactionQuery) -> Result<TransactionListing, AppError>;
}

/// Wallet-to-user associations.
#[async_trait]
pub trait WalletDirectory: Send + Sync + std::fmt::Debug {
    /// User owning `wallet`, compared case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`] on storage failure.
    async fn owner_of(&self, wallet: &str) -> Result<Option<UserId>, AppError>;

    /// Wallets associated with `user`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`] on storage failure.
    async fn wallets_of(&self, user: &UserId) -> Result<Vec<String>, AppError>;
}

/// Durable record of reconciliation events.
#[async_trait]
pub trait EventLog: Send + Sync + std::fmt::Debug {
    /// Appends an event, returning its row id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`] on storage failure.
    async fn append(&self, event: &ReconciliationEvent) -> Result<i64, AppError>;

    /// Anomaly events recorded after `after`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`] on storage failure.
    async fn anomalies_after(
        &self,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StoredEvent>, AppError>;

    /// Deletes events older than `days` days, returning the count removed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`] on storage failure.
    async fn delete_older_than(&self, days: u64) -> Result<u64, AppError>;
}

/// Longest window honoured by [`cutoff_for_days`].
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Start of a window reaching `days` back from now, capped at
/// [`MAX_WINDOW_DAYS`].
pub(crate) fn cutoff_for_days(days: u64) -> DateTime<Utc> {
    let days = days.min(u64::from(MAX_WINDOW_DAYS));
    chrono::TimeDelta::try_days(i64::try_from(days).unwrap_or(i64::MAX))
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_capped_instead_of_overflowing() {
        let capped = cutoff_for_days(u64::MAX);
        let longest = cutoff_for_days(u64::from(MAX_WINDOW_DAYS));
        assert!((longest - capped).num_seconds().abs() < 5);
        assert!(capped > DateTime::<Utc>::MIN_UTC);
        assert!(cutoff_for_days(1) > capped);
    }
}
