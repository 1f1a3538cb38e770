//! Transaction service: the query facade over the local ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::task::JoinSet;
use utoipa::ToSchema;

use crate::auth::{ScopeResolver, require_elevated};
use crate::domain::{Identity, Scope, Transaction, TransactionId, TransactionStatus};
use crate::error::AppError;
use crate::persistence::{
    EventLog, PageWindow, StoredEvent, TransactionQuery, TransactionStore, cutoff_for_days,
};
use crate::provider::{OrderFilter, OrderPage};
use crate::reconcile::{Reconciler, SyncReport};

/// Page size used when only `page` is given.
pub const DEFAULT_ROWS: u32 = 20;

/// Largest accepted page size.
pub const MAX_ROWS: u32 = 100;

/// Largest number of anomaly events returned at once.
pub const MAX_ANOMALIES: u32 = 500;

/// Read-side settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySettings {
    /// Reconcile the caller's wallets before listing.
    pub sync_on_read: bool,
    /// Length of the `recent` window in days.
    pub recent_window_days: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            sync_on_read: true,
            recent_window_days: 30,
        }
    }
}

/// Filters of a listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// 1-indexed page.
    pub page: Option<u32>,
    /// Page size.
    pub rows: Option<u32>,
    /// Restrict to the recent window.
    pub recent: bool,
    /// Case-insensitive substring over currency and wallet fields.
    pub search: Option<String>,
    /// Exact status.
    pub status: Option<TransactionStatus>,
    /// Wallet to narrow to; required for administrators.
    pub wallet_address: Option<String>,
}

/// Freshness of the data behind a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    /// Every wallet in scope was reconciled for this request.
    Fresh,
    /// Reconciliation failed; local data is served as is.
    Stale {
        /// Stable code of the first failure.
        code: u32,
    },
    /// No reconciliation was attempted.
    Skipped,
}

/// One page of scoped transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPage {
    /// Rows on the page, newest first.
    pub items: Vec<Transaction>,
    /// Page served.
    pub page: u32,
    /// Page size; equals `total` when unpaginated.
    pub rows: u32,
    /// Rows matching the filters.
    pub total: u64,
    /// Freshness of the data.
    pub sync: SyncState,
}

/// Per-status counts and completed fiat volume for a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TransactionSummary {
    /// Transactions in scope.
    pub total: u64,
    /// Count per status name.
    pub by_status: BTreeMap<String, u64>,
    /// Sum of completed fiat amounts per fiat currency.
    #[schema(value_type = BTreeMap<String, String>)]
    pub completed_volume: BTreeMap<String, Decimal>,
}

/// Resolved `page`/`rows` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Paging {
    page: u32,
    rows: u32,
}

impl Paging {
    /// `None` means "return everything".
    fn from_request(page: Option<u32>, rows: Option<u32>) -> Result<Option<Self>, AppError> {
        if page == Some(0) {
            return Err(AppError::InvalidRequest("page must be at least 1".to_string()));
        }
        if rows == Some(0) {
            return Err(AppError::InvalidRequest("rows must be at least 1".to_string()));
        }
        if page.is_none() && rows.is_none() {
            return Ok(None);
        }
        Ok(Some(Self {
            page: page.unwrap_or(1),
            rows: rows.unwrap_or(DEFAULT_ROWS).min(MAX_ROWS),
        }))
    }

    fn window(self) -> PageWindow {
        PageWindow {
            offset: u64::from(self.page - 1) * u64::from(self.rows),
            limit: u64::from(self.rows),
        }
    }
}

/// Read-side orchestration: scope resolution, optional sync-on-read, and
/// scoped storage queries.
///
/// Every operation resolves the caller's [`Scope`] first. Non-elevated
/// callers only ever see rows they own, whatever the reconciler wrote.
#[derive(Debug, Clone)]
pub struct TransactionService {
    reconciler: Arc<Reconciler>,
    store: Arc<dyn TransactionStore>,
    events: Arc<dyn EventLog>,
    resolver: ScopeResolver,
    settings: QuerySettings,
}

impl TransactionService {
    /// Creates a new `TransactionService`.
    #[must_use]
    pub fn new(
        reconciler: Arc<Reconciler>,
        store: Arc<dyn TransactionStore>,
        events: Arc<dyn EventLog>,
        resolver: ScopeResolver,
        settings: QuerySettings,
    ) -> Self {
        Self {
            reconciler,
            store,
            events,
            resolver,
            settings,
        }
    }

    /// Returns the inner [`Reconciler`].
    #[must_use]
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    fn query_for(&self, scope: &Scope, recent: bool) -> TransactionQuery {
        TransactionQuery {
            user_id: scope.user_id().cloned(),
            wallet_address: scope.wallet_address().map(str::to_string),
            created_after: recent
                .then(|| cutoff_for_days(u64::from(self.settings.recent_window_days))),
            ..TransactionQuery::default()
        }
    }

    async fn sync_targets(&self, targets: Vec<String>) -> Vec<Result<SyncReport, AppError>> {
        let mut tasks = JoinSet::new();
        for wallet in targets {
            let reconciler = Arc::clone(&self.reconciler);
            tasks.spawn(async move { reconciler.sync_wallet(&wallet).await });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.unwrap_or_else(|e| Err(AppError::Internal(e.to_string()))));
        }
        results
    }

    async fn sync_for_read(&self, scope: &Scope) -> SyncState {
        let targets = scope.sync_targets();
        if !self.settings.sync_on_read || targets.is_empty() {
            return SyncState::Skipped;
        }
        let failure = self
            .sync_targets(targets)
            .await
            .into_iter()
            .find_map(Result::err);
        match failure {
            None => SyncState::Fresh,
            Some(err) => {
                tracing::warn!(error = %err, "serving stale transactions");
                SyncState::Stale {
                    code: err.error_code(),
                }
            }
        }
    }

    /// Lists the caller's transactions.
    ///
    /// Without `page` and `rows` every matching row is returned. With only
    /// one of them, the other defaults to page 1 or [`DEFAULT_ROWS`]; `rows`
    /// is capped at [`MAX_ROWS`]. A failed sync-on-read does not fail the
    /// request; the listing reports [`SyncState::Stale`].
    ///
    /// # Errors
    ///
    /// - [`AppError::Unauthorized`] without an identity.
    /// - [`AppError::Forbidden`] for out-of-scope wallets or administrators
    ///   without a wallet.
    /// - [`AppError::InvalidRequest`] for `page=0` or `rows=0`.
    /// - [`AppError::Persistence`] when storage fails.
    pub async fn list_transactions(
        &self,
        identity: Option<&Identity>,
        request: ListRequest,
    ) -> Result<TransactionPage, AppError> {
        let scope = self
            .resolver
            .resolve(identity, request.wallet_address.as_deref())
            .await?;
        let paging = Paging::from_request(request.page, request.rows)?;

        let sync = self.sync_for_read(&scope).await;

        let query = TransactionQuery {
            status: request.status,
            search: request
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            window: paging.map(Paging::window),
            ..self.query_for(&scope, request.recent)
        };
        let listing = self.store.list(&query).await?;

        let (page, rows) = match paging {
            Some(paging) => (paging.page, paging.rows),
            None => (1, u32::try_from(listing.total).unwrap_or(u32::MAX)),
        };

        Ok(TransactionPage {
            items: listing.items,
            page,
            rows,
            total: listing.total,
            sync,
        })
    }

    /// Loads one transaction visible to the caller.
    ///
    /// Administrators may read any transaction. Rows owned by someone else
    /// are reported as missing to regular users.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unauthorized`] without an identity and
    /// [`AppError::TransactionNotFound`] when the row does not exist or is
    /// out of scope.
    pub async fn get_transaction(
        &self,
        identity: Option<&Identity>,
        id: &TransactionId,
    ) -> Result<Transaction, AppError> {
        let identity = identity.ok_or(AppError::Unauthorized)?;
        self.store
            .find(id)
            .await?
            .filter(|tx| identity.is_elevated() || tx.user_id == identity.id)
            .ok_or_else(|| AppError::TransactionNotFound(id.clone()))
    }

    /// Summarises the transactions in the caller's scope from local data.
    ///
    /// # Errors
    ///
    /// Same scope errors as [`Self::list_transactions`], plus
    /// [`AppError::Persistence`].
    pub async fn summary(
        &self,
        identity: Option<&Identity>,
        wallet_address: Option<&str>,
        recent: bool,
    ) -> Result<TransactionSummary, AppError> {
        let scope = self.resolver.resolve(identity, wallet_address).await?;
        let listing = self.store.list(&self.query_for(&scope, recent)).await?;

        let mut summary = TransactionSummary {
            total: listing.total,
            ..TransactionSummary::default()
        };
        for status in TransactionStatus::ALL {
            summary.by_status.insert(status.as_str().to_string(), 0);
        }
        for tx in &listing.items {
            *summary
                .by_status
                .entry(tx.status.as_str().to_string())
                .or_default() += 1;
            if tx.status == TransactionStatus::Completed {
                *summary
                    .completed_volume
                    .entry(tx.fiat_currency.clone())
                    .or_default() += tx.fiat_amount;
            }
        }
        Ok(summary)
    }

    /// Reconciles every wallet in the caller's scope.
    ///
    /// # Errors
    ///
    /// Scope errors as for [`Self::list_transactions`], and the first
    /// reconciliation error if any wallet fails.
    pub async fn sync(
        &self,
        identity: Option<&Identity>,
        wallet_address: Option<&str>,
    ) -> Result<Vec<SyncReport>, AppError> {
        let scope = self.resolver.resolve(identity, wallet_address).await?;
        let mut reports = self
            .sync_targets(scope.sync_targets())
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        reports.sort_by(|a, b| a.wallet_address.cmp(&b.wallet_address));
        Ok(reports)
    }

    /// Fetches one raw provider page for an administrator.
    ///
    /// # Errors
    ///
    /// [`AppError::Unauthorized`] / [`AppError::Forbidden`] for
    /// non-administrators, [`AppError::NotConfigured`] and
    /// [`AppError::Provider`] from the provider call.
    pub async fn provider_orders(
        &self,
        identity: Option<&Identity>,
        filter: &OrderFilter,
    ) -> Result<OrderPage, AppError> {
        let admin = require_elevated(identity)?;
        tracing::info!(admin = %admin.id, wallet = %filter.wallet_address, "raw provider query");
        self.reconciler.fetch_page(filter).await
    }

    /// Recorded anomalies after `after`, oldest first.
    ///
    /// # Errors
    ///
    /// [`AppError::Unauthorized`] / [`AppError::Forbidden`] for
    /// non-administrators and [`AppError::Persistence`] on storage failure.
    pub async fn anomalies(
        &self,
        identity: Option<&Identity>,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StoredEvent>, AppError> {
        require_elevated(identity)?;
        self.events
            .anomalies_after(after, limit.clamp(1, MAX_ANOMALIES))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::credential::{AccessToken, CredentialStore};
    use crate::domain::transaction::tests::{make_transaction, ts};
    use crate::domain::{EventBus, UserId};
    use crate::persistence::{InMemoryPersistence, WalletDirectory};
    use crate::provider::{OrderSource, ProviderError};

    #[derive(Debug)]
    struct FailingSource;

    #[async_trait]
    impl OrderSource for FailingSource {
        async fn fetch_orders(
            &self,
            _filter: &OrderFilter,
            _token: &AccessToken,
        ) -> Result<OrderPage, ProviderError> {
            Err(ProviderError::Status {
                status_code: 401,
                raw_body: "expired".to_string(),
            })
        }
    }

    fn service(store: InMemoryPersistence, settings: QuerySettings) -> TransactionService {
        let store = Arc::new(store);
        let reconciler = Reconciler::new(
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            Arc::new(FailingSource),
            Arc::clone(&store) as Arc<dyn TransactionStore>,
            Arc::clone(&store) as Arc<dyn WalletDirectory>,
            EventBus::new(16),
        );
        TransactionService::new(
            Arc::new(reconciler),
            Arc::clone(&store) as Arc<dyn TransactionStore>,
            Arc::clone(&store) as Arc<dyn EventLog>,
            ScopeResolver::new(Arc::clone(&store) as Arc<dyn WalletDirectory>),
            settings,
        )
    }

    fn offline() -> QuerySettings {
        QuerySettings {
            sync_on_read: false,
            ..QuerySettings::default()
        }
    }

    fn two_users() -> InMemoryPersistence {
        let mut mine_old = make_transaction("a", TransactionStatus::Completed);
        mine_old.created_at = ts(10);
        let mut mine_new = make_transaction("b", TransactionStatus::Pending);
        mine_new.created_at = ts(20);
        let mut theirs = make_transaction("c", TransactionStatus::Completed);
        theirs.user_id = UserId::new("user-2");
        theirs.details.wallet_address = Some("0xdef".to_string());
        InMemoryPersistence::new()
            .with_wallet("0xabc", "user-1")
            .with_wallet("0xdef", "user-2")
            .with_transaction(mine_old)
            .with_transaction(mine_new)
            .with_transaction(theirs)
    }

    #[test]
    fn paging_defaults() {
        assert_eq!(Paging::from_request(None, None).ok(), Some(None));
        assert_eq!(
            Paging::from_request(Some(2), None).ok().flatten(),
            Some(Paging { page: 2, rows: 20 })
        );
        assert_eq!(
            Paging::from_request(None, Some(500)).ok().flatten(),
            Some(Paging { page: 1, rows: 100 })
        );
        assert!(Paging::from_request(Some(0), None).is_err());
        assert!(Paging::from_request(None, Some(0)).is_err());
        assert_eq!(
            Paging { page: 3, rows: 10 }.window(),
            PageWindow {
                offset: 20,
                limit: 10
            }
        );
    }

    #[tokio::test]
    async fn unpaginated_listing_returns_everything_in_order() {
        let service = service(two_users(), offline());
        let user = Identity::user("user-1");
        let Ok(page) = service
            .list_transactions(Some(&user), ListRequest::default())
            .await
        else {
            panic!("listing should succeed");
        };
        let ids: Vec<&str> = page.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!((page.page, page.rows, page.total), (1, 2, 2));
        assert_eq!(page.sync, SyncState::Skipped);
    }

    #[tokio::test]
    async fn oversized_recent_window_is_capped() {
        let settings = QuerySettings {
            recent_window_days: 200_000_000,
            ..offline()
        };
        let service = service(two_users(), settings);
        let user = Identity::user("user-1");
        let request = ListRequest {
            recent: true,
            ..ListRequest::default()
        };
        let Ok(page) = service.list_transactions(Some(&user), request).await else {
            panic!("listing should succeed");
        };
        assert_eq!(page.total, 2);

        let Ok(summary) = service.summary(Some(&user), None, true).await else {
            panic!("summary should succeed");
        };
        assert_eq!(summary.total, 2);
    }

    #[tokio::test]
    async fn search_never_crosses_users() {
        let service = service(two_users(), offline());
        let user = Identity::user("user-1");
        let request = ListRequest {
            search: Some("0xdef".to_string()),
            ..ListRequest::default()
        };
        let Ok(page) = service.list_transactions(Some(&user), request).await else {
            panic!("listing should succeed");
        };
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn failed_sync_serves_stale_data() {
        let store = two_users().with_credential(r#"{"accessToken":"tok"}"#);
        let service = service(store, QuerySettings::default());
        let user = Identity::user("user-1");
        let Ok(page) = service
            .list_transactions(Some(&user), ListRequest::default())
            .await
        else {
            panic!("listing should succeed");
        };
        assert_eq!(page.total, 2);
        assert_eq!(page.sync, SyncState::Stale { code: 5002 });
    }

    #[tokio::test]
    async fn missing_credential_marks_listing_stale_with_config_code() {
        let service = service(two_users(), QuerySettings::default());
        let user = Identity::user("user-1");
        let Ok(page) = service
            .list_transactions(Some(&user), ListRequest::default())
            .await
        else {
            panic!("listing should succeed");
        };
        assert_eq!(page.sync, SyncState::Stale { code: 3101 });
    }

    #[tokio::test]
    async fn foreign_transaction_is_not_found() {
        let service = service(two_users(), offline());
        let user = Identity::user("user-1");
        let result = service
            .get_transaction(Some(&user), &TransactionId::new("c"))
            .await;
        assert!(matches!(result, Err(AppError::TransactionNotFound(_))));

        let admin = Identity::admin("ops");
        let result = service
            .get_transaction(Some(&admin), &TransactionId::new("c"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn summary_counts_statuses_and_completed_volume() {
        let service = service(two_users(), offline());
        let user = Identity::user("user-1");
        let Ok(summary) = service.summary(Some(&user), None, false).await else {
            panic!("summary should succeed");
        };
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_status.get("COMPLETED"), Some(&1));
        assert_eq!(summary.by_status.get("PENDING"), Some(&1));
        assert_eq!(summary.by_status.get("FAILED"), Some(&0));
        assert_eq!(
            summary.completed_volume.get("EUR"),
            Some(&Decimal::new(500, 0))
        );
    }

    #[tokio::test]
    async fn admin_only_operations_reject_users() {
        let service = service(two_users(), offline());
        let user = Identity::user("user-1");
        let result = service
            .provider_orders(Some(&user), &OrderFilter::for_wallet("0xabc"))
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        let result = service.anomalies(None, ts(0), 10).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn explicit_sync_surfaces_provider_rejection() {
        let store = two_users().with_credential(r#"{"accessToken":"tok"}"#);
        let service = service(store, offline());
        let user = Identity::user("user-1");
        let result = service.sync(Some(&user), None).await;
        assert!(matches!(result, Err(AppError::Provider(_))));
    }
}
