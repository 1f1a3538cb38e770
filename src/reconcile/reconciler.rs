//! Wallet-level reconciliation against the settlement provider.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use super::merge::{self, Merge};
use crate::credential::{AccessToken, CredentialStore};
use crate::domain::{
    AnomalyKind, EventBus, ReconciliationAnomaly, ReconciliationEvent, TransactionId, UserId,
    WalletLocks,
};
use crate::error::AppError;
use crate::persistence::{TransactionStore, WalletDirectory};
use crate::provider::{
    DEFAULT_PAGE_SIZE, OrderFilter, OrderPage, OrderSource, ProviderOrder, StatusFilter,
};

/// Attempts at writing one record before giving up on a contended row.
const MERGE_ATTEMPTS: usize = 3;

/// Paging and retry limits for one sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Orders requested per page.
    pub page_size: NonZeroU32,
    /// Hard stop for the pagination loop.
    pub max_pages: u32,
    /// Retries after a transient provider failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubled per attempt.
    pub backoff: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: 50,
            max_retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

impl SyncPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1_u32 << attempt.min(16))
    }
}

/// Counters for one wallet sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncReport {
    /// Wallet that was reconciled.
    pub wallet_address: String,
    /// Provider pages fetched.
    pub pages: u32,
    /// Orders seen for the first time.
    pub inserted: u32,
    /// Known transactions that changed.
    pub updated: u32,
    /// Known transactions with nothing to apply.
    pub unchanged: u32,
    /// Refused reports.
    pub anomalies: u32,
    /// Records that could not be applied for other reasons.
    pub failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Merges provider orders into the local ledger, one wallet at a time.
///
/// Syncs of the same wallet are serialized through [`WalletLocks`]; syncs of
/// different wallets run in parallel. Every write is additionally guarded by
/// the stored revision, so concurrent instances cannot interleave history
/// appends either.
#[derive(Debug)]
pub struct Reconciler {
    credentials: Arc<dyn CredentialStore>,
    source: Arc<dyn OrderSource>,
    store: Arc<dyn TransactionStore>,
    directory: Arc<dyn WalletDirectory>,
    locks: WalletLocks,
    event_bus: EventBus,
    policy: SyncPolicy,
}

impl Reconciler {
    /// Creates a reconciler with the default [`SyncPolicy`].
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        source: Arc<dyn OrderSource>,
        store: Arc<dyn TransactionStore>,
        directory: Arc<dyn WalletDirectory>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            credentials,
            source,
            store,
            directory,
            locks: WalletLocks::new(),
            event_bus,
            policy: SyncPolicy::default(),
        }
    }

    /// Replaces the paging and retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    async fn token(&self) -> Result<AccessToken, AppError> {
        let token = self.credentials.access_token().await?;
        token.require()?;
        if token.is_expired_at(Utc::now()) {
            tracing::warn!(
                expires_at = ?token.expires_at(),
                "provider token is past its expiry; sending it anyway"
            );
        }
        Ok(token)
    }

    async fn fetch_with_retry(
        &self,
        filter: &OrderFilter,
        token: &AccessToken,
    ) -> Result<OrderPage, AppError> {
        let mut attempt = 0;
        loop {
            match self.source.fetch_orders(filter, token).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.backoff_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        wallet = %filter.wallet_address,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Fetches one raw page of provider orders.
    ///
    /// Transient failures are retried like during a sync.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConfigured`] before any network call when the
    /// credential is missing or blank, and [`AppError::Provider`] when the
    /// provider call fails.
    pub async fn fetch_page(&self, filter: &OrderFilter) -> Result<OrderPage, AppError> {
        let token = self.token().await?;
        self.fetch_with_retry(filter, &token).await
    }

    /// Reconciles every provider order of `wallet` into the local ledger.
    ///
    /// Records are applied independently: an anomaly or an invalid record is
    /// counted in the report and the remaining records are still applied.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotConfigured`] when the credential is missing or blank;
    ///   the provider is not called.
    /// - [`AppError::Provider`] when a page cannot be fetched. Records merged
    ///   from earlier pages stay applied.
    /// - [`AppError::Persistence`] when the wallet directory is unavailable.
    pub async fn sync_wallet(&self, wallet: &str) -> Result<SyncReport, AppError> {
        let token = self.token().await?;

        let guard = self.locks.acquire(wallet).await;
        let result = self.sync_locked(wallet, &token).await;
        drop(guard);
        self.locks.prune_idle().await;

        match &result {
            Ok(report) => tracing::info!(
                wallet,
                pages = report.pages,
                inserted = report.inserted,
                updated = report.updated,
                anomalies = report.anomalies,
                failures = report.failures,
                "wallet reconciled"
            ),
            Err(err) => tracing::warn!(wallet, error = %err, "wallet reconciliation failed"),
        }
        result
    }

    async fn sync_locked(&self, wallet: &str, token: &AccessToken) -> Result<SyncReport, AppError> {
        let mut report = SyncReport {
            wallet_address: wallet.to_string(),
            ..SyncReport::default()
        };
        let mut owners: HashMap<String, Option<UserId>> = HashMap::new();
        let mut filter = OrderFilter::for_wallet(wallet)
            .with_status(StatusFilter::Any)
            .with_page(self.policy.page_size, 0);

        while report.pages < self.policy.max_pages {
            let page = self.fetch_with_retry(&filter, token).await?;
            report.pages += 1;
            let fetched = u32::try_from(page.data.len()).unwrap_or(u32::MAX);

            for order in &page.data {
                let order_wallet = order.wallet_address.as_deref().unwrap_or(wallet);
                let key = order_wallet.to_ascii_lowercase();
                let owner = match owners.get(&key) {
                    Some(owner) => owner.clone(),
                    None => {
                        let owner = self.directory.owner_of(order_wallet).await?;
                        owners.insert(key, owner.clone());
                        owner
                    }
                };
                self.apply_record(order, owner.as_ref(), &mut report).await;
            }

            let done = match page.meta.and_then(|meta| meta.total_count) {
                Some(total) => {
                    fetched == 0 || u64::from(filter.skip) + u64::from(fetched) >= total
                }
                None => fetched < filter.limit.get(),
            };
            if done {
                return Ok(report);
            }
            filter = filter.next_page(fetched);
        }

        tracing::warn!(
            wallet,
            max_pages = self.policy.max_pages,
            "pagination stopped at page limit"
        );
        Ok(report)
    }

    async fn apply_record(
        &self,
        order: &ProviderOrder,
        owner: Option<&UserId>,
        report: &mut SyncReport,
    ) {
        match self.reconcile_order(order, owner).await {
            Ok(RecordOutcome::Inserted) => report.inserted += 1,
            Ok(RecordOutcome::Updated) => report.updated += 1,
            Ok(RecordOutcome::Unchanged) => report.unchanged += 1,
            Err(AppError::Anomaly(anomaly)) => {
                report.anomalies += 1;
                tracing::warn!(
                    transaction_id = %anomaly.transaction_id,
                    wallet = anomaly.wallet_address.as_deref().unwrap_or_default(),
                    kind = anomaly.kind_str(),
                    "{anomaly}"
                );
                self.event_bus.publish(ReconciliationEvent::AnomalyDetected {
                    anomaly,
                    timestamp: Utc::now(),
                });
            }
            Err(err) => {
                report.failures += 1;
                tracing::warn!(transaction_id = %order.id, error = %err, "order not applied");
            }
        }
    }

    async fn reconcile_order(
        &self,
        order: &ProviderOrder,
        owner: Option<&UserId>,
    ) -> Result<RecordOutcome, AppError> {
        let status = merge::reported_status(order)?;
        let owner = owner.ok_or_else(|| {
            ReconciliationAnomaly::new(
                TransactionId::new(order.id.clone()),
                order.wallet_address.clone(),
                AnomalyKind::UnknownWallet {
                    wallet: order.wallet_address.clone().unwrap_or_default(),
                },
            )
        })?;
        let id = TransactionId::new(order.id.clone());

        for _ in 0..MERGE_ATTEMPTS {
            let Some(stored) = self.store.find(&id).await? else {
                let tx = merge::new_transaction(order, status, owner.clone())
                    .map_err(|e| AppError::InvalidRequest(e.to_string()))?;
                if self.store.insert(&tx).await? {
                    tracing::debug!(transaction_id = %id, status = %status, "transaction inserted");
                    self.event_bus.publish(ReconciliationEvent::TransactionInserted {
                        transaction_id: id,
                        user_id: tx.user_id,
                        status,
                        timestamp: Utc::now(),
                    });
                    return Ok(RecordOutcome::Inserted);
                }
                continue;
            };

            match merge::merge_existing(&stored, order, status, owner)? {
                Merge::Unchanged => return Ok(RecordOutcome::Unchanged),
                Merge::Changed {
                    merged,
                    expected,
                    status_change,
                } => {
                    if !self.store.update(&merged, expected).await? {
                        tracing::debug!(transaction_id = %id, "row changed concurrently, re-reading");
                        continue;
                    }
                    if let Some(change) = status_change {
                        tracing::info!(
                            transaction_id = %id,
                            from = %change.from,
                            to = %change.to,
                            "status changed"
                        );
                        self.event_bus.publish(ReconciliationEvent::StatusChanged {
                            transaction_id: id,
                            from: change.from,
                            to: change.to,
                            changed_at: change.at,
                            timestamp: Utc::now(),
                        });
                    }
                    return Ok(RecordOutcome::Updated);
                }
            }
        }

        Err(AppError::Internal(format!(
            "transaction {id} kept changing during merge"
        )))
    }
}
