//! In-memory implementation of the persistence layer.
//!
//! Used when `PERSISTENCE_ENABLED=false` and throughout the test suite.
//! Every collection sits behind its own [`tokio::sync::RwLock`], so readers
//! never block each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::models::StoredEvent;
use super::{
    EventLog, Revision, TransactionListing, TransactionQuery, TransactionStore,
    WalletDirectory, cutoff_for_days,
};
use crate::credential::{AccessToken, CredentialStore, DEFAULT_CREDENTIAL_KEY};
use crate::domain::{ReconciliationEvent, Transaction, TransactionId, UserId};
use crate::error::AppError;

/// Process-local stores for transactions, wallets, the credential, and
/// events.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
    wallets: RwLock<Vec<(String, UserId)>>,
    credential: RwLock<Option<String>>,
    events: RwLock<Vec<StoredEvent>>,
    next_event_id: AtomicI64,
}

impl InMemoryPersistence {
    /// Creates empty stores with no credential configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `address` with `user`.
    #[must_use]
    pub fn with_wallet(mut self, address: &str, user: &str) -> Self {
        self.wallets
            .get_mut()
            .push((address.to_string(), UserId::new(user)));
        self
    }

    /// Stores a raw credential value.
    #[must_use]
    pub fn with_credential(mut self, raw: &str) -> Self {
        *self.credential.get_mut() = Some(raw.to_string());
        self
    }

    /// Seeds a transaction.
    #[must_use]
    pub fn with_transaction(mut self, tx: Transaction) -> Self {
        self.transactions.get_mut().insert(tx.id.clone(), tx);
        self
    }

    /// Replaces or clears the credential value.
    pub async fn set_credential(&self, raw: Option<&str>) {
        *self.credential.write().await = raw.map(str::to_string);
    }

    /// Associates `address` with `user` at runtime.
    pub async fn link_wallet(&self, address: &str, user: &str) {
        self.wallets
            .write()
            .await
            .push((address.to_string(), UserId::new(user)));
    }

    /// All recorded events, oldest first.
    pub async fn events(&self) -> Vec<StoredEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl TransactionStore for InMemoryPersistence {
    async fn find(&self, id: &TransactionId) -> Result<Option<Transaction>, AppError> {
        Ok(self.transactions.read().await.get(id).cloned())
    }

    async fn insert(&self, tx: &Transaction) -> Result<bool, AppError> {
        let mut map = self.transactions.write().await;
        if map.contains_key(&tx.id) {
            return Ok(false);
        }
        map.insert(tx.id.clone(), tx.clone());
        Ok(true)
    }

    async fn update(&self, tx: &Transaction, expected: Revision) -> Result<bool, AppError> {
        let mut map = self.transactions.write().await;
        let Some(stored) = map.get_mut(&tx.id) else {
            return Ok(false);
        };
        if Revision::of(stored) != expected || stored.user_id != tx.user_id {
            return Ok(false);
        }
        stored.status = tx.status;
        stored.status_history.clone_from(&tx.status_history);
        stored.details = tx.details.clone();
        Ok(true)
    }

    async fn list(&self, query: &TransactionQuery) -> Result<TransactionListing, AppError> {
        let map = self.transactions.read().await;
        let mut matching: Vec<Transaction> =
            map.values().filter(|tx| query.matches(tx)).cloned().collect();
        drop(map);

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        let total = matching.len() as u64;

        let items = match query.window {
            Some(window) => matching
                .into_iter()
                .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
                .collect(),
            None => matching,
        };

        Ok(TransactionListing { items, total })
    }
}

#[async_trait]
impl WalletDirectory for InMemoryPersistence {
    async fn owner_of(&self, wallet: &str) -> Result<Option<UserId>, AppError> {
        Ok(self
            .wallets
            .read()
            .await
            .iter()
            .find(|(address, _)| address.eq_ignore_ascii_case(wallet))
            .map(|(_, user)| user.clone()))
    }

    async fn wallets_of(&self, user: &UserId) -> Result<Vec<String>, AppError> {
        Ok(self
            .wallets
            .read()
            .await
            .iter()
            .filter(|(_, owner)| owner == user)
            .map(|(address, _)| address.clone())
            .collect())
    }
}

#[async_trait]
impl CredentialStore for InMemoryPersistence {
    async fn access_token(&self) -> Result<AccessToken, AppError> {
        let value = self.credential.read().await.clone();
        AccessToken::from_row(DEFAULT_CREDENTIAL_KEY, value)
    }
}

#[async_trait]
impl EventLog for InMemoryPersistence {
    async fn append(&self, event: &ReconciliationEvent) -> Result<i64, AppError> {
        let payload =
            serde_json::to_value(event).map_err(|e| AppError::Internal(e.to_string()))?;
        let id = self.next_event_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.events.write().await.push(StoredEvent {
            id,
            transaction_id: event.transaction_id().to_string(),
            event_type: event.event_type_str().to_string(),
            payload,
            created_at: event.timestamp(),
        });
        Ok(id)
    }

    async fn anomalies_after(
        &self,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StoredEvent>, AppError> {
        let mut found: Vec<StoredEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == "anomaly_detected" && e.created_at > after)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        found.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(found)
    }

    async fn delete_older_than(&self, days: u64) -> Result<u64, AppError> {
        let cutoff = cutoff_for_days(days);
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.created_at >= cutoff);
        Ok((before - events.len()) as u64)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::transaction::tests::{make_transaction, ts};
    use crate::domain::{AnomalyKind, ReconciliationAnomaly, TransactionStatus};
    use crate::persistence::PageWindow;

    fn seeded() -> InMemoryPersistence {
        let mut older = make_transaction("o1", TransactionStatus::Completed);
        older.created_at = ts(10);
        let mut newer = make_transaction("o2", TransactionStatus::Pending);
        newer.created_at = ts(20);
        newer.crypto_currency = "BTC".to_string();
        let mut tie = make_transaction("o0", TransactionStatus::Pending);
        tie.created_at = ts(20);
        let mut foreign = make_transaction("o3", TransactionStatus::Completed);
        foreign.user_id = UserId::new("user-2");
        foreign.details.wallet_address = Some("0xdef".to_string());
        InMemoryPersistence::new()
            .with_transaction(older)
            .with_transaction(newer)
            .with_transaction(tie)
            .with_transaction(foreign)
    }

    #[tokio::test]
    async fn list_orders_newest_first_with_id_tiebreak() {
        let store = seeded();
        let query = TransactionQuery {
            user_id: Some(UserId::new("user-1")),
            ..TransactionQuery::default()
        };
        let Ok(listing) = store.list(&query).await else {
            panic!("list failed");
        };
        let ids: Vec<&str> = listing.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["o0", "o2", "o1"]);
        assert_eq!(listing.total, 3);
    }

    #[tokio::test]
    async fn list_applies_filters_and_window() {
        let store = seeded();
        let query = TransactionQuery {
            user_id: Some(UserId::new("user-1")),
            status: Some(TransactionStatus::Pending),
            window: Some(PageWindow {
                offset: 1,
                limit: 5,
            }),
            ..TransactionQuery::default()
        };
        let Ok(listing) = store.list(&query).await else {
            panic!("list failed");
        };
        assert_eq!(listing.total, 2);
        assert_eq!(listing.items.len(), 1);

        let search = TransactionQuery {
            search: Some("btc".to_string()),
            ..TransactionQuery::default()
        };
        let Ok(found) = store.list(&search).await else {
            panic!("list failed");
        };
        assert_eq!(found.total, 1);
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let store = InMemoryPersistence::new();
        let tx = make_transaction("o1", TransactionStatus::Pending);
        assert!(matches!(store.insert(&tx).await, Ok(true)));
        assert!(matches!(store.insert(&tx).await, Ok(false)));
    }

    #[tokio::test]
    async fn stale_update_is_refused() {
        let store = InMemoryPersistence::new();
        let tx = make_transaction("o1", TransactionStatus::Pending);
        let _ = store.insert(&tx).await;
        let stale = Revision::of(&tx);

        let mut first = tx.clone();
        let _ = first.apply_status(TransactionStatus::Processing, ts(5), None);
        assert!(matches!(store.update(&first, stale).await, Ok(true)));

        let mut second = tx;
        let _ = second.apply_status(TransactionStatus::Completed, ts(6), None);
        assert!(matches!(store.update(&second, stale).await, Ok(false)));
    }

    #[tokio::test]
    async fn wallet_lookup_is_case_insensitive() {
        let store = InMemoryPersistence::new().with_wallet("0xAbC", "user-1");
        let Ok(owner) = store.owner_of("0xabc").await else {
            panic!("lookup failed");
        };
        assert_eq!(owner, Some(UserId::new("user-1")));
        let Ok(wallets) = store.wallets_of(&UserId::new("user-1")).await else {
            panic!("lookup failed");
        };
        assert_eq!(wallets, vec!["0xAbC".to_string()]);
    }

    #[tokio::test]
    async fn missing_credential_is_not_configured() {
        let store = InMemoryPersistence::new();
        assert!(matches!(
            store.access_token().await,
            Err(AppError::NotConfigured(_))
        ));
        store.set_credential(Some(r#"{"accessToken":"t"}"#)).await;
        assert!(matches!(store.access_token().await, Ok(t) if t.as_str() == "t"));
    }

    #[tokio::test]
    async fn event_log_lists_only_anomalies() {
        let store = InMemoryPersistence::new();
        let anomaly = ReconciliationEvent::AnomalyDetected {
            anomaly: ReconciliationAnomaly::new(
                TransactionId::new("o1"),
                None,
                AnomalyKind::UnknownStatus {
                    reported: "REFUNDED".to_string(),
                },
            ),
            timestamp: Utc::now(),
        };
        let inserted = ReconciliationEvent::TransactionInserted {
            transaction_id: TransactionId::new("o2"),
            user_id: UserId::new("user-1"),
            status: TransactionStatus::Pending,
            timestamp: Utc::now(),
        };
        let _ = store.append(&anomaly).await;
        let _ = store.append(&inserted).await;

        let Ok(found) = store.anomalies_after(ts(0), 10).await else {
            panic!("query failed");
        };
        assert_eq!(found.len(), 1);
        assert_eq!(store.events().await.len(), 2);
        assert!(matches!(store.delete_older_than(1).await, Ok(0)));
    }
}
