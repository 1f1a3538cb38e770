//! PostgreSQL implementation of the persistence layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use super::models::{StoredEvent, TransactionRow};
use super::{
    EventLog, Revision, TransactionListing, TransactionQuery, TransactionStore,
    WalletDirectory, cutoff_for_days,
};
use crate::credential::{AccessToken, CredentialStore};
use crate::domain::{ReconciliationEvent, Transaction, TransactionId, UserId};
use crate::error::AppError;

const TRANSACTION_COLUMNS: &str = "id, direction, crypto_currency, fiat_currency, fiat_amount, \
     status, status_history, network, wallet_address, wallet_link, payment_option_id, \
     fiat_amount_in_usd, user_id, created_at";

const LIST_FILTER: &str = "WHERE ($1::text IS NULL OR user_id = $1) \
     AND ($2::text IS NULL OR lower(wallet_address) = lower($2)) \
     AND ($3::text IS NULL OR status = $3) \
     AND ($4::text IS NULL OR crypto_currency ILIKE $4 OR fiat_currency ILIKE $4 \
          OR wallet_address ILIKE $4 OR network ILIKE $4) \
     AND ($5::timestamptz IS NULL OR created_at >= $5)";

/// PostgreSQL-backed persistence layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
    credential_key: String,
}

impl PostgresPersistence {
    /// Creates a new persistence layer with the given connection pool.
    ///
    /// `credential_key` names the configuration row holding the provider
    /// token.
    #[must_use]
    pub fn new(pool: PgPool, credential_key: impl Into<String>) -> Self {
        Self {
            pool,
            credential_key: credential_key.into(),
        }
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`AppError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::Persistence(e.to_string())
}

/// `%needle%` with LIKE wildcards escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl TransactionStore for PostgresPersistence {
    async fn find(&self, id: &TransactionId) -> Result<Option<Transaction>, AppError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(Transaction::try_from).transpose()
    }

    async fn insert(&self, tx: &Transaction) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO transactions (id, direction, crypto_currency, fiat_currency, fiat_amount, \
             status, status_history, network, wallet_address, wallet_link, payment_option_id, \
             fiat_amount_in_usd, user_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(tx.id.as_str())
        .bind(tx.direction.as_str())
        .bind(&tx.crypto_currency)
        .bind(&tx.fiat_currency)
        .bind(tx.fiat_amount)
        .bind(tx.status.as_str())
        .bind(Json(&tx.status_history))
        .bind(&tx.details.network)
        .bind(&tx.details.wallet_address)
        .bind(&tx.details.wallet_link)
        .bind(&tx.details.payment_option_id)
        .bind(tx.details.fiat_amount_in_usd)
        .bind(tx.user_id.as_str())
        .bind(tx.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, tx: &Transaction, expected: Revision) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE transactions SET status = $2, status_history = $3, network = $4, \
             wallet_address = $5, wallet_link = $6, payment_option_id = $7, \
             fiat_amount_in_usd = $8, updated_at = now() \
             WHERE id = $1 AND user_id = $9 AND status = $10 \
             AND jsonb_array_length(status_history) = $11",
        )
        .bind(tx.id.as_str())
        .bind(tx.status.as_str())
        .bind(Json(&tx.status_history))
        .bind(&tx.details.network)
        .bind(&tx.details.wallet_address)
        .bind(&tx.details.wallet_link)
        .bind(&tx.details.payment_option_id)
        .bind(tx.details.fiat_amount_in_usd)
        .bind(tx.user_id.as_str())
        .bind(expected.status.as_str())
        .bind(i32::try_from(expected.history_len).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(&self, query: &TransactionQuery) -> Result<TransactionListing, AppError> {
        let user_id = query.user_id.as_ref().map(UserId::as_str);
        let status = query.status.map(|s| s.as_str());
        let search = query.search.as_deref().map(like_pattern);

        let count_sql = format!("SELECT COUNT(*) FROM transactions {LIST_FILTER}");
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(user_id)
            .bind(query.wallet_address.as_deref())
            .bind(status)
            .bind(search.as_deref())
            .bind(query.created_after)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        let list_sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions {LIST_FILTER} \
             ORDER BY created_at DESC, id ASC LIMIT $6 OFFSET $7"
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&list_sql)
            .bind(user_id)
            .bind(query.wallet_address.as_deref())
            .bind(status)
            .bind(search.as_deref())
            .bind(query.created_after)
            .bind(query.window.map(|w| to_i64(w.limit)))
            .bind(query.window.map_or(0, |w| to_i64(w.offset)))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let items = rows
            .into_iter()
            .map(Transaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TransactionListing {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl WalletDirectory for PostgresPersistence {
    async fn owner_of(&self, wallet: &str) -> Result<Option<UserId>, AppError> {
        let owner = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM wallets WHERE lower(address) = lower($1)",
        )
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(owner.map(UserId::new))
    }

    async fn wallets_of(&self, user: &UserId) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar::<_, String>(
            "SELECT address FROM wallets WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }
}

#[async_trait]
impl CredentialStore for PostgresPersistence {
    async fn access_token(&self) -> Result<AccessToken, AppError> {
        let value =
            sqlx::query_scalar::<_, String>("SELECT value FROM configurations WHERE key = $1")
                .bind(&self.credential_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        AccessToken::from_row(&self.credential_key, value)
    }
}

#[async_trait]
impl EventLog for PostgresPersistence {
    async fn append(&self, event: &ReconciliationEvent) -> Result<i64, AppError> {
        let payload =
            serde_json::to_value(event).map_err(|e| AppError::Internal(e.to_string()))?;
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO reconciliation_events (transaction_id, event_type, payload, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(event.transaction_id().as_str())
        .bind(event.event_type_str())
        .bind(payload)
        .bind(event.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn anomalies_after(
        &self,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StoredEvent>, AppError> {
        sqlx::query_as::<_, StoredEvent>(
            "SELECT id, transaction_id, event_type, payload, created_at \
             FROM reconciliation_events \
             WHERE event_type = 'anomaly_detected' AND created_at > $1 \
             ORDER BY created_at ASC, id ASC LIMIT $2",
        )
        .bind(after)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn delete_older_than(&self, days: u64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM reconciliation_events WHERE created_at < $1")
            .bind(cutoff_for_days(days))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("eth"), "%eth%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
