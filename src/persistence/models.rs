//! Database rows and their conversion into domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

use crate::domain::{
    Direction, ProviderDetails, StatusHistoryEntry, Transaction, TransactionId, UserId,
};
use crate::error::AppError;

/// A row of the `transactions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    /// Provider order id.
    pub id: String,
    /// `BUY` / `SELL`.
    pub direction: String,
    /// Crypto currency code.
    pub crypto_currency: String,
    /// Fiat currency code.
    pub fiat_currency: String,
    /// Fiat amount.
    pub fiat_amount: Decimal,
    /// Current status name.
    pub status: String,
    /// JSONB history array.
    pub status_history: Json<Vec<StatusHistoryEntry>>,
    /// Chain.
    pub network: Option<String>,
    /// Wallet address.
    pub wallet_address: Option<String>,
    /// Wallet explorer link.
    pub wallet_link: Option<String>,
    /// Payment method id.
    pub payment_option_id: Option<String>,
    /// Fiat amount in USD.
    pub fiat_amount_in_usd: Option<Decimal>,
    /// Owning user.
    pub user_id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let direction: Direction = row
            .direction
            .parse()
            .map_err(|e: String| AppError::Persistence(format!("row {}: {e}", row.id)))?;
        let status = row
            .status
            .parse()
            .map_err(|e| AppError::Persistence(format!("row {}: {e}", row.id)))?;
        Ok(Self {
            id: TransactionId::new(row.id),
            direction,
            crypto_currency: row.crypto_currency,
            fiat_currency: row.fiat_currency,
            fiat_amount: row.fiat_amount,
            status,
            status_history: row.status_history.0,
            details: ProviderDetails {
                network: row.network,
                wallet_address: row.wallet_address,
                wallet_link: row.wallet_link,
                payment_option_id: row.payment_option_id,
                fiat_amount_in_usd: row.fiat_amount_in_usd,
            },
            user_id: UserId::new(row.user_id),
            created_at: row.created_at,
        })
    }
}

/// A stored row from the `reconciliation_events` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct StoredEvent {
    /// Auto-increment row ID.
    pub id: i64,
    /// Transaction the event refers to.
    pub transaction_id: String,
    /// Event type discriminator (e.g. `"anomaly_detected"`).
    pub event_type: String,
    /// JSONB payload with the serialized event.
    pub payload: serde_json::Value,
    /// Server-side creation timestamp.
    pub created_at: DateTime<Utc>,
}
