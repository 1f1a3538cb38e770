//! Local transaction record and its status state machine.
//!
//! A [`Transaction`] mirrors one settlement-provider order. Its
//! `status_history` is append-only and ordered by timestamp; the last entry
//! always carries the current `status`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::anomaly::{AnomalyKind, ReconciliationAnomaly};
use super::identity::UserId;

/// Identifier of a transaction.
///
/// The provider's order id is used verbatim, so a provider order maps 1:1
/// to a local transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wraps a provider order id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Whether the user bought or sold crypto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Fiat in, crypto out.
    Buy,
    /// Crypto in, fiat out.
    Sell,
}

impl Direction {
    /// Provider wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Lifecycle status of a transaction.
///
/// ```text
/// PENDING -> PROCESSING -> COMPLETED | FAILED | EXPIRED
/// PENDING -> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Order created, nothing settled yet.
    Pending,
    /// Provider is settling the order.
    Processing,
    /// Settled successfully.
    Completed,
    /// Settlement failed.
    Failed,
    /// Cancelled before processing.
    Cancelled,
    /// Timed out during processing.
    Expired,
}

/// Outcome of comparing a stored status with a reported one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Reported status equals the stored one.
    Unchanged,
    /// Reported status is a legal move forward.
    Forward,
    /// Reported status would move the transaction backward or out of a
    /// terminal state.
    Backward,
}

impl TransactionStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Wire and storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Returns `true` for statuses that accept no further transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired
        )
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired => 2,
        }
    }

    /// Classifies a move from `self` to `next`.
    ///
    /// The provider may skip intermediate states, so any move to a higher
    /// rank is forward. Terminal states are sticky.
    #[must_use]
    pub const fn transition_to(self, next: Self) -> Transition {
        if self as u8 == next as u8 {
            Transition::Unchanged
        } else if self.is_terminal() || next.rank() <= self.rank() {
            Transition::Backward
        } else {
            Transition::Forward
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// One entry of a transaction's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    /// Status entered.
    pub status: TransactionStatus,
    /// Provider-reported time of the change.
    pub timestamp: DateTime<Utc>,
    /// Optional provider message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Provider-sourced attributes that are overwritten on every sync and never
/// historized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDetails {
    /// Chain the crypto leg settles on.
    pub network: Option<String>,
    /// Destination or source wallet.
    pub wallet_address: Option<String>,
    /// Explorer link for the wallet or transfer.
    pub wallet_link: Option<String>,
    /// Payment method used on the fiat leg.
    pub payment_option_id: Option<String>,
    /// Fiat amount converted to USD by the provider.
    pub fiat_amount_in_usd: Option<Decimal>,
}

/// Local mirror of one provider order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Provider order id.
    pub id: TransactionId,
    /// Buy or sell.
    pub direction: Direction,
    /// Crypto currency code, never empty.
    pub crypto_currency: String,
    /// Fiat currency code, never empty.
    pub fiat_currency: String,
    /// Non-negative fiat amount.
    pub fiat_amount: Decimal,
    /// Current status; equals the last history entry's status.
    pub status: TransactionStatus,
    /// Append-only, timestamp-ordered history.
    pub status_history: Vec<StatusHistoryEntry>,
    /// Descriptive attributes refreshed on each sync.
    #[serde(flatten)]
    pub details: ProviderDetails,
    /// Owning user. Immutable.
    pub user_id: UserId,
    /// Creation time. Immutable.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Applies a reported status.
    ///
    /// Returns `Ok(false)` when the status is unchanged and `Ok(true)` when a
    /// history entry was appended. A transaction with an empty history is
    /// seeded with `(status, created_at)` first. The entry timestamp is
    /// raised to the previous entry's timestamp if the provider reports an
    /// older one.
    ///
    /// # Errors
    ///
    /// Returns a [`ReconciliationAnomaly`] for backward moves or moves out of
    /// a terminal status; the transaction is left untouched.
    pub fn apply_status(
        &mut self,
        next: TransactionStatus,
        at: DateTime<Utc>,
        message: Option<String>,
    ) -> Result<bool, ReconciliationAnomaly> {
        match self.status.transition_to(next) {
            Transition::Unchanged => Ok(false),
            Transition::Backward => Err(ReconciliationAnomaly::new(
                self.id.clone(),
                self.details.wallet_address.clone(),
                AnomalyKind::BackwardTransition {
                    from: self.status,
                    to: next,
                },
            )),
            Transition::Forward => {
                if self.status_history.is_empty() {
                    self.status_history.push(StatusHistoryEntry {
                        status: self.status,
                        timestamp: self.created_at,
                        message: None,
                    });
                }
                let floor = self
                    .status_history
                    .last()
                    .map_or(self.created_at, |entry| entry.timestamp);
                self.status_history.push(StatusHistoryEntry {
                    status: next,
                    timestamp: at.max(floor),
                    message,
                });
                self.status = next;
                Ok(true)
            }
        }
    }

    /// Checks the history invariants: timestamps non-decreasing and the last
    /// entry matching the current status.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let ordered = self
            .status_history
            .windows(2)
            .all(|pair| matches!(pair, [a, b] if a.timestamp <= b.timestamp));
        let tail_matches = self
            .status_history
            .last()
            .is_none_or(|entry| entry.status == self.status);
        ordered && tail_matches
    }

    /// Case-insensitive substring match over currency and wallet fields.
    #[must_use]
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [
            Some(self.crypto_currency.as_str()),
            Some(self.fiat_currency.as_str()),
            self.details.wallet_address.as_deref(),
            self.details.network.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}
