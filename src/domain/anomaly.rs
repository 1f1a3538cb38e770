//! Reconciliation anomalies: provider reports that are refused rather than
//! applied.

use serde::Serialize;
use utoipa::ToSchema;

use super::identity::UserId;
use super::transaction::{TransactionId, TransactionStatus};

/// What made a provider report unacceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// The report would move the transaction backward or out of a terminal
    /// status.
    #[error("backward transition {from} -> {to}")]
    BackwardTransition {
        /// Stored status.
        from: TransactionStatus,
        /// Reported status.
        to: TransactionStatus,
    },
    /// The provider used a status string outside the known set.
    #[error("unknown provider status {reported:?}")]
    UnknownStatus {
        /// Raw provider value.
        reported: String,
    },
    /// The stored owner differs from the wallet's current owner.
    #[error("owner mismatch: stored {stored}, wallet owned by {expected}")]
    OwnerMismatch {
        /// Owner recorded on the transaction.
        stored: UserId,
        /// Owner of the wallet at sync time.
        expected: UserId,
    },
    /// No user is associated with the order's wallet.
    #[error("wallet {wallet} has no known owner")]
    UnknownWallet {
        /// Wallet reported on the order.
        wallet: String,
    },
}

/// A refused provider report for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, thiserror::Error)]
#[error("reconciliation anomaly on {transaction_id}: {kind}")]
pub struct ReconciliationAnomaly {
    /// Affected transaction.
    pub transaction_id: TransactionId,
    /// Wallet the order belongs to, when known.
    pub wallet_address: Option<String>,
    /// Cause.
    pub kind: AnomalyKind,
}

impl ReconciliationAnomaly {
    /// Creates an anomaly record.
    #[must_use]
    pub const fn new(
        transaction_id: TransactionId,
        wallet_address: Option<String>,
        kind: AnomalyKind,
    ) -> Self {
        Self {
            transaction_id,
            wallet_address,
            kind,
        }
    }

    /// Short machine-readable cause.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self.kind {
            AnomalyKind::BackwardTransition { .. } => "backward_transition",
            AnomalyKind::UnknownStatus { .. } => "unknown_status",
            AnomalyKind::OwnerMismatch { .. } => "owner_mismatch",
            AnomalyKind::UnknownWallet { .. } => "unknown_wallet",
        }
    }
}
