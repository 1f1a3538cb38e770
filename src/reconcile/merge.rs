//! Pure merge of one provider order into the local ledger.
//!
//! Nothing here touches storage. The reconciler loads the stored row, asks
//! this module what the row should become, and writes the result under an
//! optimistic revision guard.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    AnomalyKind, Direction, ReconciliationAnomaly, StatusHistoryEntry, Transaction,
    TransactionId, TransactionStatus, UserId,
};
use crate::persistence::Revision;
use crate::provider::ProviderOrder;

/// A provider order that cannot become a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidOrder {
    /// The order has no id.
    #[error("order has no id")]
    MissingId,
    /// The order carries no creation time.
    #[error("order {0} has no createdAt")]
    MissingCreatedAt(String),
    /// A currency code is absent or blank.
    #[error("order {id} has no {field}")]
    MissingCurrency {
        /// Order id.
        id: String,
        /// Offending field.
        field: &'static str,
    },
    /// The fiat amount is absent.
    #[error("order {0} has no fiatAmount")]
    MissingAmount(String),
    /// The fiat amount is below zero.
    #[error("order {id} has negative fiatAmount {amount}")]
    NegativeAmount {
        /// Order id.
        id: String,
        /// Reported amount.
        amount: Decimal,
    },
    /// `isBuyOrSell` is neither `BUY` nor `SELL`.
    #[error("order {id} has unknown direction {value:?}")]
    UnknownDirection {
        /// Order id.
        id: String,
        /// Reported value.
        value: String,
    },
}

/// Status reported on `order`.
///
/// # Errors
///
/// Returns an [`AnomalyKind::UnknownStatus`] anomaly for strings outside the
/// known set. No alias mapping is attempted.
pub fn reported_status(order: &ProviderOrder) -> Result<TransactionStatus, ReconciliationAnomaly> {
    order.status.parse().map_err(|_| {
        ReconciliationAnomaly::new(
            TransactionId::new(order.id.clone()),
            order.wallet_address.clone(),
            AnomalyKind::UnknownStatus {
                reported: order.status.clone(),
            },
        )
    })
}

fn currency(
    order: &ProviderOrder,
    value: Option<&String>,
    field: &'static str,
) -> Result<String, InvalidOrder> {
    value
        .map(|code| code.trim())
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .ok_or_else(|| InvalidOrder::MissingCurrency {
            id: order.id.clone(),
            field,
        })
}

/// Builds the local record for an order seen for the first time.
///
/// The history starts with a single entry for the reported status.
///
/// # Errors
///
/// Returns an [`InvalidOrder`] when required fields are missing or out of
/// range.
pub fn new_transaction(
    order: &ProviderOrder,
    status: TransactionStatus,
    owner: UserId,
) -> Result<Transaction, InvalidOrder> {
    if order.id.trim().is_empty() {
        return Err(InvalidOrder::MissingId);
    }
    let created_at = order
        .created_at
        .ok_or_else(|| InvalidOrder::MissingCreatedAt(order.id.clone()))?;
    let crypto_currency = currency(order, order.crypto_currency.as_ref(), "cryptoCurrency")?;
    let fiat_currency = currency(order, order.fiat_currency.as_ref(), "fiatCurrency")?;
    let fiat_amount = order
        .fiat_amount
        .ok_or_else(|| InvalidOrder::MissingAmount(order.id.clone()))?;
    if fiat_amount < Decimal::ZERO {
        return Err(InvalidOrder::NegativeAmount {
            id: order.id.clone(),
            amount: fiat_amount,
        });
    }
    let direction = match order.is_buy_or_sell.as_deref() {
        None => Direction::Buy,
        Some(raw) => raw
            .parse::<Direction>()
            .map_err(|_| InvalidOrder::UnknownDirection {
                id: order.id.clone(),
                value: raw.to_string(),
            })?,
    };

    let entered_at = order.status_changed_at().map_or(created_at, |at| at.max(created_at));

    Ok(Transaction {
        id: TransactionId::new(order.id.clone()),
        direction,
        crypto_currency,
        fiat_currency,
        fiat_amount,
        status,
        status_history: vec![StatusHistoryEntry {
            status,
            timestamp: entered_at,
            message: order.status_message(),
        }],
        details: order.details(),
        user_id: owner,
        created_at,
    })
}

/// Result of merging an order into a stored transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Merge {
    /// Nothing to write.
    Unchanged,
    /// The merged row and the revision it was computed from.
    Changed {
        /// Row to write.
        merged: Box<Transaction>,
        /// Stored revision the merge started from.
        expected: Revision,
        /// Status move, if the status changed.
        status_change: Option<StatusChange>,
    },
}

/// A status move applied by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// Status before the merge.
    pub from: TransactionStatus,
    /// Status after the merge.
    pub to: TransactionStatus,
    /// Timestamp recorded in the history.
    pub at: DateTime<Utc>,
}

/// Merges `order` into `stored`.
///
/// Descriptive fields are always refreshed. The status only moves forward;
/// the owner recorded on the transaction never changes.
///
/// # Errors
///
/// Returns a [`ReconciliationAnomaly`] for a backward move or when `owner`
/// differs from the stored owner. `stored` is never modified.
pub fn merge_existing(
    stored: &Transaction,
    order: &ProviderOrder,
    status: TransactionStatus,
    owner: &UserId,
) -> Result<Merge, ReconciliationAnomaly> {
    if stored.user_id != *owner {
        return Err(ReconciliationAnomaly::new(
            stored.id.clone(),
            order.wallet_address.clone(),
            AnomalyKind::OwnerMismatch {
                stored: stored.user_id.clone(),
                expected: owner.clone(),
            },
        ));
    }

    let mut merged = stored.clone();
    let at = order.status_changed_at().unwrap_or(stored.created_at);
    let moved = merged.apply_status(status, at, order.status_message())?;
    merged.details = order.details();

    if !moved && merged.details == stored.details {
        return Ok(Merge::Unchanged);
    }

    let status_change = if moved {
        merged.status_history.last().map(|entry| StatusChange {
            from: stored.status,
            to: entry.status,
            at: entry.timestamp,
        })
    } else {
        None
    };

    Ok(Merge::Changed {
        merged: Box::new(merged),
        expected: Revision::of(stored),
        status_change,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::transaction::tests::{make_transaction, ts};

    fn order(id: &str, status: &str) -> ProviderOrder {
        ProviderOrder {
            id: id.to_string(),
            status: status.to_string(),
            created_at: Some(ts(0)),
            updated_at: Some(ts(90)),
            completed_at: None,
            status_reason: None,
            is_buy_or_sell: Some("BUY".to_string()),
            crypto_currency: Some("ETH".to_string()),
            fiat_currency: Some("EUR".to_string()),
            fiat_amount: Some(Decimal::new(500, 0)),
            fiat_amount_in_usd: Some(Decimal::new(540, 0)),
            wallet_address: Some("0xabc".to_string()),
            wallet_link: None,
            network: Some("ethereum".to_string()),
            payment_option_id: None,
            status_histories: Vec::new(),
        }
    }

    #[test]
    fn pending_transaction_completes_with_seeded_history() {
        let stored = make_transaction("o1", TransactionStatus::Pending);
        let incoming = order("o1", "COMPLETED");
        let Ok(Merge::Changed {
            merged,
            expected,
            status_change,
        }) = merge_existing(&stored, &incoming, TransactionStatus::Completed, &stored.user_id)
        else {
            panic!("expected a change");
        };
        assert_eq!(merged.status, TransactionStatus::Completed);
        assert_eq!(
            merged.status_history,
            vec![
                StatusHistoryEntry {
                    status: TransactionStatus::Pending,
                    timestamp: ts(0),
                    message: None,
                },
                StatusHistoryEntry {
                    status: TransactionStatus::Completed,
                    timestamp: ts(90),
                    message: None,
                },
            ]
        );
        assert_eq!(expected, Revision::of(&stored));
        assert_eq!(
            status_change.map(|c| (c.from, c.to)),
            Some((TransactionStatus::Pending, TransactionStatus::Completed))
        );
        assert_eq!(merged.details.network.as_deref(), Some("ethereum"));
    }

    #[test]
    fn same_status_and_details_is_unchanged() {
        let incoming = order("o1", "PENDING");
        let mut stored = make_transaction("o1", TransactionStatus::Pending);
        stored.details = incoming.details();
        assert_eq!(
            merge_existing(&stored, &incoming, TransactionStatus::Pending, &stored.user_id),
            Ok(Merge::Unchanged)
        );
    }

    #[test]
    fn details_refresh_without_status_change() {
        let stored = make_transaction("o1", TransactionStatus::Processing);
        let incoming = order("o1", "PROCESSING");
        let Ok(Merge::Changed {
            merged,
            status_change,
            ..
        }) = merge_existing(&stored, &incoming, TransactionStatus::Processing, &stored.user_id)
        else {
            panic!("details should be refreshed");
        };
        assert!(status_change.is_none());
        assert!(merged.status_history.is_empty());
        assert_eq!(merged.details.fiat_amount_in_usd, Some(Decimal::new(540, 0)));
    }

    #[test]
    fn backward_report_is_refused() {
        let stored = make_transaction("o1", TransactionStatus::Completed);
        let incoming = order("o1", "PROCESSING");
        let result =
            merge_existing(&stored, &incoming, TransactionStatus::Processing, &stored.user_id);
        assert!(matches!(
            result,
            Err(ReconciliationAnomaly {
                kind: AnomalyKind::BackwardTransition { .. },
                ..
            })
        ));
    }

    #[test]
    fn owner_mismatch_is_refused() {
        let stored = make_transaction("o1", TransactionStatus::Pending);
        let incoming = order("o1", "COMPLETED");
        let result = merge_existing(
            &stored,
            &incoming,
            TransactionStatus::Completed,
            &UserId::new("user-2"),
        );
        assert!(matches!(
            result,
            Err(ReconciliationAnomaly {
                kind: AnomalyKind::OwnerMismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn unknown_status_is_an_anomaly() {
        let incoming = order("o1", "REFUNDED");
        let Err(anomaly) = reported_status(&incoming) else {
            panic!("unknown status must be refused");
        };
        assert_eq!(
            anomaly.kind,
            AnomalyKind::UnknownStatus {
                reported: "REFUNDED".to_string()
            }
        );
    }

    #[test]
    fn new_transaction_takes_provider_fields() {
        let incoming = order("o7", "PROCESSING");
        let Ok(tx) = new_transaction(&incoming, TransactionStatus::Processing, UserId::new("u"))
        else {
            panic!("order is valid");
        };
        assert_eq!(tx.id.as_str(), "o7");
        assert_eq!(tx.created_at, ts(0));
        assert_eq!(tx.status_history.len(), 1);
        assert!(tx.is_consistent());
    }

    #[test]
    fn invalid_orders_are_rejected() {
        let mut negative = order("o1", "PENDING");
        negative.fiat_amount = Some(Decimal::new(-1, 0));
        assert!(matches!(
            new_transaction(&negative, TransactionStatus::Pending, UserId::new("u")),
            Err(InvalidOrder::NegativeAmount { .. })
        ));

        let mut blank = order("o1", "PENDING");
        blank.fiat_currency = Some("  ".to_string());
        assert!(matches!(
            new_transaction(&blank, TransactionStatus::Pending, UserId::new("u")),
            Err(InvalidOrder::MissingCurrency {
                field: "fiatCurrency",
                ..
            })
        ));

        let mut undated = order("o1", "PENDING");
        undated.created_at = None;
        assert!(matches!(
            new_transaction(&undated, TransactionStatus::Pending, UserId::new("u")),
            Err(InvalidOrder::MissingCreatedAt(_))
        ));
    }
}
