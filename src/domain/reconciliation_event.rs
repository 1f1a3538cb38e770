//! Events emitted while reconciling provider orders.
//!
//! Every applied change and every refused report is published as a
//! [`ReconciliationEvent`] on the [`super::EventBus`]. The recorder task
//! appends them to the event log, which is the operational channel for
//! anomalies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::anomaly::ReconciliationAnomaly;
use super::identity::UserId;
use super::transaction::{TransactionId, TransactionStatus};

/// Domain event emitted by the reconciler.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ReconciliationEvent {
    /// A provider order was seen for the first time.
    TransactionInserted {
        /// New transaction.
        transaction_id: TransactionId,
        /// Owner resolved from the wallet.
        user_id: UserId,
        /// Initial status.
        status: TransactionStatus,
        /// Event time.
        timestamp: DateTime<Utc>,
    },

    /// A known transaction moved to a new status.
    StatusChanged {
        /// Affected transaction.
        transaction_id: TransactionId,
        /// Previous status.
        from: TransactionStatus,
        /// New status.
        to: TransactionStatus,
        /// Provider-reported change time.
        changed_at: DateTime<Utc>,
        /// Event time.
        timestamp: DateTime<Utc>,
    },

    /// A provider report was refused.
    AnomalyDetected {
        /// The refused report.
        anomaly: ReconciliationAnomaly,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
}

impl ReconciliationEvent {
    /// Transaction the event refers to.
    #[must_use]
    pub fn transaction_id(&self) -> &TransactionId {
        match self {
            Self::TransactionInserted { transaction_id, .. }
            | Self::StatusChanged { transaction_id, .. } => transaction_id,
            Self::AnomalyDetected { anomaly, .. } => &anomaly.transaction_id,
        }
    }

    /// Event discriminator as stored in the event log.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::TransactionInserted { .. } => "transaction_inserted",
            Self::StatusChanged { .. } => "status_changed",
            Self::AnomalyDetected { .. } => "anomaly_detected",
        }
    }

    /// Event time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::TransactionInserted { timestamp, .. }
            | Self::StatusChanged { timestamp, .. }
            | Self::AnomalyDetected { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anomaly::AnomalyKind;

    #[test]
    fn anomaly_event_serializes_with_tags() {
        let event = ReconciliationEvent::AnomalyDetected {
            anomaly: ReconciliationAnomaly::new(
                TransactionId::new("o1"),
                Some("0xabc".to_string()),
                AnomalyKind::UnknownStatus {
                    reported: "REFUNDED".to_string(),
                },
            ),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["event_type"], "anomaly_detected");
        assert_eq!(json["anomaly"]["kind"]["kind"], "unknown_status");
        assert_eq!(json["anomaly"]["transaction_id"], "o1");
        assert_eq!(event.transaction_id().as_str(), "o1");
    }
}
