//! Domain layer: transactions, identities, scopes, and reconciliation events.
//!
//! This module contains the local transaction model and its status state
//! machine, the caller identity and the scope derived from it, the anomaly
//! type for refused provider reports, the event bus used as the operational
//! channel, and the per-wallet lock registry.

pub mod anomaly;
pub mod event_bus;
pub mod identity;
pub mod reconciliation_event;
pub mod scope;
pub mod transaction;
pub mod wallet_locks;

pub use anomaly::{AnomalyKind, ReconciliationAnomaly};
pub use event_bus::EventBus;
pub use identity::{Identity, Role, UserId};
pub use reconciliation_event::ReconciliationEvent;
pub use scope::Scope;
pub use transaction::{
    Direction, ProviderDetails, StatusHistoryEntry, Transaction, TransactionId,
    TransactionStatus, Transition,
};
pub use wallet_locks::WalletLocks;
