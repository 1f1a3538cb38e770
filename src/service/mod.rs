//! Service layer: the query facade.
//!
//! [`TransactionService`] resolves the caller's scope, optionally reconciles
//! the wallets in that scope, and reads the local ledger.

pub mod transaction_service;

pub use transaction_service::{
    DEFAULT_ROWS, ListRequest, MAX_ANOMALIES, MAX_ROWS, QuerySettings, SyncState,
    TransactionPage, TransactionService, TransactionSummary,
};
