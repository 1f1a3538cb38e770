//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::ProviderMode;
use crate::service::TransactionService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Query facade for all business logic.
    pub transaction_service: Arc<TransactionService>,
    /// Provider environment, reported by the health endpoint.
    pub provider_mode: ProviderMode,
}
