//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use crate::api::dto::{
    AnomalyListResponse, PaginationMeta, SyncResponse, TransactionListResponse,
};
use crate::api::handlers::{admin, sync, system, transactions};
use crate::config::ProviderMode;
use crate::domain::{
    Direction, ProviderDetails, StatusHistoryEntry, Transaction, TransactionStatus,
};
use crate::error::{ErrorBody, ErrorResponse};
use crate::persistence::StoredEvent;
use crate::provider::{OrderPage, PageMeta, ProviderOrder, SortOrder};
use crate::reconcile::SyncReport;
use crate::service::{SyncState, TransactionSummary};

/// Path of the generated document.
pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

/// Generated OpenAPI description of every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "ramp-ledger",
        description = "Transaction ledger reconciled against a settlement provider. Identity is forwarded by the session layer in the `x-identity-id` and `x-identity-role` headers."
    ),
    paths(
        transactions::list_transactions,
        transactions::transaction_summary,
        transactions::get_transaction,
        sync::sync_wallets,
        admin::provider_orders,
        admin::list_anomalies,
        system::health_handler,
    ),
    components(schemas(
        ErrorResponse,
        ErrorBody,
        Transaction,
        TransactionStatus,
        Direction,
        StatusHistoryEntry,
        ProviderDetails,
        TransactionListResponse,
        PaginationMeta,
        SyncState,
        TransactionSummary,
        SyncResponse,
        SyncReport,
        OrderPage,
        PageMeta,
        ProviderOrder,
        SortOrder,
        AnomalyListResponse,
        StoredEvent,
        system::HealthResponse,
        ProviderMode,
    )),
    tags(
        (name = "Transactions", description = "Scoped reads of the local ledger"),
        (name = "Sync", description = "Reconciliation with the settlement provider"),
        (name = "Admin", description = "Administrator tooling"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;
