//! ramp-ledger server entry point.
//!
//! Wires persistence, the provider client, and the reconciler, then starts
//! the Axum HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ramp_ledger::api;
use ramp_ledger::app_state::AppState;
use ramp_ledger::auth::ScopeResolver;
use ramp_ledger::config::AppConfig;
use ramp_ledger::credential::CredentialStore;
use ramp_ledger::domain::EventBus;
use ramp_ledger::persistence::{
    EventLog, InMemoryPersistence, PostgresPersistence, TransactionStore, WalletDirectory,
};
use ramp_ledger::provider::ProviderClient;
use ramp_ledger::reconcile::{Reconciler, spawn_event_cleanup, spawn_event_recorder};
use ramp_ledger::service::TransactionService;

const EVENT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Storage handles shared by the reconciler and the query facade.
struct Backends {
    transactions: Arc<dyn TransactionStore>,
    wallets: Arc<dyn WalletDirectory>,
    credentials: Arc<dyn CredentialStore>,
    events: Arc<dyn EventLog>,
}

impl Backends {
    fn from_shared<P>(persistence: Arc<P>) -> Self
    where
        P: TransactionStore + WalletDirectory + CredentialStore + EventLog + 'static,
    {
        Self {
            transactions: Arc::clone(&persistence) as Arc<dyn TransactionStore>,
            wallets: Arc::clone(&persistence) as Arc<dyn WalletDirectory>,
            credentials: Arc::clone(&persistence) as Arc<dyn CredentialStore>,
            events: persistence,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<Backends> {
    if !config.persistence_enabled {
        tracing::warn!("persistence disabled, using in-memory storage");
        return Ok(Backends::from_shared(Arc::new(InMemoryPersistence::new())));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    let persistence = PostgresPersistence::new(pool, config.credential_key.clone());
    if config.run_migrations {
        persistence
            .migrate()
            .await
            .context("running database migrations")?;
        tracing::info!("database migrations applied");
    }
    Ok(Backends::from_shared(Arc::new(persistence)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(
        addr = %config.listen_addr,
        provider_mode = %config.provider_mode,
        "starting ramp-ledger"
    );

    let backends = connect(&config).await?;
    let event_bus = EventBus::new(config.event_bus_capacity);

    if config.event_log_enabled {
        let _recorder = spawn_event_recorder(&event_bus, Arc::clone(&backends.events));
        if config.event_log_cleanup_after_days > 0 {
            let _cleanup = spawn_event_cleanup(
                Arc::clone(&backends.events),
                config.event_log_cleanup_after_days,
                EVENT_CLEANUP_INTERVAL,
            );
        }
    }

    let provider = ProviderClient::new(config.provider_base_url(), config.provider_timeout())
        .context("building provider client")?;
    let reconciler = Arc::new(
        Reconciler::new(
            Arc::clone(&backends.credentials),
            Arc::new(provider),
            Arc::clone(&backends.transactions),
            Arc::clone(&backends.wallets),
            event_bus,
        )
        .with_policy(config.sync_policy()),
    );
    let transaction_service = Arc::new(TransactionService::new(
        reconciler,
        backends.transactions,
        backends.events,
        ScopeResolver::new(backends.wallets),
        config.query_settings(),
    ));

    let app_state = AppState {
        transaction_service,
        provider_mode: config.provider_mode,
    };

    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
