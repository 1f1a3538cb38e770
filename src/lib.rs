//! # ramp-ledger
//!
//! Transaction ledger for a fiat/crypto on- and off-ramp dashboard.
//!
//! The settlement provider is the source of truth for orders; this crate
//! keeps a local, queryable copy of every order placed through a linked
//! wallet and reconciles it against the provider on demand. Reads are
//! always scoped to the caller's identity.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, identity headers from the session layer)
//!     │
//!     ├── REST Handlers (api/) ── Caller extractor (auth/)
//!     │
//!     ├── TransactionService (service/) ── ScopeResolver (auth/)
//!     │
//!     ├── Reconciler (reconcile/) ── WalletLocks, EventBus (domain/)
//!     │       │
//!     │       ├── ProviderClient (provider/) ── AccessToken (credential/)
//!     │       └── merge rules (reconcile/merge)
//!     │
//!     └── PostgreSQL or in-memory persistence (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod credential;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod provider;
pub mod reconcile;
pub mod service;
