//! Transaction reconciliation: merges provider-reported orders into the
//! local ledger.
//!
//! [`merge`] decides what a stored row becomes for one order. The
//! [`Reconciler`] drives a whole wallet: it reads the credential, pages
//! through the provider, applies records one by one, and publishes
//! [`crate::domain::ReconciliationEvent`]s. [`recorder`] persists those
//! events.

pub mod merge;
pub mod reconciler;
pub mod recorder;

pub use merge::{InvalidOrder, Merge, StatusChange};
pub use reconciler::{Reconciler, SyncPolicy, SyncReport};
pub use recorder::{spawn_event_cleanup, spawn_event_recorder};
