//! Settlement provider client: order queries, schema, and error taxonomy.
//!
//! [`ProviderClient`] wraps the provider's paginated `GET /orders`
//! endpoint behind the [`OrderSource`] trait so the reconciler can be
//! exercised against scripted sources.

pub mod client;
pub mod error;
pub mod models;

pub use client::{OrderSource, ProviderClient};
pub use error::{ProviderError, ProviderErrorKind};
pub use models::{
    DEFAULT_PAGE_SIZE, OrderFilter, OrderPage, PageMeta, ProviderOrder, SortOrder, StatusFilter,
};
