//! Data Transfer Objects for REST request/response serialization.
//!
//! Query parameters use the dashboard's camelCase names. Amounts are
//! serialized by `rust_decimal` as JSON strings.

pub mod common_dto;
pub mod transaction_dto;

pub use common_dto::*;
pub use transaction_dto::*;
