//! Shared types for the checkout core.
//!
//! Identifier newtypes and the `Money` value type used across the
//! ledger, store, checkout, and fulfillment crates.

pub mod types;

pub use types::{Money, OrderId, ProductId, UserId};
