//! Durable store adapter for the checkout core.
//!
//! The [`OrderStore`] trait is the transaction boundary of the system:
//! `create_order` persists the order row, its lines, and the new stock
//! quantities atomically. Two implementations are provided: an in-memory
//! store with failure injection for tests and development, and a
//! PostgreSQL store backed by sqlx.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use store::OrderStore;
