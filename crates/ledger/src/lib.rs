//! In-memory stock ledger with per-product lock granularity.
//!
//! The ledger is the fast admission-control layer for checkout: every
//! reservation decision is made here, atomically per product, before any
//! durable I/O happens. Unrelated products never contend on the same lock.
//!
//! Quantities are hydrated lazily from a [`StockSource`] (the durable
//! store) on first touch; concurrent first-touches converge on a single
//! cell.

pub mod error;
pub mod stock;

pub use error::LedgerError;
pub use stock::{ReserveOutcome, StockLedger, StockSource};
