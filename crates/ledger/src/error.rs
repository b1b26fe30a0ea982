//! Ledger error types.

use common::ProductId;
use thiserror::Error;

/// Errors raised by ledger operations.
///
/// Insufficient stock is *not* an error; it is the `Insufficient` variant
/// of [`crate::ReserveOutcome`]. These variants cover programming errors
/// and hydration failures only.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A zero quantity was passed where a positive one is required.
    #[error("Invalid quantity 0 for product {0}")]
    InvalidQuantity(ProductId),

    /// The stock source failed while hydrating a product's quantity.
    #[error("Failed to hydrate stock for product {product_id}: {reason}")]
    Hydration {
        product_id: ProductId,
        reason: String,
    },
}

/// Convenience type alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;
