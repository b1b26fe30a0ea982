//! Store error types.

use common::{OrderId, ProductId};
use domain::OrderStatus;
use thiserror::Error;

/// Errors that can occur in the durable store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database-level failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The referenced order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A transactional stock decrement found less stock than it needed
    /// (or no row at all). The enclosing transaction is rolled back.
    #[error("Stock conflict for product {0}: stored quantity too low")]
    StockConflict(ProductId),

    /// A status update found the order no longer in the expected state.
    /// Nothing was written.
    #[error("Order {order_id} is no longer {expected}; status not updated")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
    },

    /// A stored value could not be decoded into its domain type.
    #[error("Invalid stored value: {0}")]
    Decode(String),

    /// The store is unavailable (also used by injected test failures).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
