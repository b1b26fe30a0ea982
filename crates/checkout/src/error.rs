//! Checkout error types.

use common::{OrderId, ProductId, UserId};
use domain::DomainError;
use ledger::LedgerError;
use store::StoreError;
use thiserror::Error;

use crate::cart::CartError;

/// Errors surfaced by the checkout coordinator.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The user's cart has no lines.
    #[error("Cart is empty for user {0}")]
    EmptyCart(UserId),

    /// A line could not be reserved. Expected and recoverable; the caller
    /// decides whether to re-present the cart. Never auto-retried.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Cart collaborator failure.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Stock ledger failure (invalid quantity or hydration).
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The durable store rejected the order. Reservations have already
    /// been rolled back when this is returned; the caller may retry.
    #[error("Order persistence failed: {0}")]
    Persistence(StoreError),

    /// The durable store did not answer within the persistence timeout.
    /// Reservations have already been rolled back.
    #[error("Order persistence timed out")]
    PersistTimeout,

    /// No order with the given ID exists.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A domain rule was violated, typically an illegal status transition.
    #[error("{0}")]
    IllegalTransition(#[from] DomainError),
}

impl From<StoreError> for CheckoutError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::OrderNotFound(id) => CheckoutError::OrderNotFound(id),
            other => CheckoutError::Persistence(other),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
