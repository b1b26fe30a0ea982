//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by domain-level validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// The requested status transition is not allowed by the state machine.
    #[error("Illegal order status transition: {from} -> {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    /// An order draft was built with no lines.
    #[error("Order has no lines")]
    EmptyOrder,

    /// A line carried a zero quantity.
    #[error("Order line for product {product_id} has zero quantity")]
    ZeroQuantity { product_id: common::ProductId },
}
