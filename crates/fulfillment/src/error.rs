//! Fulfillment error types.

use common::OrderId;
use store::StoreError;
use thiserror::Error;

use crate::services::PaymentError;

/// Errors that can occur in the fulfillment pipeline.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The bounded work queue is full; the order was not enqueued.
    ///
    /// Backpressure signal, not a fault: the order stays `Pending` and the
    /// periodic sweep will pick it up.
    #[error("Fulfillment queue full; order {0} deferred to the sweep")]
    QueueFull(OrderId),

    /// The pool has been shut down and no longer accepts work.
    #[error("Fulfillment pool stopped; order {0} not accepted")]
    PoolStopped(OrderId),

    /// A queued order no longer exists in the store.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Durable store failure during a status transition.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Payment capture failed for an order.
    #[error("Payment failed for order {order_id}: {source}")]
    Payment {
        order_id: OrderId,
        source: PaymentError,
    },
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
