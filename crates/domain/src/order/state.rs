//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──► Processing ──► Shipped ──► Delivered
///    │            │
///    └────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order persisted, waiting for a fulfillment worker.
    #[default]
    Pending,

    /// A worker has picked the order up and is fulfilling it.
    Processing,

    /// Order has been handed to the carrier (terminal for the worker pool).
    Shipped,

    /// Order reached the customer (terminal state).
    Delivered,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if a fulfillment worker may start processing.
    pub fn can_start_processing(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be shipped from this status.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if the order can be marked delivered from this status.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if the order can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns true if `to` is a legal next status.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        match to {
            OrderStatus::Pending => false,
            OrderStatus::Processing => self.can_start_processing(),
            OrderStatus::Shipped => self.can_ship(),
            OrderStatus::Delivered => self.can_deliver(),
            OrderStatus::Cancelled => self.can_cancel(),
        }
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment state recorded against an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Payment has not been captured yet.
    #[default]
    Pending,

    /// Payment captured successfully.
    Completed,

    /// Payment capture was declined or errored.
    Failed,
}

impl PaymentStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn pending_can_start_processing() {
        assert!(OrderStatus::Pending.can_start_processing());
        assert!(!OrderStatus::Processing.can_start_processing());
        assert!(!OrderStatus::Shipped.can_start_processing());
        assert!(!OrderStatus::Delivered.can_start_processing());
        assert!(!OrderStatus::Cancelled.can_start_processing());
    }

    #[test]
    fn processing_can_ship() {
        assert!(!OrderStatus::Pending.can_ship());
        assert!(OrderStatus::Processing.can_ship());
        assert!(!OrderStatus::Shipped.can_ship());
    }

    #[test]
    fn shipped_can_deliver() {
        assert!(OrderStatus::Shipped.can_deliver());
        assert!(!OrderStatus::Processing.can_deliver());
        assert!(!OrderStatus::Delivered.can_deliver());
    }

    #[test]
    fn cancel_only_from_pending_or_processing() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn no_status_regresses_to_pending() {
        for s in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert!(!s.can_transition_to(OrderStatus::Pending));
        }
    }

    #[test]
    fn no_state_skipping() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn display_names() {
        assert_eq!(OrderStatus::Pending.to_string(), "Pending");
        assert_eq!(OrderStatus::Shipped.to_string(), "Shipped");
        assert_eq!(PaymentStatus::Completed.to_string(), "Completed");
    }

    #[test]
    fn status_serialization_roundtrip() {
        let status = OrderStatus::Processing;
        let json = serde_json::to_string(&status).unwrap();
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, back);
    }
}
