//! The order aggregate: lines, draft, and persisted form.

mod state;

pub use state::{OrderStatus, PaymentStatus};

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// An immutable line of a persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// The product ordered.
    pub product_id: ProductId,

    /// Product name snapshot at order time.
    pub product_name: String,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit at order time.
    pub unit_price: Money,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    /// Total price for this line (quantity * unit price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// An order ready to be persisted, before the store has assigned its ID.
///
/// Built by the checkout coordinator after all reservations succeeded.
/// `stock_effects` carries the reserved quantity per product; the store
/// subtracts each from the current stock row inside the same transaction
/// as the order row, so the in-memory ledger and the durable store commit
/// together or not at all, and concurrent commits never overwrite each
/// other with stale snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub user_id: UserId,
    pub shipping_address: String,
    pub lines: Vec<OrderLine>,
    pub total_amount: Money,
    pub stock_effects: Vec<(ProductId, u32)>,
}

impl OrderDraft {
    /// Builds a draft from order lines, computing the total amount.
    ///
    /// Fails on an empty line set or any zero-quantity line; both are
    /// caller bugs, not business outcomes.
    pub fn new(
        user_id: UserId,
        shipping_address: impl Into<String>,
        lines: Vec<OrderLine>,
        stock_effects: Vec<(ProductId, u32)>,
    ) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::EmptyOrder);
        }
        if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
            return Err(DomainError::ZeroQuantity {
                product_id: line.product_id,
            });
        }

        let total_amount = lines.iter().map(OrderLine::line_total).sum();

        Ok(Self {
            user_id,
            shipping_address: shipping_address.into(),
            lines,
            total_amount,
            stock_effects,
        })
    }
}

/// A persisted order.
///
/// Created only by the durable store as the terminal artifact of a
/// successful reservation + persistence transaction. Status advances
/// through [`OrderStatus`]; lines never change after persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_transaction_id: Option<String>,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Materializes a persisted order from a draft plus store-assigned fields.
    pub fn from_draft(draft: OrderDraft, id: OrderId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: draft.user_id,
            lines: draft.lines,
            total_amount: draft.total_amount,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_transaction_id: None,
            shipping_address: draft.shipping_address,
            created_at,
        }
    }

    /// Validates a status transition against the state machine.
    pub fn check_transition(&self, to: OrderStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(DomainError::IllegalTransition {
                from: self.status,
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> Vec<OrderLine> {
        vec![
            OrderLine::new(1, "Widget", 2, Money::from_cents(1000)),
            OrderLine::new(2, "Gadget", 1, Money::from_cents(2500)),
        ]
    }

    #[test]
    fn draft_computes_total() {
        let draft = OrderDraft::new(UserId::new(1), "12 Main St", lines(), vec![]).unwrap();
        assert_eq!(draft.total_amount, Money::from_cents(4500));
    }

    #[test]
    fn draft_rejects_empty_lines() {
        let err = OrderDraft::new(UserId::new(1), "12 Main St", vec![], vec![]).unwrap_err();
        assert_eq!(err, DomainError::EmptyOrder);
    }

    #[test]
    fn draft_rejects_zero_quantity() {
        let bad = vec![OrderLine::new(3, "Nothing", 0, Money::from_cents(100))];
        let err = OrderDraft::new(UserId::new(1), "12 Main St", bad, vec![]).unwrap_err();
        assert_eq!(
            err,
            DomainError::ZeroQuantity {
                product_id: ProductId::new(3)
            }
        );
    }

    #[test]
    fn order_starts_pending_with_pending_payment() {
        let draft = OrderDraft::new(UserId::new(1), "12 Main St", lines(), vec![]).unwrap();
        let order = Order::from_draft(draft, OrderId::new(9), Utc::now());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.payment_transaction_id.is_none());
    }

    #[test]
    fn check_transition_enforces_state_machine() {
        let draft = OrderDraft::new(UserId::new(1), "12 Main St", lines(), vec![]).unwrap();
        let order = Order::from_draft(draft, OrderId::new(9), Utc::now());
        assert!(order.check_transition(OrderStatus::Processing).is_ok());
        assert!(order.check_transition(OrderStatus::Shipped).is_err());
    }

    #[test]
    fn order_serialization_roundtrip() {
        let draft = OrderDraft::new(UserId::new(1), "12 Main St", lines(), vec![]).unwrap();
        let order = Order::from_draft(draft, OrderId::new(9), Utc::now());
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }
}
