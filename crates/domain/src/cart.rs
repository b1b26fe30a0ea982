//! Cart contents as consumed by the checkout coordinator.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::order::OrderLine;

/// One line of a user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// The product in the cart.
    pub product_id: ProductId,

    /// Human-readable product name, captured for the order snapshot.
    pub product_name: String,

    /// Quantity requested.
    pub quantity: u32,

    /// Price per unit at the time the line was added.
    pub unit_price: Money,
}

impl CartLine {
    /// Creates a new cart line.
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

    /// Total price for this line.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

impl From<CartLine> for OrderLine {
    fn from(line: CartLine) -> Self {
        OrderLine {
            product_id: line.product_id,
            product_name: line.product_name,
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_total_multiplies_unit_price() {
        let line = CartLine::new(1, "Widget", 3, Money::from_cents(1000));
        assert_eq!(line.line_total().cents(), 3000);
    }

    #[test]
    fn converts_into_order_line() {
        let line = CartLine::new(7, "Gadget", 2, Money::from_cents(2500));
        let order_line: OrderLine = line.into();
        assert_eq!(order_line.product_id, ProductId::new(7));
        assert_eq!(order_line.quantity, 2);
        assert_eq!(order_line.line_total().cents(), 5000);
    }
}
