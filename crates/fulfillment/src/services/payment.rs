//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId};
use thiserror::Error;
use uuid::Uuid;

/// Result of a successful payment capture.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    /// Transaction ID assigned by the gateway.
    pub transaction_id: String,
}

/// Errors returned by a payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The charge was declined.
    #[error("Payment declined: {0}")]
    Declined(String),

    /// The gateway itself failed.
    #[error("Payment gateway error: {0}")]
    Gateway(String),
}

/// Capability interface for payment capture.
///
/// One implementation per payment method; the worker pool treats them all
/// uniformly as an opaque external call.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Captures payment for an order.
    async fn process_payment(
        &self,
        order_id: OrderId,
        amount: Money,
    ) -> Result<PaymentReceipt, PaymentError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    charges: HashMap<String, (OrderId, Money)>,
    fail_on_charge: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline charges.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().unwrap().fail_on_charge = fail;
    }

    /// Returns the number of successful charges.
    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }

    /// Returns true if a charge exists with the given transaction ID.
    pub fn has_charge(&self, transaction_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .charges
            .contains_key(transaction_id)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn process_payment(
        &self,
        order_id: OrderId,
        amount: Money,
    ) -> Result<PaymentReceipt, PaymentError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_charge {
            return Err(PaymentError::Declined("card declined".to_string()));
        }

        let transaction_id = format!("TXN-{}", Uuid::new_v4().simple());
        state
            .charges
            .insert(transaction_id.clone(), (order_id, amount));

        Ok(PaymentReceipt { transaction_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn charge_records_transaction() {
        let gateway = InMemoryPaymentGateway::new();
        let receipt = gateway
            .process_payment(OrderId::new(1), Money::from_cents(4500))
            .await
            .unwrap();

        assert!(receipt.transaction_id.starts_with("TXN-"));
        assert_eq!(gateway.charge_count(), 1);
        assert!(gateway.has_charge(&receipt.transaction_id));
    }

    #[tokio::test]
    async fn fail_on_charge_declines() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_charge(true);

        let result = gateway
            .process_payment(OrderId::new(1), Money::from_cents(4500))
            .await;
        assert!(matches!(result, Err(PaymentError::Declined(_))));
        assert_eq!(gateway.charge_count(), 0);
    }
}
