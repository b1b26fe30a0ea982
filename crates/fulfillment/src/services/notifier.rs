//! Order event notification trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::Order;
use thiserror::Error;

/// Lifecycle events a notifier may be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEventKind {
    Placed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    PaymentFailed,
}

impl OrderEventKind {
    /// Returns the event name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEventKind::Placed => "Placed",
            OrderEventKind::Processing => "Processing",
            OrderEventKind::Shipped => "Shipped",
            OrderEventKind::Delivered => "Delivered",
            OrderEventKind::Cancelled => "Cancelled",
            OrderEventKind::PaymentFailed => "PaymentFailed",
        }
    }
}

impl std::fmt::Display for OrderEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification failure. Callers log it and move on; a notifier can never
/// fail or block the core path.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Fire-and-forget order event notification (email, webhook, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Reports an order lifecycle event.
    async fn order_event(&self, order: &Order, kind: OrderEventKind) -> Result<(), NotifyError>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    events: Vec<(OrderId, OrderEventKind)>,
    fail: bool,
}

/// In-memory notifier that records events for assertions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every call.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }

    /// Returns all recorded events in order.
    pub fn events(&self) -> Vec<(OrderId, OrderEventKind)> {
        self.state.read().unwrap().events.clone()
    }

    /// Returns the recorded event kinds for one order, in order.
    pub fn events_for(&self, order_id: OrderId) -> Vec<OrderEventKind> {
        self.state
            .read()
            .unwrap()
            .events
            .iter()
            .filter(|(id, _)| *id == order_id)
            .map(|(_, kind)| *kind)
            .collect()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn order_event(&self, order: &Order, kind: OrderEventKind) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();
        if state.fail {
            return Err(NotifyError("smtp unreachable".to_string()));
        }
        state.events.push((order.id, kind));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Money, UserId};
    use domain::{OrderDraft, OrderLine};

    fn order(id: i64) -> Order {
        let draft = OrderDraft::new(
            UserId::new(1),
            "12 Main St",
            vec![OrderLine::new(1, "Widget", 1, Money::from_cents(100))],
            vec![],
        )
        .unwrap();
        Order::from_draft(draft, OrderId::new(id), Utc::now())
    }

    #[tokio::test]
    async fn records_events_in_order() {
        let notifier = InMemoryNotifier::new();
        let o = order(1);

        notifier
            .order_event(&o, OrderEventKind::Placed)
            .await
            .unwrap();
        notifier
            .order_event(&o, OrderEventKind::Shipped)
            .await
            .unwrap();

        assert_eq!(
            notifier.events_for(o.id),
            vec![OrderEventKind::Placed, OrderEventKind::Shipped]
        );
    }

    #[tokio::test]
    async fn failure_is_reported_not_recorded() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail(true);

        let result = notifier.order_event(&order(1), OrderEventKind::Placed).await;
        assert!(result.is_err());
        assert!(notifier.events().is_empty());
    }
}
