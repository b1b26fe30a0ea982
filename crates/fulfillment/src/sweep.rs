//! Periodic sweep that resubmits stale pending orders.
//!
//! Catches orders that never reached the queue (submission raced a full
//! queue, or the process restarted) by scanning the durable store for
//! `Pending` orders older than a threshold and feeding them back through the
//! normal submission path. Workers re-check persisted status before acting,
//! so sweeping an order that is already in flight is harmless.

use std::time::Duration;

use domain::OrderStatus;
use store::OrderStore;
use tokio::sync::watch;

use crate::error::FulfillmentError;
use crate::pool::FulfillmentHandle;

pub(crate) async fn run_sweep<S: OrderStore>(
    store: S,
    handle: FulfillmentHandle,
    interval: Duration,
    pending_threshold: chrono::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so startup traffic goes
    // through the normal submission path first.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        sweep_once(&store, &handle, pending_threshold).await;
    }

    tracing::debug!("fulfillment sweep stopped");
}

async fn sweep_once<S: OrderStore>(
    store: &S,
    handle: &FulfillmentHandle,
    pending_threshold: chrono::Duration,
) {
    let stale = match store
        .find_orders_by_status(OrderStatus::Pending, pending_threshold)
        .await
    {
        Ok(orders) => orders,
        Err(e) => {
            tracing::error!(error = %e, "sweep query failed");
            return;
        }
    };

    if stale.is_empty() {
        return;
    }

    tracing::info!(count = stale.len(), "sweep found stale pending orders");
    metrics::counter!("fulfillment_sweep_resubmissions").increment(stale.len() as u64);

    for order in stale {
        let order_id = order.id;
        match handle.try_submit(order) {
            Ok(()) => {}
            Err(FulfillmentError::QueueFull(_)) => {
                // Queue is saturated again; the rest of the batch waits for
                // the next tick.
                tracing::warn!(order_id = %order_id, "queue full during sweep; deferring batch");
                break;
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "sweep resubmission failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, ProductId, UserId};
    use domain::{OrderDraft, OrderLine, PaymentStatus};
    use store::InMemoryOrderStore;

    use crate::config::FulfillmentConfig;
    use crate::pool::FulfillmentPool;
    use crate::services::{InMemoryNotifier, InMemoryPaymentGateway};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sweep_ships_stale_pending_order() {
        let store = InMemoryOrderStore::new();

        // Persist an order without ever submitting it, then age it past the
        // threshold so only the sweep can find it.
        store.seed_stock(ProductId::new(3), 5);
        let draft = OrderDraft::new(
            UserId::new(7),
            "9 Dock Rd",
            vec![OrderLine::new(3, "Gadget", 1, Money::from_cents(2500))],
            vec![(ProductId::new(3), 1)],
        )
        .unwrap();
        let order = store.create_order(draft).await.unwrap();
        store.age_order(order.id, chrono::Duration::minutes(10));

        let config = FulfillmentConfig {
            worker_count: 1,
            queue_capacity: 8,
            sweep_interval: Duration::from_millis(20),
            pending_threshold: chrono::Duration::minutes(5),
            processing_delay: Duration::from_millis(1),
        };
        let pool = FulfillmentPool::start(
            config,
            store.clone(),
            InMemoryPaymentGateway::new(),
            InMemoryNotifier::new(),
        );

        let mut shipped = false;
        for _ in 0..200 {
            let stored = store.get_order(order.id).await.unwrap().unwrap();
            if stored.status == OrderStatus::Shipped {
                assert_eq!(stored.payment_status, PaymentStatus::Completed);
                shipped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        pool.shutdown().await;
        assert!(shipped, "sweep never picked up the stale order");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fresh_pending_orders_are_left_alone() {
        let store = InMemoryOrderStore::new();
        store.seed_stock(ProductId::new(3), 5);
        let draft = OrderDraft::new(
            UserId::new(7),
            "9 Dock Rd",
            vec![OrderLine::new(3, "Gadget", 1, Money::from_cents(2500))],
            vec![(ProductId::new(3), 1)],
        )
        .unwrap();
        let order = store.create_order(draft).await.unwrap();

        let config = FulfillmentConfig {
            worker_count: 1,
            queue_capacity: 8,
            sweep_interval: Duration::from_millis(10),
            pending_threshold: chrono::Duration::minutes(5),
            processing_delay: Duration::from_millis(1),
        };
        let payment = InMemoryPaymentGateway::new();
        let pool = FulfillmentPool::start(
            config,
            store.clone(),
            payment.clone(),
            InMemoryNotifier::new(),
        );

        // Several sweep ticks pass; the young order must not be touched.
        tokio::time::sleep(Duration::from_millis(80)).await;
        pool.shutdown().await;

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(payment.charge_count(), 0);
    }
}
