//! The fulfillment worker pool.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::OrderId;
use domain::{Order, OrderStatus, PaymentStatus};
use store::{OrderStore, StoreError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, Result};
use crate::services::{Notifier, OrderEventKind, PaymentGateway};
use crate::sweep;

/// Cloneable submission handle for the worker pool.
///
/// `try_submit` never blocks: a full queue is surfaced as
/// [`FulfillmentError::QueueFull`] and left to the periodic sweep.
#[derive(Clone)]
pub struct FulfillmentHandle {
    tx: mpsc::Sender<Order>,
}

impl FulfillmentHandle {
    /// Submits an order for background fulfillment.
    pub fn try_submit(&self, order: Order) -> Result<()> {
        match self.tx.try_send(order) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(order)) => {
                Err(FulfillmentError::QueueFull(order.id))
            }
            Err(mpsc::error::TrySendError::Closed(order)) => {
                Err(FulfillmentError::PoolStopped(order.id))
            }
        }
    }
}

/// Shared state cloned into every worker.
struct WorkerContext<S, P, N> {
    store: S,
    payment: P,
    notifier: N,
    in_flight: Arc<Mutex<HashSet<OrderId>>>,
    processing_delay: Duration,
}

impl<S: Clone, P: Clone, N: Clone> Clone for WorkerContext<S, P, N> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            payment: self.payment.clone(),
            notifier: self.notifier.clone(),
            in_flight: Arc::clone(&self.in_flight),
            processing_delay: self.processing_delay,
        }
    }
}

impl<S, P, N> WorkerContext<S, P, N>
where
    S: OrderStore,
    P: PaymentGateway,
    N: Notifier,
{
    /// Claims an order id; false means another worker already holds it.
    fn claim(&self, order_id: OrderId) -> bool {
        self.in_flight.lock().unwrap().insert(order_id)
    }

    fn release_claim(&self, order_id: OrderId) {
        self.in_flight.lock().unwrap().remove(&order_id);
    }

    async fn notify(&self, order: &Order, kind: OrderEventKind) {
        if let Err(e) = self.notifier.order_event(order, kind).await {
            tracing::warn!(order_id = %order.id, event = %kind, error = %e, "notification failed");
        }
    }
}

/// A running fulfillment pool: `worker_count` tasks draining one bounded
/// queue, plus the periodic sweep.
pub struct FulfillmentPool {
    handle: FulfillmentHandle,
    workers: Vec<JoinHandle<()>>,
    sweeper: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl FulfillmentPool {
    /// Starts the workers and the sweep.
    pub fn start<S, P, N>(config: FulfillmentConfig, store: S, payment: P, notifier: N) -> Self
    where
        S: OrderStore + Clone + 'static,
        P: PaymentGateway + Clone + 'static,
        N: Notifier + Clone + 'static,
    {
        let (tx, rx) = mpsc::channel::<Order>(config.queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = FulfillmentHandle { tx };

        let ctx = WorkerContext {
            store: store.clone(),
            payment,
            notifier,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            processing_delay: config.processing_delay,
        };

        let workers = (0..config.worker_count)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let ctx = ctx.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(run_worker(worker_id, rx, ctx, shutdown))
            })
            .collect();

        let sweeper = tokio::spawn(sweep::run_sweep(
            store,
            handle.clone(),
            config.sweep_interval,
            config.pending_threshold,
            shutdown_rx,
        ));

        tracing::info!(
            workers = config.worker_count,
            queue_capacity = config.queue_capacity,
            "fulfillment pool started"
        );

        Self {
            handle,
            workers,
            sweeper,
            shutdown_tx,
        }
    }

    /// Returns a cloneable submission handle.
    pub fn handle(&self) -> FulfillmentHandle {
        self.handle.clone()
    }

    /// Stops the sweep and the workers, letting any in-flight order finish
    /// its current transition first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.sweeper.await.ok();
        for worker in self.workers {
            worker.await.ok();
        }
        tracing::info!("fulfillment pool stopped");
    }
}

/// One worker: dequeue, claim, process, release, repeat.
///
/// A failed order is logged and counted; the worker always returns to the
/// queue for the next item.
async fn run_worker<S, P, N>(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Order>>>,
    ctx: WorkerContext<S, P, N>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: OrderStore,
    P: PaymentGateway,
    N: Notifier,
{
    tracing::debug!(worker_id, "fulfillment worker started");

    loop {
        let order = {
            let mut rx = rx.lock().await;
            tokio::select! {
                order = rx.recv() => order,
                _ = shutdown.changed() => None,
            }
        };
        let Some(order) = order else {
            break;
        };

        if !ctx.claim(order.id) {
            tracing::debug!(worker_id, order_id = %order.id, "order already in flight; dropping duplicate");
            continue;
        }

        match process_order(&ctx, order.id).await {
            Ok(()) => {
                metrics::counter!("fulfillment_orders_processed").increment(1);
            }
            Err(e) => {
                metrics::counter!("fulfillment_step_failures").increment(1);
                tracing::error!(
                    worker_id,
                    order_id = %order.id,
                    error = %e,
                    "order processing failed; order left in its last recorded status"
                );
            }
        }
        ctx.release_claim(order.id);
    }

    tracing::debug!(worker_id, "fulfillment worker stopped");
}

/// Drives one order `Pending -> Processing -> Shipped`.
///
/// Every transition is a compare-and-set against the persisted status, so
/// sweep resubmission, duplicate direct submission, and a concurrent
/// cancel all resolve on the store row: whoever moves the status first
/// wins, and the loser backs off without writing.
#[tracing::instrument(skip(ctx))]
async fn process_order<S, P, N>(ctx: &WorkerContext<S, P, N>, order_id: OrderId) -> Result<()>
where
    S: OrderStore,
    P: PaymentGateway,
    N: Notifier,
{
    let mut order = ctx
        .store
        .get_order(order_id)
        .await?
        .ok_or(FulfillmentError::OrderNotFound(order_id))?;

    if !order.status.can_start_processing() {
        tracing::debug!(order_id = %order_id, status = %order.status, "order not pending; skipping");
        return Ok(());
    }

    match ctx
        .store
        .update_order_status(order_id, OrderStatus::Pending, OrderStatus::Processing)
        .await
    {
        Ok(()) => {}
        Err(StoreError::StatusConflict { .. }) => {
            tracing::debug!(order_id = %order_id, "order moved on before pickup; skipping");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }
    order.status = OrderStatus::Processing;
    ctx.notify(&order, OrderEventKind::Processing).await;

    match ctx
        .payment
        .process_payment(order_id, order.total_amount)
        .await
    {
        Ok(receipt) => {
            ctx.store
                .update_payment_status(
                    order_id,
                    PaymentStatus::Completed,
                    Some(receipt.transaction_id),
                )
                .await?;
        }
        Err(source) => {
            ctx.store
                .update_payment_status(order_id, PaymentStatus::Failed, None)
                .await?;
            ctx.notify(&order, OrderEventKind::PaymentFailed).await;
            return Err(FulfillmentError::Payment { order_id, source });
        }
    }

    // The external fulfillment step (carrier handoff). No locks held here.
    tokio::time::sleep(ctx.processing_delay).await;

    // The order may have been cancelled during the delay; the CAS refuses
    // to resurrect it and nothing ships.
    match ctx
        .store
        .update_order_status(order_id, OrderStatus::Processing, OrderStatus::Shipped)
        .await
    {
        Ok(()) => {}
        Err(StoreError::StatusConflict { .. }) => {
            tracing::info!(order_id = %order_id, "order left processing during fulfillment; not shipping");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }
    order.status = OrderStatus::Shipped;
    ctx.notify(&order, OrderEventKind::Shipped).await;

    tracing::info!(order_id = %order_id, "order shipped");
    Ok(())
}
