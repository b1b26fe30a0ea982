//! The order transaction coordinator.

use std::time::{Duration, Instant};

use common::{OrderId, ProductId, UserId};
use domain::{DomainError, Order, OrderDraft, OrderStatus};
use fulfillment::{FulfillmentError, FulfillmentHandle, Notifier, OrderEventKind};
use ledger::{ReserveOutcome, StockLedger, StockSource};
use store::{OrderStore, StoreError};

use crate::cart::CartService;
use crate::error::{CheckoutError, Result};

const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinates a checkout across the stock ledger, the durable store, the
/// cart, and the fulfillment queue.
///
/// The ledger is hydrated lazily from the store itself, so the first
/// reservation of each product reads the durable stock row.
pub struct CheckoutCoordinator<S, C, N>
where
    S: OrderStore + StockSource + Clone,
    C: CartService,
    N: Notifier,
{
    ledger: StockLedger<S>,
    store: S,
    cart: C,
    notifier: N,
    fulfillment: FulfillmentHandle,
    persist_timeout: Duration,
}

impl<S, C, N> CheckoutCoordinator<S, C, N>
where
    S: OrderStore + StockSource + Clone,
    C: CartService,
    N: Notifier,
{
    /// Creates a coordinator whose ledger hydrates from `store`.
    pub fn new(store: S, cart: C, notifier: N, fulfillment: FulfillmentHandle) -> Self {
        Self {
            ledger: StockLedger::new(store.clone()),
            store,
            cart,
            notifier,
            fulfillment,
            persist_timeout: DEFAULT_PERSIST_TIMEOUT,
        }
    }

    /// Overrides the order persistence timeout.
    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout = timeout;
        self
    }

    /// Turns the user's cart into a committed order, all or nothing.
    ///
    /// Reserves every line first, persists second. Any failure after the
    /// first reservation releases everything already reserved, in reverse
    /// order, before returning; no partial ledger or store state is
    /// observable afterwards.
    #[tracing::instrument(skip(self, shipping_address))]
    pub async fn reserve_and_create_order(
        &self,
        user_id: UserId,
        shipping_address: &str,
    ) -> Result<Order> {
        let started = Instant::now();

        let mut lines = self.cart.lines(user_id).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart(user_id));
        }

        // Ascending product order gives every concurrent checkout the same
        // lock acquisition order, so overlapping carts cannot deadlock.
        lines.sort_by_key(|l| l.product_id);

        let mut reserved: Vec<(ProductId, u32)> = Vec::with_capacity(lines.len());

        for line in &lines {
            let outcome = match self.ledger.try_reserve(line.product_id, line.quantity).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.rollback(&reserved).await;
                    return Err(e.into());
                }
            };
            match outcome {
                ReserveOutcome::Reserved { .. } => {
                    reserved.push((line.product_id, line.quantity));
                }
                ReserveOutcome::Insufficient { available } => {
                    self.rollback(&reserved).await;
                    metrics::counter!("checkout_insufficient_stock").increment(1);
                    tracing::info!(
                        %user_id,
                        product_id = %line.product_id,
                        requested = line.quantity,
                        available,
                        "checkout rejected on stock shortfall"
                    );
                    return Err(CheckoutError::InsufficientStock {
                        product_id: line.product_id,
                        requested: line.quantity,
                        available,
                    });
                }
            }
        }

        let draft = match OrderDraft::new(
            user_id,
            shipping_address,
            lines.into_iter().map(Into::into).collect(),
            reserved.clone(),
        ) {
            Ok(draft) => draft,
            Err(e) => {
                self.rollback(&reserved).await;
                return Err(e.into());
            }
        };

        let order = match tokio::time::timeout(self.persist_timeout, self.store.create_order(draft))
            .await
        {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => {
                self.rollback(&reserved).await;
                tracing::error!(%user_id, error = %e, "order persistence failed; reservations rolled back");
                return Err(e.into());
            }
            Err(_) => {
                self.rollback(&reserved).await;
                tracing::error!(%user_id, timeout = ?self.persist_timeout, "order persistence timed out; reservations rolled back");
                return Err(CheckoutError::PersistTimeout);
            }
        };

        // Committed. Everything from here is best-effort and must not fail
        // the checkout.
        if let Err(e) = self.cart.clear(user_id).await {
            tracing::warn!(%user_id, order_id = %order.id, error = %e, "cart clear failed after commit");
        }
        match self.fulfillment.try_submit(order.clone()) {
            Ok(()) => {}
            Err(FulfillmentError::QueueFull(id)) => {
                tracing::warn!(order_id = %id, "fulfillment queue full; sweep will pick the order up");
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "fulfillment submission failed; sweep will pick the order up");
            }
        }
        if let Err(e) = self.notifier.order_event(&order, OrderEventKind::Placed).await {
            tracing::warn!(order_id = %order.id, error = %e, "placed notification failed");
        }

        metrics::counter!("checkout_orders_created").increment(1);
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(order_id = %order.id, %user_id, total = %order.total_amount, "order created");
        Ok(order)
    }

    /// Advisory availability for a product.
    pub async fn stock(&self, product_id: ProductId) -> Result<u32> {
        Ok(self.ledger.peek(product_id).await?)
    }

    /// Adds stock, updating the durable row first and the ledger after.
    ///
    /// A crash between the two writes leaves the ledger under-counting
    /// until its next hydration, never over-counting.
    pub async fn restock(&self, product_id: ProductId, qty: u32) -> Result<u32> {
        self.store.adjust_stock(product_id, i64::from(qty)).await?;
        let new_available = self.ledger.release(product_id, qty).await?;
        tracing::info!(%product_id, added = qty, new_available, "restocked");
        Ok(new_available)
    }

    /// Cancels an order and returns its stock.
    ///
    /// Legal only while the order is `Pending` or `Processing`. The status
    /// write is a compare-and-set against the status just read, so a
    /// fulfillment worker racing this call cannot be overwritten; each
    /// line's quantity then goes back to the durable stock row and the
    /// ledger.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;
        order.check_transition(OrderStatus::Cancelled)?;

        match self
            .store
            .update_order_status(order_id, order.status, OrderStatus::Cancelled)
            .await
        {
            Ok(()) => {}
            Err(StoreError::StatusConflict { .. }) => {
                // The order moved while we were deciding. Report the
                // transition that is actually illegal now.
                let fresh = self
                    .store
                    .get_order(order_id)
                    .await?
                    .ok_or(CheckoutError::OrderNotFound(order_id))?;
                return Err(CheckoutError::IllegalTransition(
                    DomainError::IllegalTransition {
                        from: fresh.status,
                        to: OrderStatus::Cancelled,
                    },
                ));
            }
            Err(e) => return Err(e.into()),
        }
        order.status = OrderStatus::Cancelled;

        for line in &order.lines {
            self.store
                .adjust_stock(line.product_id, i64::from(line.quantity))
                .await?;
            self.ledger.release(line.product_id, line.quantity).await?;
        }

        if let Err(e) = self
            .notifier
            .order_event(&order, OrderEventKind::Cancelled)
            .await
        {
            tracing::warn!(%order_id, error = %e, "cancelled notification failed");
        }

        tracing::info!(%order_id, "order cancelled, stock returned");
        Ok(order)
    }

    /// Records delivery of a shipped order.
    #[tracing::instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;
        order.check_transition(OrderStatus::Delivered)?;

        match self
            .store
            .update_order_status(order_id, OrderStatus::Shipped, OrderStatus::Delivered)
            .await
        {
            Ok(()) => {}
            Err(StoreError::StatusConflict { .. }) => {
                let fresh = self
                    .store
                    .get_order(order_id)
                    .await?
                    .ok_or(CheckoutError::OrderNotFound(order_id))?;
                return Err(CheckoutError::IllegalTransition(
                    DomainError::IllegalTransition {
                        from: fresh.status,
                        to: OrderStatus::Delivered,
                    },
                ));
            }
            Err(e) => return Err(e.into()),
        }
        order.status = OrderStatus::Delivered;

        if let Err(e) = self
            .notifier
            .order_event(&order, OrderEventKind::Delivered)
            .await
        {
            tracing::warn!(%order_id, error = %e, "delivered notification failed");
        }
        Ok(order)
    }

    /// Releases reservations in reverse acquisition order.
    ///
    /// Release on an already hydrated cell cannot fail; an error here means
    /// the ledger map itself is broken, which is only logged because the
    /// checkout is already failing for the original reason.
    async fn rollback(&self, reserved: &[(ProductId, u32)]) {
        for &(product_id, qty) in reserved.iter().rev() {
            if let Err(e) = self.ledger.release(product_id, qty).await {
                tracing::error!(%product_id, qty, error = %e, "rollback release failed");
            }
        }
    }
}
