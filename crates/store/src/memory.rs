//! In-memory order store for testing and development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{OrderId, ProductId};
use domain::{Order, OrderDraft, OrderStatus, PaymentStatus};
use ledger::StockSource;

use crate::error::{Result, StoreError};
use crate::store::OrderStore;

#[derive(Debug, Default)]
struct InMemoryState {
    stock: HashMap<ProductId, u32>,
    orders: HashMap<OrderId, Order>,
    next_order_id: i64,
    fail_on_create: bool,
    fail_on_update: bool,
}

impl InMemoryState {
    fn adjusted(&self, product_id: ProductId, delta: i64) -> Result<u32> {
        let current = self.stock.get(&product_id).copied().unwrap_or(0);
        let next = current as i64 + delta;
        if next < 0 {
            return Err(StoreError::StockConflict(product_id));
        }
        u32::try_from(next)
            .map_err(|_| StoreError::Decode(format!("stock for product {product_id} out of range")))
    }
}

/// In-memory store with the same contract as the PostgreSQL implementation.
///
/// Supports injected failures so coordinator rollback paths can be
/// exercised without a database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a product's durable stock row.
    pub fn seed_stock(&self, product_id: ProductId, qty: u32) {
        self.state.write().unwrap().stock.insert(product_id, qty);
    }

    /// Configures the store to fail order creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures the store to fail status updates.
    pub fn set_fail_on_update(&self, fail: bool) {
        self.state.write().unwrap().fail_on_update = fail;
    }

    /// Returns the number of persisted orders.
    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }

    /// Backdates an order's `created_at`, for staleness-driven tests.
    pub fn age_order(&self, order_id: OrderId, by: Duration) {
        let mut state = self.state.write().unwrap();
        if let Some(order) = state.orders.get_mut(&order_id) {
            order.created_at -= by;
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn read_stock(&self, product_id: ProductId) -> Result<u32> {
        let state = self.state.read().unwrap();
        Ok(state.stock.get(&product_id).copied().unwrap_or(0))
    }

    async fn write_stock(&self, product_id: ProductId, qty: u32) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.stock.insert(product_id, qty);
        Ok(())
    }

    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<u32> {
        let mut state = self.state.write().unwrap();
        let next = state.adjusted(product_id, delta)?;
        state.stock.insert(product_id, next);
        Ok(next)
    }

    async fn create_order(&self, draft: OrderDraft) -> Result<Order> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(StoreError::Unavailable("injected create failure".into()));
        }

        // Validate every decrement against the current rows before writing
        // anything, so a conflict leaves the "transaction" untouched.
        let mut decremented: Vec<(ProductId, u32)> = Vec::with_capacity(draft.stock_effects.len());
        for &(product_id, qty) in &draft.stock_effects {
            let next = state.adjusted(product_id, -(qty as i64))?;
            decremented.push((product_id, next));
        }
        for (product_id, next) in decremented {
            state.stock.insert(product_id, next);
        }

        state.next_order_id += 1;
        let id = OrderId::new(state.next_order_id);

        let order = Order::from_draft(draft, id, Utc::now());
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().unwrap();
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn update_order_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_update {
            return Err(StoreError::Unavailable("injected update failure".into()));
        }

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        if order.status != from {
            return Err(StoreError::StatusConflict {
                order_id,
                expected: from,
            });
        }
        order.status = to;
        Ok(())
    }

    async fn update_payment_status(
        &self,
        order_id: OrderId,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_update {
            return Err(StoreError::Unavailable("injected update failure".into()));
        }

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.payment_status = status;
        order.payment_transaction_id = transaction_id;
        Ok(())
    }

    async fn find_orders_by_status(
        &self,
        status: OrderStatus,
        older_than: Duration,
    ) -> Result<Vec<Order>> {
        let cutoff = Utc::now() - older_than;
        let state = self.state.read().unwrap();

        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.status == status && o.created_at <= cutoff)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

#[async_trait]
impl StockSource for InMemoryOrderStore {
    async fn read_stock(&self, product_id: ProductId) -> std::result::Result<u32, String> {
        OrderStore::read_stock(self, product_id)
            .await
            .map_err(|e| e.to_string())
    }
}
