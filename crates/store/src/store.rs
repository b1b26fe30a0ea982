use async_trait::async_trait;
use chrono::Duration;
use common::{OrderId, ProductId};
use domain::{Order, OrderDraft, OrderStatus, PaymentStatus};

use crate::Result;

/// Core trait for durable order and stock persistence.
///
/// All implementations must be thread-safe (`Send + Sync`). The contract
/// the checkout coordinator relies on: [`OrderStore::create_order`] is
/// atomic: the order row, its lines, and the stock decrements all commit
/// together or not at all.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Reads the stored available quantity for a product.
    ///
    /// A product with no stock row reads as zero.
    async fn read_stock(&self, product_id: ProductId) -> Result<u32>;

    /// Writes (upserts) the stored available quantity for a product.
    ///
    /// Administrative overwrite; ordinary stock movement goes through
    /// [`OrderStore::adjust_stock`] and `create_order`'s decrements so
    /// concurrent writers cannot clobber each other with stale snapshots.
    async fn write_stock(&self, product_id: ProductId, qty: u32) -> Result<()>;

    /// Applies a signed adjustment to the stored quantity and returns the
    /// new value, upserting the row for a positive delta.
    ///
    /// The adjustment is computed against the row's current value, never
    /// against a caller-supplied snapshot. A delta that would take the row
    /// negative fails with `StockConflict` and writes nothing.
    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<u32>;

    /// Persists a draft atomically and returns the stored order.
    ///
    /// Assigns the order ID and `created_at`. The draft's `stock_effects`
    /// quantities are subtracted from the stock rows inside the same
    /// transaction; a row that cannot cover its decrement aborts the whole
    /// transaction with `StockConflict`.
    async fn create_order(&self, draft: OrderDraft) -> Result<Order>;

    /// Fetches an order by ID, lines included.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Compare-and-set status update: moves the order from `from` to `to`.
    ///
    /// Fails with `OrderNotFound` for an unknown ID and with
    /// `StatusConflict` (writing nothing) when the stored status is no
    /// longer `from`. Concurrent writers for the same order serialize on
    /// this check, so a cancelled order can never be advanced afterwards.
    async fn update_order_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<()>;

    /// Updates an order's payment status and transaction id.
    async fn update_payment_status(
        &self,
        order_id: OrderId,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<()>;

    /// Returns orders that have been in `status` for longer than `older_than`.
    ///
    /// Used by the fulfillment sweep to pick up orders left `Pending`.
    async fn find_orders_by_status(
        &self,
        status: OrderStatus,
        older_than: Duration,
    ) -> Result<Vec<Order>>;
}
