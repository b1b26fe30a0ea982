//! PostgreSQL-backed order store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{Money, OrderId, ProductId, UserId};
use domain::{Order, OrderDraft, OrderLine, OrderStatus, PaymentStatus};
use ledger::StockSource;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::{Result, StoreError};
use crate::store::OrderStore;

/// PostgreSQL implementation of [`OrderStore`].
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

/// Quantities live in INTEGER columns; reject anything that would not
/// survive the round trip instead of truncating it.
fn qty_to_db(qty: u32) -> Result<i32> {
    i32::try_from(qty).map_err(|_| StoreError::Decode(format!("quantity {qty} out of range")))
}

fn qty_from_db(raw: i32) -> Result<u32> {
    u32::try_from(raw).map_err(|_| StoreError::Decode(format!("negative stored quantity {raw}")))
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the schema migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!(
            "../../../migrations/001_create_order_tables.sql"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            lines,
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            status: parse_order_status(row.try_get("status")?)?,
            payment_status: parse_payment_status(row.try_get("payment_status")?)?,
            payment_transaction_id: row.try_get("payment_transaction_id")?,
            shipping_address: row.try_get("shipping_address")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    fn row_to_line(row: &PgRow) -> Result<OrderLine> {
        Ok(OrderLine {
            product_id: ProductId::new(row.try_get("product_id")?),
            product_name: row.try_get("product_name")?,
            quantity: qty_from_db(row.try_get::<i32, _>("quantity")?)?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        })
    }

    async fn lines_for_orders(&self, order_ids: &[i64]) -> Result<Vec<(OrderId, OrderLine)>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, product_name, quantity, unit_price_cents
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, product_id
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let order_id = OrderId::new(row.try_get("order_id")?);
                Ok((order_id, Self::row_to_line(row)?))
            })
            .collect()
    }
}

fn parse_order_status(s: &str) -> Result<OrderStatus> {
    match s {
        "Pending" => Ok(OrderStatus::Pending),
        "Processing" => Ok(OrderStatus::Processing),
        "Shipped" => Ok(OrderStatus::Shipped),
        "Delivered" => Ok(OrderStatus::Delivered),
        "Cancelled" => Ok(OrderStatus::Cancelled),
        other => Err(StoreError::Decode(format!("unknown order status {other:?}"))),
    }
}

fn parse_payment_status(s: &str) -> Result<PaymentStatus> {
    match s {
        "Pending" => Ok(PaymentStatus::Pending),
        "Completed" => Ok(PaymentStatus::Completed),
        "Failed" => Ok(PaymentStatus::Failed),
        other => Err(StoreError::Decode(format!(
            "unknown payment status {other:?}"
        ))),
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn read_stock(&self, product_id: ProductId) -> Result<u32> {
        let available: Option<i32> =
            sqlx::query_scalar("SELECT available FROM stock WHERE product_id = $1")
                .bind(product_id.as_i64())
                .fetch_optional(&self.pool)
                .await?;
        available.map_or(Ok(0), qty_from_db)
    }

    async fn write_stock(&self, product_id: ProductId, qty: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock (product_id, available)
            VALUES ($1, $2)
            ON CONFLICT (product_id) DO UPDATE SET available = EXCLUDED.available
            "#,
        )
        .bind(product_id.as_i64())
        .bind(qty_to_db(qty)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<u32> {
        let delta = i32::try_from(delta)
            .map_err(|_| StoreError::Decode(format!("stock delta {delta} out of range")))?;

        // Single-statement read-modify-write: row-level locking serializes
        // concurrent adjustments, and a decrement that would go negative
        // (or hit a missing row) matches nothing.
        let new_available: Option<i32> = if delta >= 0 {
            sqlx::query_scalar(
                r#"
                INSERT INTO stock (product_id, available)
                VALUES ($1, $2)
                ON CONFLICT (product_id) DO UPDATE
                    SET available = stock.available + EXCLUDED.available
                RETURNING available
                "#,
            )
            .bind(product_id.as_i64())
            .bind(delta)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_scalar(
                r#"
                UPDATE stock
                SET available = available + $2
                WHERE product_id = $1 AND available + $2 >= 0
                RETURNING available
                "#,
            )
            .bind(product_id.as_i64())
            .bind(delta)
            .fetch_optional(&self.pool)
            .await?
        };

        match new_available {
            Some(v) => qty_from_db(v),
            None => Err(StoreError::StockConflict(product_id)),
        }
    }

    async fn create_order(&self, draft: OrderDraft) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO orders (user_id, shipping_address, total_amount_cents, status, payment_status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, created_at
            "#,
        )
        .bind(draft.user_id.as_i64())
        .bind(&draft.shipping_address)
        .bind(draft.total_amount.cents())
        .bind(OrderStatus::Pending.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let id = OrderId::new(row.try_get("id")?);
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        for line in &draft.lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, product_id, product_name, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id.as_i64())
            .bind(line.product_id.as_i64())
            .bind(&line.product_name)
            .bind(qty_to_db(line.quantity)?)
            .bind(line.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        // Decrement against the committed row value, inside the same
        // transaction as the order. A stale in-memory snapshot can never
        // overwrite stock another transaction consumed in the meantime.
        for &(product_id, qty) in &draft.stock_effects {
            let result = sqlx::query(
                r#"
                UPDATE stock
                SET available = available - $2
                WHERE product_id = $1 AND available >= $2
                "#,
            )
            .bind(product_id.as_i64())
            .bind(qty_to_db(qty)?)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::StockConflict(product_id));
            }
        }

        tx.commit().await?;

        tracing::debug!(order_id = %id, lines = draft.lines.len(), "order persisted");
        Ok(Order::from_draft(draft, id, created_at))
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, shipping_address, total_amount_cents, status,
                   payment_status, payment_transaction_id, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = self
            .lines_for_orders(&[order_id.as_i64()])
            .await?
            .into_iter()
            .map(|(_, line)| line)
            .collect();

        Ok(Some(Self::row_to_order(&row, lines)?))
    }

    async fn update_order_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $3 WHERE id = $1 AND status = $2")
            .bind(order_id.as_i64())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
                .bind(order_id.as_i64())
                .fetch_optional(&self.pool)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::StatusConflict {
                    order_id,
                    expected: from,
                },
                None => StoreError::OrderNotFound(order_id),
            });
        }
        Ok(())
    }

    async fn update_payment_status(
        &self,
        order_id: OrderId,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET payment_status = $2, payment_transaction_id = $3 WHERE id = $1",
        )
        .bind(order_id.as_i64())
        .bind(status.as_str())
        .bind(transaction_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn find_orders_by_status(
        &self,
        status: OrderStatus,
        older_than: Duration,
    ) -> Result<Vec<Order>> {
        let cutoff = Utc::now() - older_than;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, shipping_address, total_amount_cents, status,
                   payment_status, payment_transaction_id, created_at
            FROM orders
            WHERE status = $1 AND created_at <= $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut lines_by_order = std::collections::HashMap::<OrderId, Vec<OrderLine>>::new();
        for (order_id, line) in self.lines_for_orders(&ids).await? {
            lines_by_order.entry(order_id).or_default().push(line);
        }

        rows.iter()
            .map(|row| {
                let id = OrderId::new(row.try_get::<i64, _>("id")?);
                let lines = lines_by_order.remove(&id).unwrap_or_default();
                Self::row_to_order(row, lines)
            })
            .collect()
    }
}

#[async_trait]
impl StockSource for PostgresOrderStore {
    async fn read_stock(&self, product_id: ProductId) -> std::result::Result<u32, String> {
        OrderStore::read_stock(self, product_id)
            .await
            .map_err(|e| e.to_string())
    }
}
