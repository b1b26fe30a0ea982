//! The stock ledger and its hydration source.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use common::ProductId;

use crate::error::{LedgerError, Result};

/// Source of authoritative stock quantities for lazy hydration.
///
/// Implemented by the durable store adapter. A product the source has
/// never seen reads as zero stock; that is a normal empty ledger entry,
/// not an error.
#[async_trait]
pub trait StockSource: Send + Sync {
    /// Reads the current stored quantity for a product.
    async fn read_stock(&self, product_id: ProductId) -> std::result::Result<u32, String>;
}

/// Outcome of a reservation attempt.
///
/// Both variants are normal results; the caller decides what a shortfall
/// means for the enclosing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The quantity was decremented; `new_available` is the remainder.
    Reserved { new_available: u32 },

    /// Stock was left untouched; `available` is what was on hand.
    Insufficient { available: u32 },
}

impl ReserveOutcome {
    /// Returns true if the reservation was made.
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReserveOutcome::Reserved { .. })
    }
}

/// Per-product stock quantities with race-free mutation primitives.
///
/// Each product owns its own `Mutex<u32>` cell, so reservations on
/// unrelated products proceed fully in parallel; the outer `RwLock` map is
/// only write-locked to insert a cell on first touch. No lock is ever held
/// across an await point: hydration reads the source first, then inserts
/// under a double-checked `entry`, so concurrent first-touches on the same
/// product converge on whichever seed won.
pub struct StockLedger<S: StockSource> {
    cells: RwLock<HashMap<ProductId, Arc<Mutex<u32>>>>,
    source: S,
}

impl<S: StockSource> StockLedger<S> {
    /// Creates an empty ledger backed by the given hydration source.
    pub fn new(source: S) -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            source,
        }
    }

    /// Atomically reserves `qty` units if available.
    ///
    /// Linearizable with respect to all other ledger operations on the
    /// same product: the check and the decrement happen under the
    /// product's cell lock. Never blocks waiting for stock; a shortfall
    /// returns [`ReserveOutcome::Insufficient`] immediately.
    ///
    /// A zero `qty` is a programming error.
    pub async fn try_reserve(&self, product_id: ProductId, qty: u32) -> Result<ReserveOutcome> {
        if qty == 0 {
            tracing::error!(%product_id, "try_reserve called with zero quantity");
            return Err(LedgerError::InvalidQuantity(product_id));
        }

        let cell = self.cell(product_id).await?;
        let mut available = cell.lock().unwrap();

        metrics::counter!("stock_reservations_total").increment(1);

        if *available < qty {
            metrics::counter!("stock_reservations_rejected_total").increment(1);
            tracing::debug!(
                %product_id,
                requested = qty,
                available = *available,
                "reservation rejected"
            );
            return Ok(ReserveOutcome::Insufficient {
                available: *available,
            });
        }

        *available -= qty;
        tracing::debug!(%product_id, reserved = qty, new_available = *available, "stock reserved");
        Ok(ReserveOutcome::Reserved {
            new_available: *available,
        })
    }

    /// Atomically returns `qty` units to the product's available stock.
    ///
    /// Used both to undo a prior reservation (rollback) and to restock.
    /// A zero `qty` is a no-op. Never fails: a release that would overflow
    /// the counter saturates at `u32::MAX` and is logged.
    pub async fn release(&self, product_id: ProductId, qty: u32) -> Result<u32> {
        let cell = self.cell(product_id).await?;
        let mut available = cell.lock().unwrap();
        *available = match available.checked_add(qty) {
            Some(v) => v,
            None => {
                tracing::warn!(%product_id, released = qty, "stock release saturated the counter");
                u32::MAX
            }
        };

        if qty > 0 {
            metrics::counter!("stock_releases_total").increment(1);
            tracing::debug!(%product_id, released = qty, new_available = *available, "stock released");
        }
        Ok(*available)
    }

    /// Advisory read of the current available quantity.
    ///
    /// Fresh at the moment the cell lock is taken; the authoritative
    /// decision is always [`Self::try_reserve`].
    pub async fn peek(&self, product_id: ProductId) -> Result<u32> {
        let cell = self.cell(product_id).await?;
        let available = cell.lock().unwrap();
        Ok(*available)
    }

    /// Administrative overwrite of a product's quantity.
    ///
    /// Exclusive with concurrent reserve/release on the same product.
    pub async fn set_absolute(&self, product_id: ProductId, qty: u32) -> Result<()> {
        let cell = self.cell(product_id).await?;
        let mut available = cell.lock().unwrap();
        let old = *available;
        *available = qty;
        tracing::info!(%product_id, old, new = qty, "stock overwritten");
        Ok(())
    }

    /// Returns the product's cell, hydrating it from the source on first
    /// touch.
    async fn cell(&self, product_id: ProductId) -> Result<Arc<Mutex<u32>>> {
        if let Some(cell) = self.cells.read().unwrap().get(&product_id) {
            return Ok(Arc::clone(cell));
        }

        // Not yet tracked. Read the source without any ledger lock held,
        // then insert double-checked: if another task seeded the cell in
        // the meantime, its cell wins and our read is discarded.
        let seeded = self
            .source
            .read_stock(product_id)
            .await
            .map_err(|reason| LedgerError::Hydration { product_id, reason })?;

        let mut cells = self.cells.write().unwrap();
        let cell = cells
            .entry(product_id)
            .or_insert_with(|| Arc::new(Mutex::new(seeded)));
        Ok(Arc::clone(cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hydration source with fixed quantities, counting reads.
    #[derive(Default)]
    struct FixedSource {
        quantities: HashMap<ProductId, u32>,
        reads: AtomicUsize,
    }

    impl FixedSource {
        fn with(quantities: &[(i64, u32)]) -> Self {
            Self {
                quantities: quantities
                    .iter()
                    .map(|&(id, q)| (ProductId::new(id), q))
                    .collect(),
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StockSource for FixedSource {
        async fn read_stock(&self, product_id: ProductId) -> std::result::Result<u32, String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.quantities.get(&product_id).copied().unwrap_or(0))
        }
    }

    /// Source that fails every read.
    struct BrokenSource;

    #[async_trait]
    impl StockSource for BrokenSource {
        async fn read_stock(&self, _product_id: ProductId) -> std::result::Result<u32, String> {
            Err("connection refused".to_string())
        }
    }

    #[tokio::test]
    async fn reserve_decrements_when_available() {
        let ledger = StockLedger::new(FixedSource::with(&[(1, 10)]));
        let p = ProductId::new(1);

        let outcome = ledger.try_reserve(p, 3).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::Reserved { new_available: 7 });
        assert_eq!(ledger.peek(p).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn reserve_rejects_shortfall_without_mutation() {
        let ledger = StockLedger::new(FixedSource::with(&[(1, 2)]));
        let p = ProductId::new(1);

        let outcome = ledger.try_reserve(p, 3).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::Insufficient { available: 2 });
        assert_eq!(ledger.peek(p).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_product_reads_as_zero() {
        let ledger = StockLedger::new(FixedSource::default());
        let p = ProductId::new(99);

        assert_eq!(ledger.peek(p).await.unwrap(), 0);
        let outcome = ledger.try_reserve(p, 1).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::Insufficient { available: 0 });
    }

    #[tokio::test]
    async fn zero_quantity_reserve_is_an_error() {
        let ledger = StockLedger::new(FixedSource::with(&[(1, 5)]));
        let err = ledger.try_reserve(ProductId::new(1), 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity(_)));
    }

    #[tokio::test]
    async fn release_undoes_reservation() {
        let ledger = StockLedger::new(FixedSource::with(&[(1, 5)]));
        let p = ProductId::new(1);

        ledger.try_reserve(p, 5).await.unwrap();
        assert_eq!(ledger.peek(p).await.unwrap(), 0);

        ledger.release(p, 5).await.unwrap();
        assert_eq!(ledger.peek(p).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn release_zero_is_a_noop() {
        let ledger = StockLedger::new(FixedSource::with(&[(1, 5)]));
        let p = ProductId::new(1);
        assert_eq!(ledger.release(p, 0).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn release_saturates_instead_of_overflowing() {
        let ledger = StockLedger::new(FixedSource::with(&[(1, 5)]));
        let p = ProductId::new(1);
        assert_eq!(ledger.release(p, u32::MAX).await.unwrap(), u32::MAX);
        assert_eq!(ledger.peek(p).await.unwrap(), u32::MAX);
    }

    #[tokio::test]
    async fn set_absolute_overwrites() {
        let ledger = StockLedger::new(FixedSource::with(&[(1, 5)]));
        let p = ProductId::new(1);

        ledger.set_absolute(p, 42).await.unwrap();
        assert_eq!(ledger.peek(p).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn hydration_happens_once_per_product() {
        let ledger = StockLedger::new(FixedSource::with(&[(1, 5)]));
        let p = ProductId::new(1);

        ledger.peek(p).await.unwrap();
        ledger.try_reserve(p, 1).await.unwrap();
        ledger.release(p, 1).await.unwrap();

        assert_eq!(ledger.source.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hydration_failure_surfaces() {
        let ledger = StockLedger::new(BrokenSource);
        let err = ledger.peek(ProductId::new(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Hydration { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_never_oversell() {
        let ledger = Arc::new(StockLedger::new(FixedSource::with(&[(1, 50)])));
        let p = ProductId::new(1);

        let mut handles = Vec::new();
        for _ in 0..200 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.try_reserve(p, 1).await.unwrap().is_reserved()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 50);
        assert_eq!(ledger.peek(p).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_touch_converges_on_one_cell() {
        let ledger = Arc::new(StockLedger::new(FixedSource::with(&[(1, 10)])));
        let p = ProductId::new(1);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(
                async move { ledger.try_reserve(p, 1).await.unwrap() },
            ));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // All ten single-unit reservations must have hit the same cell.
        assert_eq!(ledger.peek(p).await.unwrap(), 0);
    }
}
