//! Batch Store: current quantity per batch.
//!
//! The store itself only guarantees that `apply_delta` never leaves a negative
//! quantity. Pairing a quantity change with its ledger entry, and serializing
//! read-modify-write sequences per batch, is the engine's job.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use stockroute_core::{BatchId, DomainError, DomainResult, ProductId, WarehouseId};

use crate::batch::{Batch, BatchKey};

/// Listing filter. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFilter {
    pub warehouse_id: Option<WarehouseId>,
    pub product_id: Option<ProductId>,
    /// Skip batches whose quantity reached zero.
    pub in_stock_only: bool,
}

impl BatchFilter {
    fn matches(&self, batch: &Batch) -> bool {
        self.warehouse_id.is_none_or(|w| batch.warehouse_id == w)
            && self.product_id.is_none_or(|p| batch.product_id == p)
            && (!self.in_stock_only || batch.quantity > 0)
    }
}

pub trait BatchStore: Send + Sync {
    /// Insert a new batch. Fails `Conflict` if a batch with the same key exists.
    fn insert(&self, batch: Batch) -> DomainResult<BatchId>;

    fn get(&self, id: BatchId) -> DomainResult<Batch>;

    fn find(&self, key: &BatchKey) -> DomainResult<Option<Batch>>;

    /// Add a signed delta. Fails `InsufficientStock` if the result would be
    /// negative and `NotFound` for an unknown batch; on failure nothing changes.
    fn apply_delta(&self, id: BatchId, delta: i64, at: DateTime<Utc>) -> DomainResult<Batch>;

    fn list(&self, filter: &BatchFilter) -> DomainResult<Vec<Batch>>;

    fn quantity(&self, id: BatchId) -> DomainResult<i64> {
        Ok(self.get(id)?.quantity)
    }
}

impl<S> BatchStore for Arc<S>
where
    S: BatchStore + ?Sized,
{
    fn insert(&self, batch: Batch) -> DomainResult<BatchId> {
        (**self).insert(batch)
    }

    fn get(&self, id: BatchId) -> DomainResult<Batch> {
        (**self).get(id)
    }

    fn find(&self, key: &BatchKey) -> DomainResult<Option<Batch>> {
        (**self).find(key)
    }

    fn apply_delta(&self, id: BatchId, delta: i64, at: DateTime<Utc>) -> DomainResult<Batch> {
        (**self).apply_delta(id, delta, at)
    }

    fn list(&self, filter: &BatchFilter) -> DomainResult<Vec<Batch>> {
        (**self).list(filter)
    }
}

#[derive(Debug, Default)]
struct Batches {
    by_id: HashMap<BatchId, Batch>,
    by_key: HashMap<BatchKey, BatchId>,
}

/// In-memory batch store.
#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    inner: RwLock<Batches>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> DomainError {
    DomainError::conflict("batch store lock poisoned")
}

impl BatchStore for InMemoryBatchStore {
    fn insert(&self, batch: Batch) -> DomainResult<BatchId> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let key = batch.key();

        if inner.by_key.contains_key(&key) {
            return Err(DomainError::conflict(format!(
                "batch '{}' with expiry {} already exists in warehouse {}",
                key.batch_number, key.expiry_date, key.warehouse_id
            )));
        }
        if inner.by_id.contains_key(&batch.id) {
            return Err(DomainError::conflict(format!("batch id {} already used", batch.id)));
        }

        let id = batch.id;
        inner.by_key.insert(key, id);
        inner.by_id.insert(id, batch);
        Ok(id)
    }

    fn get(&self, id: BatchId) -> DomainResult<Batch> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        inner
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("batch {id}")))
    }

    fn find(&self, key: &BatchKey) -> DomainResult<Option<Batch>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .by_key
            .get(key)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    fn apply_delta(&self, id: BatchId, delta: i64, at: DateTime<Utc>) -> DomainResult<Batch> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let batch = inner
            .by_id
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("batch {id}")))?;

        let next = batch
            .quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::invalid_quantity("quantity overflow"))?;
        if next < 0 {
            return Err(DomainError::InsufficientStock {
                requested: -delta,
                available: batch.quantity,
            });
        }

        batch.quantity = next;
        batch.updated_at = at;
        Ok(batch.clone())
    }

    fn list(&self, filter: &BatchFilter) -> DomainResult<Vec<Batch>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut out: Vec<Batch> = inner
            .by_id
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        // Earliest expiry first (the order stock should leave the shelf).
        out.sort_by(|a, b| {
            a.expiry_date
                .cmp(&b.expiry_date)
                .then_with(|| a.batch_number.cmp(&b.batch_number))
        });
        Ok(out)
    }
}
