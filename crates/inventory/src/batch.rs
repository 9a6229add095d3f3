use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroute_core::{BatchId, DomainError, DomainResult, Entity, LocationId, ProductId, WarehouseId};

/// Identity of a lot inside a warehouse.
///
/// At most one batch exists per key. Transfers find their target by this key
/// and the engine serializes all work on a batch by locking it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
}

impl BatchKey {
    /// The same lot, at another warehouse.
    pub fn at(&self, warehouse_id: WarehouseId) -> BatchKey {
        BatchKey {
            warehouse_id,
            ..self.clone()
        }
    }
}

/// A countable lot of one product at one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub location_id: Option<LocationId>,
    pub batch_number: String,
    pub quantity: i64,
    pub production_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn key(&self) -> BatchKey {
        BatchKey {
            warehouse_id: self.warehouse_id,
            product_id: self.product_id,
            batch_number: self.batch_number.clone(),
            expiry_date: self.expiry_date,
        }
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    pub fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    /// Days until expiry (negative once expired).
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }
}

impl Entity for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for registering a new batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBatch {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub location_id: Option<LocationId>,
    pub batch_number: String,
    /// Initial quantity, recorded as an incoming receipt when positive.
    pub quantity: i64,
    pub production_date: NaiveDate,
    pub expiry_date: NaiveDate,
}

impl NewBatch {
    pub fn key(&self) -> BatchKey {
        BatchKey {
            warehouse_id: self.warehouse_id,
            product_id: self.product_id,
            batch_number: self.batch_number.trim().to_string(),
            expiry_date: self.expiry_date,
        }
    }

    /// Shape checks that need no lookups.
    pub fn validate(&self) -> DomainResult<()> {
        if self.batch_number.trim().is_empty() {
            return Err(DomainError::validation("batch number cannot be empty"));
        }
        if self.quantity < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "initial quantity must not be negative (got {})",
                self.quantity
            )));
        }
        if self.expiry_date < self.production_date {
            return Err(DomainError::validation(
                "expiry date cannot precede production date",
            ));
        }
        Ok(())
    }

    /// Materialize an empty batch; the initial quantity is applied by the engine.
    pub(crate) fn into_empty_batch(self, id: BatchId, now: DateTime<Utc>) -> Batch {
        Batch {
            id,
            product_id: self.product_id,
            warehouse_id: self.warehouse_id,
            location_id: self.location_id,
            batch_number: self.batch_number.trim().to_string(),
            quantity: 0,
            production_date: self.production_date,
            expiry_date: self.expiry_date,
            created_at: now,
            updated_at: now,
        }
    }
}
