//! Inventory Operations Engine.
//!
//! The only code path that changes batch quantities. Every operation:
//! - checks the actor's capability,
//! - validates its inputs before touching anything,
//! - holds the batch key lock(s) for the whole read-modify-write,
//! - applies the quantity change and appends the matching ledger entry as one unit.

use std::sync::Arc;

use tracing::{error, info, warn};

use stockroute_auth::{Actor, Capability, authorize};
use stockroute_core::{
    BatchId, Clock, DepartmentId, DomainError, DomainResult, ProductId, WarehouseId,
};

use crate::batch::{Batch, BatchKey, NewBatch};
use crate::catalog::Catalog;
use crate::ledger::{Adjustment, EntryKind, InMemoryLedger, Ledger, LedgerEntry, NewLedgerEntry};
use crate::locks::KeyedLocks;
use crate::store::{BatchFilter, BatchStore, InMemoryBatchStore};

/// A committed quantity change: the batch after the change and the entry documenting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub batch: Batch,
    pub entry: LedgerEntry,
}

/// Result of registering a batch. `receipt` is present when the batch started
/// with a positive quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCreated {
    pub batch: Batch,
    pub receipt: Option<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub source: Batch,
    pub target: Batch,
    /// Whether the target batch was created by this transfer.
    pub target_created: bool,
    pub outbound: LedgerEntry,
    pub inbound: LedgerEntry,
}

impl TransferOutcome {
    pub fn entries(&self) -> [&LedgerEntry; 2] {
        [&self.outbound, &self.inbound]
    }
}

pub struct InventoryEngine<S = InMemoryBatchStore, L = InMemoryLedger> {
    catalog: Arc<Catalog>,
    batches: S,
    ledger: L,
    locks: KeyedLocks<BatchKey>,
    clock: Arc<dyn Clock>,
}

impl<S, L> core::fmt::Debug for InventoryEngine<S, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InventoryEngine")
            .field("locked_keys", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl InventoryEngine {
    /// Engine over the in-memory store and ledger, sharing one clock.
    pub fn in_memory(catalog: Arc<Catalog>, clock: Arc<dyn Clock>) -> Self {
        let ledger = InMemoryLedger::new(Arc::clone(&clock));
        Self::new(catalog, InMemoryBatchStore::new(), ledger, clock)
    }
}

fn require_positive(qty: i64) -> DomainResult<()> {
    if qty <= 0 {
        return Err(DomainError::invalid_quantity(format!(
            "quantity must be positive (got {qty})"
        )));
    }
    Ok(())
}

fn require_available(batch: &Batch, qty: i64) -> DomainResult<()> {
    if qty > batch.quantity {
        return Err(DomainError::InsufficientStock {
            requested: qty,
            available: batch.quantity,
        });
    }
    Ok(())
}

impl<S, L> InventoryEngine<S, L>
where
    S: BatchStore,
    L: Ledger,
{
    pub fn new(catalog: Arc<Catalog>, batches: S, ledger: L, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog,
            batches,
            ledger,
            locks: KeyedLocks::new(),
            clock,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn batch(&self, id: BatchId) -> DomainResult<Batch> {
        self.batches.get(id)
    }

    pub fn quantity(&self, id: BatchId) -> DomainResult<i64> {
        self.batches.quantity(id)
    }

    pub fn find_batch(&self, key: &BatchKey) -> DomainResult<Option<Batch>> {
        self.batches.find(key)
    }

    pub fn batches_in_warehouse(&self, warehouse_id: WarehouseId) -> DomainResult<Vec<Batch>> {
        self.batches.list(&BatchFilter {
            warehouse_id: Some(warehouse_id),
            ..BatchFilter::default()
        })
    }

    pub fn batches_of_product(&self, product_id: ProductId) -> DomainResult<Vec<Batch>> {
        self.batches.list(&BatchFilter {
            product_id: Some(product_id),
            ..BatchFilter::default()
        })
    }

    /// Full shelf path of the batch's location, or "unassigned".
    pub fn location_display(&self, batch: &Batch) -> DomainResult<String> {
        match batch.location_id {
            Some(id) => self.catalog.location_path(id),
            None => Ok("unassigned".to_string()),
        }
    }

    /// Apply the entry's delta, then append the entry. If the append fails the
    /// delta is reversed before returning. Callers hold the batch key lock.
    fn commit(&self, entry: NewLedgerEntry) -> DomainResult<StockMovement> {
        let batch_id = entry.batch_id;
        let delta = entry.delta;
        let now = self.clock.now();

        let batch = self.batches.apply_delta(batch_id, delta, now)?;
        match self.ledger.append(entry) {
            Ok(entry) => Ok(StockMovement { batch, entry }),
            Err(err) => {
                if let Err(undo) = self.batches.apply_delta(batch_id, -delta, now) {
                    error!(%batch_id, delta, error = %undo, "failed to reverse quantity after ledger append failure");
                }
                Err(err)
            }
        }
    }

    /// Register a new batch. A positive initial quantity is recorded as an
    /// INCOMING entry.
    pub fn create_batch(&self, actor: &Actor, new: NewBatch) -> DomainResult<BatchCreated> {
        authorize(actor, &Capability::WAREHOUSE_OPERATIONS)?;
        new.validate()?;

        self.catalog.product(new.product_id)?;
        self.catalog.warehouse(new.warehouse_id)?;
        if let Some(location_id) = new.location_id {
            let location = self.catalog.location(location_id)?;
            if location.warehouse_id != new.warehouse_id {
                return Err(DomainError::validation(
                    "location belongs to a different warehouse",
                ));
            }
        }

        let key = new.key();
        let initial = new.quantity;

        self.locks.with_locked(std::slice::from_ref(&key), || -> DomainResult<_> {
            if self.batches.find(&key)?.is_some() {
                return Err(DomainError::conflict(format!(
                    "batch '{}' expiring {} already exists in warehouse {}",
                    key.batch_number, key.expiry_date, key.warehouse_id
                )));
            }

            let batch = new.into_empty_batch(BatchId::new(), self.clock.now());
            let batch_id = self.batches.insert(batch.clone())?;
            info!(%batch_id, warehouse_id = %batch.warehouse_id, batch_number = %batch.batch_number, "batch created");

            if initial == 0 {
                return Ok(BatchCreated {
                    batch,
                    receipt: None,
                });
            }

            let movement = self.commit(NewLedgerEntry::new(
                batch_id,
                batch.warehouse_id,
                actor.user_id,
                EntryKind::Incoming,
                initial,
                "initial receipt",
            ))?;
            Ok(BatchCreated {
                batch: movement.batch,
                receipt: Some(movement.entry),
            })
        })
    }

    pub fn receive(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        qty: i64,
        note: impl Into<String>,
    ) -> DomainResult<StockMovement> {
        authorize(actor, &Capability::WAREHOUSE_OPERATIONS)?;
        require_positive(qty)?;
        let key = self.batches.get(batch_id)?.key();
        let note = note.into();

        self.locks.with_locked(&[key], || -> DomainResult<_> {
            let batch = self.batches.get(batch_id)?;
            let movement = self.commit(NewLedgerEntry::new(
                batch_id,
                batch.warehouse_id,
                actor.user_id,
                EntryKind::Incoming,
                qty,
                note,
            ))?;
            info!(%batch_id, qty, quantity = movement.batch.quantity, "stock received");
            Ok(movement)
        })
    }

    pub fn dispense(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        qty: i64,
        department: Option<DepartmentId>,
        note: impl Into<String>,
    ) -> DomainResult<StockMovement> {
        authorize(actor, &Capability::WAREHOUSE_OPERATIONS)?;
        require_positive(qty)?;
        if let Some(department_id) = department {
            self.catalog.department(department_id)?;
        }
        let key = self.batches.get(batch_id)?.key();
        let note = note.into();

        self.locks.with_locked(&[key], || -> DomainResult<_> {
            let batch = self.batches.get(batch_id)?;
            if let Err(err) = require_available(&batch, qty) {
                warn!(%batch_id, qty, available = batch.quantity, "dispense refused");
                return Err(err);
            }

            let mut entry = NewLedgerEntry::new(
                batch_id,
                batch.warehouse_id,
                actor.user_id,
                EntryKind::Outgoing,
                -qty,
                note,
            );
            entry.destination = department;

            let movement = self.commit(entry)?;
            info!(%batch_id, qty, quantity = movement.batch.quantity, "stock dispensed");
            Ok(movement)
        })
    }

    /// Move `qty` of a batch to the same lot at another warehouse, creating the
    /// target batch if needed.
    pub fn transfer(
        &self,
        actor: &Actor,
        source_id: BatchId,
        qty: i64,
        target_warehouse: WarehouseId,
        note: impl Into<String>,
    ) -> DomainResult<TransferOutcome> {
        authorize(actor, &Capability::WAREHOUSE_OPERATIONS)?;
        require_positive(qty)?;
        self.catalog.warehouse(target_warehouse)?;

        let source_key = self.batches.get(source_id)?.key();
        if source_key.warehouse_id == target_warehouse {
            return Err(DomainError::SameWarehouse);
        }
        let target_key = source_key.at(target_warehouse);
        let note = note.into();

        self.locks
            .with_locked(&[source_key, target_key.clone()], || -> DomainResult<_> {
                let source = self.batches.get(source_id)?;
                require_available(&source, qty)?;

                let mut out = NewLedgerEntry::new(
                    source_id,
                    source.warehouse_id,
                    actor.user_id,
                    EntryKind::Transfer,
                    -qty,
                    note.clone(),
                );
                out.destination_warehouse = Some(target_warehouse);
                let outbound = self.commit(out)?;

                match self.transfer_in(actor, &source, &target_key, qty, note.clone()) {
                    Ok((inbound, target_created)) => {
                        info!(
                            %source_id,
                            target_id = %inbound.batch.id,
                            %target_warehouse,
                            qty,
                            target_created,
                            "stock transferred"
                        );
                        Ok(TransferOutcome {
                            source: outbound.batch,
                            target: inbound.batch,
                            target_created,
                            outbound: outbound.entry,
                            inbound: inbound.entry,
                        })
                    }
                    Err(err) => {
                        self.reverse_outbound(actor, &source, target_warehouse, qty);
                        Err(err)
                    }
                }
            })
    }

    /// Find-or-create the target batch (under its key lock) and credit it.
    fn transfer_in(
        &self,
        actor: &Actor,
        source: &Batch,
        target_key: &BatchKey,
        qty: i64,
        note: String,
    ) -> DomainResult<(StockMovement, bool)> {
        let (target, created) = match self.batches.find(target_key)? {
            Some(existing) => (existing, false),
            None => {
                let now = self.clock.now();
                let target = Batch {
                    id: BatchId::new(),
                    warehouse_id: target_key.warehouse_id,
                    location_id: None,
                    quantity: 0,
                    created_at: now,
                    updated_at: now,
                    ..source.clone()
                };
                self.batches.insert(target.clone())?;
                (target, true)
            }
        };

        let mut entry = NewLedgerEntry::new(
            target.id,
            target.warehouse_id,
            actor.user_id,
            EntryKind::Transfer,
            qty,
            note,
        );
        entry.source_warehouse = Some(source.warehouse_id);
        Ok((self.commit(entry)?, created))
    }

    /// Undo a committed outbound transfer entry with a documented return.
    fn reverse_outbound(&self, actor: &Actor, source: &Batch, target: WarehouseId, qty: i64) {
        let mut entry = NewLedgerEntry::new(
            source.id,
            source.warehouse_id,
            actor.user_id,
            EntryKind::Transfer,
            qty,
            "transfer reversed",
        );
        entry.source_warehouse = Some(target);
        if let Err(err) = self.commit(entry) {
            error!(batch_id = %source.id, qty, error = %err, "failed to reverse outbound transfer");
        } else {
            warn!(batch_id = %source.id, qty, "outbound transfer reversed");
        }
    }

    /// Record a physical count. The quantity becomes `actual` and the difference
    /// is logged as surplus, shortage, or a confirmation.
    pub fn reconcile(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        actual: i64,
        note: impl Into<String>,
    ) -> DomainResult<StockMovement> {
        authorize(actor, &Capability::WAREHOUSE_OPERATIONS)?;
        if actual < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "counted quantity must not be negative (got {actual})"
            )));
        }
        let key = self.batches.get(batch_id)?.key();
        let note = note.into();

        self.locks.with_locked(&[key], || -> DomainResult<_> {
            let batch = self.batches.get(batch_id)?;
            let diff = actual - batch.quantity;
            let outcome = Adjustment::from_diff(diff);
            let note = if note.trim().is_empty() {
                outcome.label().to_string()
            } else {
                format!("{}: {}", outcome.label(), note.trim())
            };

            let mut entry = NewLedgerEntry::new(
                batch_id,
                batch.warehouse_id,
                actor.user_id,
                EntryKind::InventoryAdjust,
                diff,
                note,
            );
            entry.adjustment = Some(outcome);

            let movement = self.commit(entry)?;
            info!(%batch_id, previous = batch.quantity, actual, outcome = outcome.label(), "batch reconciled");
            Ok(movement)
        })
    }
}
