//! Inventory ledger: batch quantities, the append-only transaction log, and the
//! atomic operations that move stock.
//!
//! Quantities never change except through [`InventoryEngine`], and every change
//! is documented by exactly one [`LedgerEntry`] per touched batch.

pub mod batch;
pub mod catalog;
pub mod engine;
pub mod ledger;
pub mod locks;
pub mod store;

pub use batch::{Batch, BatchKey, NewBatch};
pub use catalog::{Catalog, Department, Location, LocationKind, Product, Warehouse};
pub use engine::{BatchCreated, InventoryEngine, StockMovement, TransferOutcome};
pub use ledger::{
    Adjustment, EntryKind, InMemoryLedger, Ledger, LedgerEntry, LedgerFilter, LedgerScan,
    NewLedgerEntry,
};
pub use locks::KeyedLocks;
pub use store::{BatchFilter, BatchStore, InMemoryBatchStore};
