//! Transaction Ledger: append-only log of quantity changes.
//!
//! Entries are never updated or removed. The ledger assigns the timestamp and the
//! per-batch sequence number at append time, so callers cannot backdate or
//! reorder history.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockroute_core::{
    BatchId, Clock, DepartmentId, DomainError, DomainResult, LedgerEntryId, SystemClock, UserId,
    WarehouseId,
};
use stockroute_events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Incoming,
    Outgoing,
    Transfer,
    InventoryAdjust,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Incoming => "INCOMING",
            EntryKind::Outgoing => "OUTGOING",
            EntryKind::Transfer => "TRANSFER",
            EntryKind::InventoryAdjust => "INVENTORY_ADJUST",
        }
    }
}

/// Outcome of a physical count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adjustment {
    Surplus,
    Shortage,
    /// The count matched the recorded quantity.
    Confirmed,
}

impl Adjustment {
    pub fn from_diff(diff: i64) -> Self {
        match diff {
            d if d > 0 => Adjustment::Surplus,
            d if d < 0 => Adjustment::Shortage,
            _ => Adjustment::Confirmed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Adjustment::Surplus => "surplus",
            Adjustment::Shortage => "shortage",
            Adjustment::Confirmed => "confirmed",
        }
    }
}

/// An entry as submitted by the engine (before the ledger stamps it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub batch_id: BatchId,
    /// Warehouse the batch lives in (denormalized for warehouse-level queries).
    pub warehouse_id: WarehouseId,
    pub actor: UserId,
    pub kind: EntryKind,
    /// Signed quantity change applied to the batch.
    pub delta: i64,
    pub destination: Option<DepartmentId>,
    pub destination_warehouse: Option<WarehouseId>,
    pub source_warehouse: Option<WarehouseId>,
    pub adjustment: Option<Adjustment>,
    pub note: String,
}

impl NewLedgerEntry {
    pub fn new(
        batch_id: BatchId,
        warehouse_id: WarehouseId,
        actor: UserId,
        kind: EntryKind,
        delta: i64,
        note: impl Into<String>,
    ) -> Self {
        Self {
            batch_id,
            warehouse_id,
            actor,
            kind,
            delta,
            destination: None,
            destination_warehouse: None,
            source_warehouse: None,
            adjustment: None,
            note: note.into(),
        }
    }

    /// Check that the delta sign and the tags agree with the entry kind.
    pub fn validate(&self) -> DomainResult<()> {
        match self.kind {
            EntryKind::Incoming if self.delta <= 0 => Err(DomainError::invalid_quantity(
                "incoming entries must add stock",
            )),
            EntryKind::Outgoing if self.delta >= 0 => Err(DomainError::invalid_quantity(
                "outgoing entries must remove stock",
            )),
            EntryKind::Transfer if self.delta == 0 => Err(DomainError::invalid_quantity(
                "transfer entries must move stock",
            )),
            EntryKind::Transfer
                if self.destination_warehouse.is_none() && self.source_warehouse.is_none() =>
            {
                Err(DomainError::validation(
                    "transfer entries must name the other warehouse",
                ))
            }
            EntryKind::InventoryAdjust
                if self.adjustment != Some(Adjustment::from_diff(self.delta)) =>
            {
                Err(DomainError::validation(
                    "inventory adjustment outcome does not match its delta",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Immutable ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub batch_id: BatchId,
    pub warehouse_id: WarehouseId,
    pub actor: UserId,
    pub kind: EntryKind,
    /// Unsigned magnitude of the change.
    pub quantity: i64,
    /// Signed change; the batch quantity is the sum of these.
    pub delta: i64,
    /// Position in this batch's history, starting at 1.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub destination: Option<DepartmentId>,
    pub destination_warehouse: Option<WarehouseId>,
    pub source_warehouse: Option<WarehouseId>,
    pub adjustment: Option<Adjustment>,
    pub note: String,
}

impl Event for LedgerEntry {
    fn event_type(&self) -> &'static str {
        match self.kind {
            EntryKind::Incoming => "inventory.ledger.incoming",
            EntryKind::Outgoing => "inventory.ledger.outgoing",
            EntryKind::Transfer => "inventory.ledger.transfer",
            EntryKind::InventoryAdjust => "inventory.ledger.inventory_adjust",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Query filter. `None` fields match everything; the date range is inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub batch_id: Option<BatchId>,
    pub actor: Option<UserId>,
    pub warehouse_id: Option<WarehouseId>,
    pub kind: Option<EntryKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_batch(batch_id: BatchId) -> Self {
        Self {
            batch_id: Some(batch_id),
            ..Self::default()
        }
    }

    pub fn by_user(actor: UserId) -> Self {
        Self {
            actor: Some(actor),
            ..Self::default()
        }
    }

    pub fn by_date_range(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn in_warehouse(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = Some(warehouse_id);
        self
    }

    fn matches(&self, e: &LedgerEntry) -> bool {
        self.batch_id.is_none_or(|b| e.batch_id == b)
            && self.actor.is_none_or(|u| e.actor == u)
            && self.warehouse_id.is_none_or(|w| e.warehouse_id == w)
            && self.kind.is_none_or(|k| e.kind == k)
            && self.from.is_none_or(|f| e.timestamp >= f)
            && self.to.is_none_or(|t| e.timestamp <= t)
    }
}

pub trait Ledger: Send + Sync {
    /// Append an entry; the ledger assigns id, timestamp and sequence.
    fn append(&self, entry: NewLedgerEntry) -> DomainResult<LedgerEntry>;

    /// Number of entries ever appended.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry at an append position (0 = oldest).
    fn entry_at(&self, position: usize) -> Option<LedgerEntry>;

    /// Newest-first scan over the entries present when the scan was created.
    fn scan(&self, filter: LedgerFilter) -> LedgerScan<'_, Self>
    where
        Self: Sized,
    {
        LedgerScan::new(self, filter)
    }

    /// Sum of signed deltas for a batch.
    fn balance(&self, batch_id: BatchId) -> i64
    where
        Self: Sized,
    {
        self.scan(LedgerFilter::by_batch(batch_id))
            .map(|e| e.delta)
            .sum()
    }
}

impl<L> Ledger for Arc<L>
where
    L: Ledger + ?Sized,
{
    fn append(&self, entry: NewLedgerEntry) -> DomainResult<LedgerEntry> {
        (**self).append(entry)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn entry_at(&self, position: usize) -> Option<LedgerEntry> {
        (**self).entry_at(position)
    }
}

/// Lazy, finite, restartable newest-first scan.
///
/// The upper bound is fixed when the scan is created, so entries appended while
/// iterating are not observed. Because timestamps grow with append position, a
/// scan with a `from` bound stops as soon as it walks past it.
#[derive(Debug)]
pub struct LedgerScan<'a, L: Ledger> {
    ledger: &'a L,
    filter: LedgerFilter,
    upper: usize,
    cursor: usize,
}

impl<'a, L: Ledger> LedgerScan<'a, L> {
    pub fn new(ledger: &'a L, filter: LedgerFilter) -> Self {
        let upper = ledger.len();
        Self {
            ledger,
            filter,
            upper,
            cursor: upper,
        }
    }

    /// Rewind to the newest entry of the original snapshot.
    pub fn restart(&mut self) {
        self.cursor = self.upper;
    }
}

impl<L: Ledger> Iterator for LedgerScan<'_, L> {
    type Item = LedgerEntry;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor > 0 {
            self.cursor -= 1;
            let entry = self.ledger.entry_at(self.cursor)?;
            if let Some(from) = self.filter.from {
                if entry.timestamp < from {
                    self.cursor = 0;
                    return None;
                }
            }
            if self.filter.matches(&entry) {
                return Some(entry);
            }
        }
        None
    }
}

#[derive(Debug, Default)]
struct Entries {
    log: Vec<LedgerEntry>,
    sequences: HashMap<BatchId, u64>,
}

/// In-memory append-only ledger.
pub struct InMemoryLedger {
    entries: RwLock<Entries>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("len", &self.len())
            .finish()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            clock,
        }
    }
}

impl Ledger for InMemoryLedger {
    fn append(&self, entry: NewLedgerEntry) -> DomainResult<LedgerEntry> {
        entry.validate()?;

        let mut entries = self
            .entries
            .write()
            .map_err(|_| DomainError::conflict("ledger lock poisoned"))?;

        // Strictly increasing timestamps give a total order even when the clock
        // stands still or steps backwards.
        let now = self.clock.now();
        let timestamp = match entries.log.last() {
            Some(last) if now <= last.timestamp => last.timestamp + Duration::microseconds(1),
            _ => now,
        };

        let sequence = {
            let seq = entries.sequences.entry(entry.batch_id).or_insert(0);
            *seq += 1;
            *seq
        };

        let stored = LedgerEntry {
            id: LedgerEntryId::new(),
            batch_id: entry.batch_id,
            warehouse_id: entry.warehouse_id,
            actor: entry.actor,
            kind: entry.kind,
            quantity: entry.delta.abs(),
            delta: entry.delta,
            sequence,
            timestamp,
            destination: entry.destination,
            destination_warehouse: entry.destination_warehouse,
            source_warehouse: entry.source_warehouse,
            adjustment: entry.adjustment,
            note: entry.note,
        };

        entries.log.push(stored.clone());
        Ok(stored)
    }

    fn len(&self) -> usize {
        self.entries.read().map(|e| e.log.len()).unwrap_or(0)
    }

    fn entry_at(&self, position: usize) -> Option<LedgerEntry> {
        self.entries.read().ok()?.log.get(position).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroute_core::FixedClock;

    fn ledger_at(clock: Arc<FixedClock>) -> InMemoryLedger {
        InMemoryLedger::new(clock)
    }

    fn incoming(batch_id: BatchId, actor: UserId, qty: i64) -> NewLedgerEntry {
        NewLedgerEntry::new(batch_id, WarehouseId::new(), actor, EntryKind::Incoming, qty, "")
    }

    #[test]
    fn timestamps_are_strictly_increasing_with_frozen_clock() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let ledger = ledger_at(clock);
        let batch = BatchId::new();
        let user = UserId::new();

        let a = ledger.append(incoming(batch, user, 1)).unwrap();
        let b = ledger.append(incoming(batch, user, 2)).unwrap();

        assert!(b.timestamp > a.timestamp);
        assert_eq!((a.sequence, b.sequence), (1, 2));
    }

    #[test]
    fn scan_is_newest_first_and_restartable() {
        let ledger = InMemoryLedger::default();
        let batch = BatchId::new();
        let other = BatchId::new();
        let user = UserId::new();

        ledger.append(incoming(batch, user, 1)).unwrap();
        ledger.append(incoming(other, user, 5)).unwrap();
        ledger.append(incoming(batch, user, 2)).unwrap();

        let mut scan = ledger.scan(LedgerFilter::by_batch(batch));
        let first: Vec<i64> = scan.by_ref().map(|e| e.delta).collect();
        assert_eq!(first, vec![2, 1]);

        scan.restart();
        assert_eq!(scan.count(), 2);
        assert_eq!(ledger.balance(batch), 3);
    }

    #[test]
    fn scan_ignores_entries_appended_after_creation() {
        let ledger = InMemoryLedger::default();
        let batch = BatchId::new();
        let user = UserId::new();
        ledger.append(incoming(batch, user, 1)).unwrap();

        let scan = ledger.scan(LedgerFilter::all());
        ledger.append(incoming(batch, user, 1)).unwrap();

        assert_eq!(scan.count(), 1);
    }

    #[test]
    fn date_range_and_user_filters() {
        let start = Utc::now();
        let clock = Arc::new(FixedClock::new(start));
        let ledger = ledger_at(clock.clone());
        let batch = BatchId::new();
        let alice = UserId::new();
        let bob = UserId::new();

        ledger.append(incoming(batch, alice, 1)).unwrap();
        clock.advance(Duration::hours(1));
        ledger.append(incoming(batch, bob, 2)).unwrap();
        clock.advance(Duration::hours(1));
        ledger.append(incoming(batch, alice, 3)).unwrap();

        let window = LedgerFilter::by_date_range(
            start + Duration::minutes(30),
            start + Duration::minutes(90),
        );
        let in_window: Vec<i64> = ledger.scan(window).map(|e| e.delta).collect();
        assert_eq!(in_window, vec![2]);

        let by_alice: Vec<i64> = ledger
            .scan(LedgerFilter::by_user(alice))
            .map(|e| e.delta)
            .collect();
        assert_eq!(by_alice, vec![3, 1]);
    }

    #[test]
    fn rejects_entries_whose_sign_contradicts_kind() {
        let ledger = InMemoryLedger::default();
        let mut entry = incoming(BatchId::new(), UserId::new(), -1);
        assert!(matches!(
            ledger.append(entry.clone()),
            Err(DomainError::InvalidQuantity(_))
        ));

        entry.kind = EntryKind::InventoryAdjust;
        entry.adjustment = Some(Adjustment::Surplus);
        assert!(matches!(ledger.append(entry), Err(DomainError::Validation(_))));
        assert!(ledger.is_empty());
    }

    #[test]
    fn magnitude_is_absolute_delta() {
        let ledger = InMemoryLedger::default();
        let mut entry = NewLedgerEntry::new(
            BatchId::new(),
            WarehouseId::new(),
            UserId::new(),
            EntryKind::Outgoing,
            -7,
            "to kitchen",
        );
        entry.destination = Some(DepartmentId::new());
        let stored = ledger.append(entry).unwrap();
        assert_eq!(stored.quantity, 7);
        assert_eq!(stored.event_type(), "inventory.ledger.outgoing");
    }
}
