//! Per-key mutual exclusion.
//!
//! Locks are taken on keys rather than on stored records, so a key can be
//! locked before the record it names exists (a transfer target, for example).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

/// A lazily grown table of one mutex per key.
///
/// Multi-key sections acquire their locks in ascending key order, which rules
/// out lock-order deadlocks between overlapping sections.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    table: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking holder cannot leave `()` inconsistent; stored state is guarded
    // by its own store.
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<K> KeyedLocks<K>
where
    K: Ord + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &K) -> Arc<Mutex<()>> {
        let mut table = lock(&self.table);
        table.entry(key.clone()).or_default().clone()
    }

    /// Run `f` while holding the locks of every key in `keys`.
    pub fn with_locked<R, E>(&self, keys: &[K], f: impl FnOnce() -> Result<R, E>) -> Result<R, E> {
        let mut ordered: Vec<K> = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let handles: Vec<Arc<Mutex<()>>> = ordered.iter().map(|k| self.handle(k)).collect();
        let _guards: Vec<MutexGuard<'_, ()>> = handles.iter().map(|h| lock(&**h)).collect();

        f()
    }

    /// Number of keys that have ever been locked.
    pub fn len(&self) -> usize {
        lock(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
