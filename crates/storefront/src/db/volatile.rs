//! In-memory fallback store.
//!
//! Holds records written while the primary store was unreachable. Nothing
//! here survives a restart, and nothing is replayed into the primary store
//! automatically: every write is logged in a reconciliation list so degraded
//! writes are surfaced rather than silently lost.
//!
//! The list holds one entry per record. Repeated writes to the same record
//! fold into that entry, and a record created and then deleted here drops out
//! of it, so the list never outgrows the records held.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use super::store::{Document, Filter, Kind, StoreError, apply_patch};
use crate::clock::Clock;

/// Default per-kind record limit.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Write operation recorded for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

/// The net write to one record that landed only in the volatile store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingWrite {
    pub kind: Kind,
    pub id: Uuid,
    pub operation: WriteOp,
    /// First write to the record.
    pub recorded_at: DateTime<Utc>,
    /// Most recent write to the record.
    pub last_recorded_at: DateTime<Utc>,
}

#[derive(Default)]
struct Records {
    next_seq: u64,
    by_kind: HashMap<Kind, HashMap<Uuid, (u64, Document)>>,
    pending: HashMap<(Kind, Uuid), (u64, PendingWrite)>,
}

impl Records {
    fn record(&mut self, kind: Kind, id: Uuid, operation: WriteOp, at: DateTime<Utc>) {
        let Some((_, existing)) = self.pending.get_mut(&(kind, id)) else {
            let seq = self.next_seq;
            self.next_seq += 1;
            let write = PendingWrite {
                kind,
                id,
                operation,
                recorded_at: at,
                last_recorded_at: at,
            };
            self.pending.insert((kind, id), (seq, write));
            return;
        };

        match (existing.operation, operation) {
            // Never reached the primary store, so there is nothing to reconcile.
            (WriteOp::Create, WriteOp::Delete) => {
                self.pending.remove(&(kind, id));
            }
            (WriteOp::Create, _) => existing.last_recorded_at = at,
            (_, op) => {
                existing.operation = op;
                existing.last_recorded_at = at;
            }
        }
    }
}

/// Process-wide volatile document store.
pub struct VolatileStore {
    records: RwLock<Records>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl VolatileStore {
    /// Create a store holding at most `capacity` records per kind.
    ///
    /// A capacity of zero disables the store: every call is `Unavailable`.
    #[must_use]
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(Records::default()),
            capacity,
            clock,
        }
    }

    /// Whether the store accepts calls at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    fn ensure_enabled(&self) -> Result<(), StoreError> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("volatile store disabled".to_owned()))
        }
    }

    pub fn get(&self, kind: Kind, id: Uuid) -> Result<Option<Document>, StoreError> {
        self.ensure_enabled()?;
        let records = self.records.read();
        Ok(records
            .by_kind
            .get(&kind)
            .and_then(|docs| docs.get(&id))
            .map(|(_, doc)| doc.clone()))
    }

    /// Matching records in insertion order.
    pub fn list(&self, kind: Kind, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.ensure_enabled()?;
        let records = self.records.read();
        let Some(docs) = records.by_kind.get(&kind) else {
            return Ok(Vec::new());
        };
        let mut matched: Vec<&(u64, Document)> =
            docs.values().filter(|(_, doc)| filter.matches(doc)).collect();
        matched.sort_unstable_by_key(|(seq, _)| *seq);
        Ok(matched.into_iter().map(|(_, doc)| doc.clone()).collect())
    }

    pub fn create(&self, kind: Kind, id: Uuid, document: Document) -> Result<Document, StoreError> {
        self.ensure_enabled()?;
        let recorded_at = self.clock.now();
        let mut records = self.records.write();
        let seq = records.next_seq;
        let docs = records.by_kind.entry(kind).or_default();

        if docs.contains_key(&id) {
            return Err(StoreError::Conflict(format!("{kind} {id} already exists")));
        }
        if docs.len() >= self.capacity {
            return Err(StoreError::Unavailable(format!(
                "volatile store full for {kind} ({} records)",
                self.capacity
            )));
        }

        docs.insert(id, (seq, document.clone()));
        records.next_seq += 1;
        records.record(kind, id, WriteOp::Create, recorded_at);
        Ok(document)
    }

    pub fn update(
        &self,
        kind: Kind,
        id: Uuid,
        patch: &Document,
    ) -> Result<Option<Document>, StoreError> {
        self.ensure_enabled()?;
        let recorded_at = self.clock.now();
        let mut records = self.records.write();
        let Some((_, doc)) = records
            .by_kind
            .get_mut(&kind)
            .and_then(|docs| docs.get_mut(&id))
        else {
            return Ok(None);
        };

        apply_patch(doc, patch);
        let updated = doc.clone();
        records.record(kind, id, WriteOp::Update, recorded_at);
        Ok(Some(updated))
    }

    pub fn delete(&self, kind: Kind, id: Uuid) -> Result<bool, StoreError> {
        self.ensure_enabled()?;
        let recorded_at = self.clock.now();
        let mut records = self.records.write();
        let removed = records
            .by_kind
            .get_mut(&kind)
            .and_then(|docs| docs.remove(&id))
            .is_some();

        if removed {
            records.record(kind, id, WriteOp::Delete, recorded_at);
        }
        Ok(removed)
    }

    /// Writes that exist only here, oldest first.
    #[must_use]
    pub fn pending_reconciliation(&self) -> Vec<PendingWrite> {
        let records = self.records.read();
        let mut pending: Vec<&(u64, PendingWrite)> = records.pending.values().collect();
        pending.sort_unstable_by_key(|(seq, _)| *seq);
        pending.into_iter().map(|(_, write)| write.clone()).collect()
    }

    /// Records currently held for `kind`.
    #[must_use]
    pub fn len(&self, kind: Kind) -> usize {
        self.records.read().by_kind.get(&kind).map_or(0, HashMap::len)
    }
}

impl std::fmt::Debug for VolatileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatileStore")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    fn store(capacity: usize) -> (VolatileStore, ManualClock) {
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(20_000));
        (VolatileStore::new(capacity, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_create_get_list_in_insertion_order() {
        let (store, _) = store(10);
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            store
                .create(Kind::Product, *id, json!({"id": id, "n": i}))
                .unwrap();
        }

        assert_eq!(store.get(Kind::Product, ids[2]).unwrap().unwrap()["n"], 2);
        assert!(store.get(Kind::User, ids[2]).unwrap().is_none());

        let listed: Vec<u64> = store
            .list(Kind::Product, &Filter::All)
            .unwrap()
            .iter()
            .map(|d| d["n"].as_u64().unwrap())
            .collect();
        assert_eq!(listed, vec![0, 1, 2, 3, 4]);

        let filtered = store.list(Kind::Product, &Filter::eq("n", 3)).unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_duplicate_id_is_conflict() {
        let (store, _) = store(10);
        let id = Uuid::new_v4();
        store.create(Kind::User, id, json!({"id": id})).unwrap();
        assert!(matches!(
            store.create(Kind::User, id, json!({"id": id})),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_capacity_is_per_kind() {
        let (store, _) = store(2);
        for _ in 0..2 {
            let id = Uuid::new_v4();
            store.create(Kind::Order, id, json!({"id": id})).unwrap();
        }
        let id = Uuid::new_v4();
        assert!(matches!(
            store.create(Kind::Order, id, json!({"id": id})),
            Err(StoreError::Unavailable(_))
        ));
        store.create(Kind::Cart, id, json!({"id": id})).unwrap();
        assert_eq!(store.len(Kind::Order), 2);
    }

    #[test]
    fn test_zero_capacity_disables_every_call() {
        let (store, _) = store(0);
        let id = Uuid::new_v4();
        assert!(!store.is_enabled());
        assert!(store.get(Kind::User, id).is_err());
        assert!(store.list(Kind::User, &Filter::All).is_err());
        assert!(store.create(Kind::User, id, json!({"id": id})).is_err());
        assert!(store.update(Kind::User, id, &json!({})).is_err());
        assert!(store.delete(Kind::User, id).is_err());
    }

    #[test]
    fn test_update_and_delete() {
        let (store, _) = store(10);
        let id = Uuid::new_v4();
        store
            .create(Kind::Discount, id, json!({"id": id, "code": "A", "percent_off": 10}))
            .unwrap();

        let updated = store
            .update(Kind::Discount, id, &json!({"percent_off": 15}))
            .unwrap()
            .unwrap();
        assert_eq!(updated["percent_off"], 15);
        assert_eq!(updated["code"], "A");

        assert!(store.update(Kind::Discount, Uuid::new_v4(), &json!({})).unwrap().is_none());
        assert!(store.delete(Kind::Discount, id).unwrap());
        assert!(!store.delete(Kind::Discount, id).unwrap());
    }

    #[test]
    fn test_writes_fold_into_one_pending_entry_per_record() {
        let (store, clock) = store(10);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let created_at = clock.now();
        store.create(Kind::Review, first, json!({"id": first})).unwrap();
        store.create(Kind::Review, second, json!({"id": second})).unwrap();
        clock.advance(TimeDelta::minutes(1));
        store.update(Kind::Review, first, &json!({"rating": 4})).unwrap();
        store.update(Kind::Review, first, &json!({"rating": 5})).unwrap();

        let pending = store.pending_reconciliation();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[0].operation, WriteOp::Create);
        assert_eq!(pending[0].recorded_at, created_at);
        assert_eq!(pending[0].last_recorded_at, created_at + TimeDelta::minutes(1));
        assert_eq!(pending[1].id, second);
        assert_eq!(pending[1].last_recorded_at, created_at);
    }

    #[test]
    fn test_created_then_deleted_leaves_nothing_pending() {
        let (store, _) = store(10);
        let id = Uuid::new_v4();
        store.create(Kind::Review, id, json!({"id": id})).unwrap();
        store.update(Kind::Review, id, &json!({"rating": 4})).unwrap();
        assert!(store.delete(Kind::Review, id).unwrap());
        assert!(!store.delete(Kind::Review, id).unwrap());
        assert!(store.pending_reconciliation().is_empty());

        store.create(Kind::Review, id, json!({"id": id})).unwrap();
        let pending = store.pending_reconciliation();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, WriteOp::Create);
    }

    #[test]
    fn test_pending_list_is_bounded_by_records_held() {
        let (store, _) = store(1);
        let id = Uuid::new_v4();
        store.create(Kind::Cart, id, json!({"id": id, "n": 0})).unwrap();
        for n in 1..5_000 {
            store.update(Kind::Cart, id, &json!({"n": n})).unwrap();
        }
        for _ in 0..100 {
            let other = Uuid::new_v4();
            assert!(store.create(Kind::Cart, other, json!({"id": other})).is_err());
            assert!(!store.delete(Kind::Cart, other).unwrap());
        }
        assert_eq!(store.pending_reconciliation().len(), 1);
    }

    #[test]
    fn test_concurrent_creates_are_all_kept() {
        let (store, _) = store(1_000);
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let id = Uuid::new_v4();
                        store.create(Kind::Cart, id, json!({"id": id})).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(Kind::Cart), 400);
        assert_eq!(store.pending_reconciliation().len(), 400);
    }
}
