use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;
use wsk_schemas::{EntryId, EntryKind, LedgerEntry, OrderId};

use crate::marker::parse_payment_marker;
use crate::query::{DailyTotal, LedgerQuery, LedgerSummary};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    NonPositiveAmount { id: EntryId, raw: i64 },
    EmptyCategory { id: EntryId },
    DuplicateId { id: EntryId },
    DuplicateIdempotencyKey { key: Uuid, existing: EntryId },
    /// A second entry of the same kind for one order.
    DuplicateOrderEntry {
        order_id: OrderId,
        kind: EntryKind,
        existing: EntryId,
    },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveAmount { id, raw } => {
                write!(f, "ledger entry {id}: amount must be > 0, got {raw} micros")
            }
            Self::EmptyCategory { id } => write!(f, "ledger entry {id}: category is empty"),
            Self::DuplicateId { id } => write!(f, "ledger entry {id} already present"),
            Self::DuplicateIdempotencyKey { key, existing } => {
                write!(f, "idempotency key {key} already used by entry {existing}")
            }
            Self::DuplicateOrderEntry {
                order_id,
                kind,
                existing,
            } => write!(
                f,
                "order {order_id} already has a {kind} entry ({existing})"
            ),
        }
    }
}

impl std::error::Error for LedgerError {}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Entry collection with the same uniqueness rules the persistence layer
/// enforces: one entry per id, per idempotency key, and per
/// (order, kind) for entries that carry an order foreign key.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    entries: BTreeMap<EntryId, LedgerEntry>,
    by_key: HashMap<Uuid, EntryId>,
    by_order: HashMap<(OrderId, EntryKind), EntryId>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a fetched entry list. Fails on the first entry that
    /// breaks a ledger rule.
    pub fn from_entries<I>(entries: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = LedgerEntry>,
    {
        let mut ledger = Ledger::new();
        for e in entries {
            ledger.append(e)?;
        }
        Ok(ledger)
    }

    pub fn append(&mut self, entry: LedgerEntry) -> Result<(), LedgerError> {
        Self::validate(&entry)?;
        if self.entries.contains_key(&entry.id) {
            return Err(LedgerError::DuplicateId { id: entry.id });
        }
        if let Some(existing) = self.by_key.get(&entry.idempotency_key) {
            return Err(LedgerError::DuplicateIdempotencyKey {
                key: entry.idempotency_key,
                existing: *existing,
            });
        }
        if let Some(order_id) = entry.order_id {
            if let Some(existing) = self.by_order.get(&(order_id, entry.kind)) {
                return Err(LedgerError::DuplicateOrderEntry {
                    order_id,
                    kind: entry.kind,
                    existing: *existing,
                });
            }
            self.by_order.insert((order_id, entry.kind), entry.id);
        }
        self.by_key.insert(entry.idempotency_key, entry.id);
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    pub fn remove(&mut self, id: EntryId) -> Option<LedgerEntry> {
        let entry = self.entries.remove(&id)?;
        self.by_key.remove(&entry.idempotency_key);
        if let Some(order_id) = entry.order_id {
            self.by_order.remove(&(order_id, entry.kind));
        }
        Some(entry)
    }

    pub fn get(&self, id: EntryId) -> Option<&LedgerEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    pub fn by_idempotency_key(&self, key: &Uuid) -> Option<&LedgerEntry> {
        self.by_key.get(key).and_then(|id| self.entries.get(id))
    }

    /// Entries of `kind` that belong to `order_id`.
    ///
    /// An entry belongs to an order through its foreign key. Revenue entries
    /// without a foreign key also belong to the order named by their payment
    /// marker. More than one result means the data has drifted.
    pub fn correlated(&self, order_id: OrderId, kind: EntryKind) -> Vec<&LedgerEntry> {
        self.entries
            .values()
            .filter(|e| e.kind == kind && attributed_order(e) == Some(order_id))
            .collect()
    }

    /// Entries matching `q`, oldest first (ties by id).
    pub fn query(&self, q: &LedgerQuery) -> Vec<&LedgerEntry> {
        let mut out: Vec<&LedgerEntry> = self.entries.values().filter(|e| q.matches(e)).collect();
        out.sort_by_key(|e| (e.occurred_at, e.id));
        out
    }

    pub fn summary(&self, q: &LedgerQuery) -> LedgerSummary {
        LedgerSummary::fold(self.entries.values().filter(|e| q.matches(e)))
    }

    /// Per-day totals, newest day first.
    pub fn daily_totals(&self, q: &LedgerQuery) -> Vec<DailyTotal> {
        DailyTotal::fold(self.entries.values().filter(|e| q.matches(e)))
    }

    /// Recompute both indexes from the entries and compare.
    pub fn verify_integrity(&self) -> bool {
        let keys_ok = self.by_key.len() == self.entries.len()
            && self
                .entries
                .values()
                .all(|e| self.by_key.get(&e.idempotency_key) == Some(&e.id));
        let with_fk = self.entries.values().filter(|e| e.order_id.is_some()).count();
        let orders_ok = self.by_order.len() == with_fk
            && self.entries.values().all(|e| match e.order_id {
                Some(o) => self.by_order.get(&(o, e.kind)) == Some(&e.id),
                None => true,
            });
        keys_ok && orders_ok
    }

    fn validate(entry: &LedgerEntry) -> Result<(), LedgerError> {
        if !entry.amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount {
                id: entry.id,
                raw: entry.amount.raw(),
            });
        }
        if entry.category.trim().is_empty() {
            return Err(LedgerError::EmptyCategory { id: entry.id });
        }
        Ok(())
    }
}

/// The order an entry is attributed to, by foreign key or legacy marker.
pub fn attributed_order(entry: &LedgerEntry) -> Option<OrderId> {
    match entry.order_id {
        Some(id) => Some(id),
        None if entry.kind == EntryKind::Revenue => parse_payment_marker(&entry.description),
        None => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
