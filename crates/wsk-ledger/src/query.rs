use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use wsk_schemas::{EntryKind, LedgerEntry, Micros, OrderId, UserId};

use crate::store::attributed_order;

/// Entry filter. Every `None` field matches everything.
///
/// The date range is inclusive at `from` and exclusive at `to`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerQuery {
    pub kind: Option<EntryKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive, surrounding whitespace ignored.
    pub category: Option<String>,
    pub owner: Option<UserId>,
    pub order_id: Option<OrderId>,
}

impl LedgerQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn matches(&self, e: &LedgerEntry) -> bool {
        if self.kind.is_some_and(|k| k != e.kind) {
            return false;
        }
        if self.from.is_some_and(|from| e.occurred_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| e.occurred_at >= to) {
            return false;
        }
        if self.owner.is_some_and(|o| o != e.owner) {
            return false;
        }
        if let Some(order_id) = self.order_id {
            if attributed_order(e) != Some(order_id) {
                return false;
            }
        }
        if let Some(cat) = &self.category {
            if !cat.trim().eq_ignore_ascii_case(e.category.trim()) {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub revenue: Micros,
    pub expense: Micros,
    /// revenue − expense.
    pub balance: Micros,
    pub count: usize,
}

impl LedgerSummary {
    pub(crate) fn fold<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        let mut s = LedgerSummary::default();
        for e in entries {
            match e.kind {
                EntryKind::Revenue => s.revenue = s.revenue.saturating_add(e.amount),
                EntryKind::Expense => s.expense = s.expense.saturating_add(e.amount),
            }
            s.count += 1;
        }
        s.balance = s.revenue.saturating_sub(s.expense);
        s
    }
}

/// Totals for one UTC calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub day: NaiveDate,
    pub revenue: Micros,
    pub expense: Micros,
}

impl DailyTotal {
    pub(crate) fn fold<'a, I>(entries: I) -> Vec<Self>
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        let mut days: BTreeMap<NaiveDate, DailyTotal> = BTreeMap::new();
        for e in entries {
            let day = e.occurred_at.date_naive();
            let t = days.entry(day).or_insert(DailyTotal {
                day,
                revenue: Micros::ZERO,
                expense: Micros::ZERO,
            });
            match e.kind {
                EntryKind::Revenue => t.revenue = t.revenue.saturating_add(e.amount),
                EntryKind::Expense => t.expense = t.expense.saturating_add(e.amount),
            }
        }
        days.into_values().rev().collect()
    }
}
