use serde::{Deserialize, Serialize};
use wsk_schemas::{EntryId, Micros, NewLedgerEntry, OrderId, UserId};

// ---------------------------------------------------------------------------
// Payment planning
// ---------------------------------------------------------------------------

/// Constant inputs for every payment entry the engine creates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPolicy {
    pub revenue_category: String,
    pub owner: UserId,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        PaymentPolicy {
            revenue_category: "services".to_string(),
            owner: UserId(1),
        }
    }
}

/// The ledger side of a plan: at most one kind of mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerAction {
    None,
    Create(NewLedgerEntry),
    /// Exactly one id while the ledger is consistent. Several only when
    /// legacy entries left an order with duplicates; all of them go.
    Delete(Vec<EntryId>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Entry created, order now paid.
    Recorded,
    /// Entry already present; nothing created.
    AlreadyRecorded,
    /// Entry removed, order now unpaid.
    Removed,
    /// No entry to remove.
    AlreadyClear,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Recorded => "recorded",
            PaymentOutcome::AlreadyRecorded => "already_recorded",
            PaymentOutcome::Removed => "removed",
            PaymentOutcome::AlreadyClear => "already_clear",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentPlan {
    pub order_id: OrderId,
    pub ledger: LedgerAction,
    /// New paid flag to persist; `None` when the stored flag already matches.
    pub flag: Option<bool>,
    pub outcome: PaymentOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentError {
    /// A payment entry needs a positive amount.
    ZeroTotal { order_id: OrderId },
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentError::ZeroTotal { order_id } => {
                write!(f, "order {order_id} has a zero total and cannot be marked paid")
            }
        }
    }
}

impl std::error::Error for PaymentError {}

// ---------------------------------------------------------------------------
// Sweep report
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAction {
    Clean,
    Drift,
}

/// Stable ordering enforced by the sweep.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepReason {
    MissingEntry,
    UnexpectedEntry,
    DuplicateEntry,
    AmountMismatch,
    OrphanEntry,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "diff", rename_all = "snake_case")]
pub enum SweepDiff {
    PaidWithoutEntry {
        order_id: OrderId,
    },
    EntryWithoutPayment {
        order_id: OrderId,
        entry_id: EntryId,
    },
    DuplicateEntries {
        order_id: OrderId,
        entry_ids: Vec<EntryId>,
    },
    AmountMismatch {
        order_id: OrderId,
        entry_id: EntryId,
        order_total: Micros,
        entry_amount: Micros,
    },
    /// Entry attributed to an order that does not exist.
    OrphanEntry {
        order_id: OrderId,
        entry_id: EntryId,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub action: SweepAction,
    pub reasons: Vec<SweepReason>,
    pub diffs: Vec<SweepDiff>,
    pub orders_checked: usize,
}

impl SweepReport {
    pub fn clean(orders_checked: usize) -> Self {
        Self {
            action: SweepAction::Clean,
            reasons: Vec::new(),
            diffs: Vec::new(),
            orders_checked,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.action == SweepAction::Clean
    }
}
