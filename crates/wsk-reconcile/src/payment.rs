use chrono::{DateTime, Utc};
use uuid::Uuid;
use wsk_ledger::marker::payment_description;
use wsk_ledger::Ledger;
use wsk_orders::Order;
use wsk_schemas::{EntryKind, NewLedgerEntry, OrderId, PaymentMethod};

use crate::{LedgerAction, PaymentError, PaymentOutcome, PaymentPlan, PaymentPolicy};

/// Idempotency key of the one payment entry `order_id` may own.
///
/// Deterministic: the same order always yields the same key, so two writers
/// racing to record the same payment collide on the key's unique index.
pub fn payment_key(order_id: OrderId) -> Uuid {
    let data = format!("wsk.payment.v1|{}|{}", order_id, EntryKind::Revenue);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, data.as_bytes())
}

/// Decide what `set paid = desired` means for `order` given `ledger`.
///
/// | desired | entry  | ledger  | outcome           |
/// |---------|--------|---------|-------------------|
/// | true    | none   | create  | `Recorded`        |
/// | true    | exists | none    | `AlreadyRecorded` |
/// | false   | exists | delete  | `Removed`         |
/// | false   | none   | none    | `AlreadyClear`    |
///
/// The flag is only part of the plan when it differs from the stored value,
/// so repeating a command produces an empty plan.
///
/// # Errors
/// [`PaymentError::ZeroTotal`] when an entry would have to be created for
/// an order whose recomputed total is zero.
pub fn plan_payment(
    order: &Order,
    ledger: &Ledger,
    desired: bool,
    method: Option<PaymentMethod>,
    policy: &PaymentPolicy,
    now: DateTime<Utc>,
) -> Result<PaymentPlan, PaymentError> {
    let existing: Vec<_> = ledger
        .correlated(order.id, EntryKind::Revenue)
        .into_iter()
        .map(|e| e.id)
        .collect();

    let flag = (order.paid != desired).then_some(desired);

    let (ledger_action, outcome) = match (desired, existing.is_empty()) {
        (true, true) => {
            if !order.total.is_positive() {
                return Err(PaymentError::ZeroTotal { order_id: order.id });
            }
            let entry = NewLedgerEntry {
                kind: EntryKind::Revenue,
                amount: order.total,
                category: policy.revenue_category.clone(),
                description: payment_description(order.id, method),
                occurred_at: now,
                owner: policy.owner,
                order_id: Some(order.id),
                idempotency_key: payment_key(order.id),
            };
            (LedgerAction::Create(entry), PaymentOutcome::Recorded)
        }
        (true, false) => (LedgerAction::None, PaymentOutcome::AlreadyRecorded),
        (false, false) => (LedgerAction::Delete(existing), PaymentOutcome::Removed),
        (false, true) => (LedgerAction::None, PaymentOutcome::AlreadyClear),
    };

    Ok(PaymentPlan {
        order_id: order.id,
        ledger: ledger_action,
        flag,
        outcome,
    })
}
