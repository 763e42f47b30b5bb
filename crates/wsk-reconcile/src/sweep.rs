use std::collections::BTreeSet;

use wsk_ledger::{attributed_order, Ledger};
use wsk_orders::Order;
use wsk_schemas::{EntryKind, OrderId};

use crate::{SweepAction, SweepDiff, SweepReason, SweepReport};

fn push_reason_once(reasons: &mut Vec<SweepReason>, r: SweepReason) {
    if !reasons.contains(&r) {
        reasons.push(r);
    }
}

/// Audit every order's paid flag against its payment entries.
///
/// Clean means: each paid order owns exactly one revenue entry whose amount
/// equals the order total, no unpaid order owns one, and no payment entry
/// points at an order that does not exist.
pub fn sweep<'a, I>(orders: I, ledger: &Ledger) -> SweepReport
where
    I: IntoIterator<Item = &'a Order>,
{
    let mut reasons: Vec<SweepReason> = Vec::new();
    let mut diffs: Vec<SweepDiff> = Vec::new();
    let mut known: BTreeSet<OrderId> = BTreeSet::new();

    for order in orders {
        known.insert(order.id);
        let entries = ledger.correlated(order.id, EntryKind::Revenue);

        match (order.paid, entries.as_slice()) {
            (true, []) => {
                diffs.push(SweepDiff::PaidWithoutEntry { order_id: order.id });
                push_reason_once(&mut reasons, SweepReason::MissingEntry);
            }
            (true, [entry]) => {
                if entry.amount != order.total {
                    diffs.push(SweepDiff::AmountMismatch {
                        order_id: order.id,
                        entry_id: entry.id,
                        order_total: order.total,
                        entry_amount: entry.amount,
                    });
                    push_reason_once(&mut reasons, SweepReason::AmountMismatch);
                }
            }
            (false, found) => {
                for e in found {
                    diffs.push(SweepDiff::EntryWithoutPayment {
                        order_id: order.id,
                        entry_id: e.id,
                    });
                }
                if !found.is_empty() {
                    push_reason_once(&mut reasons, SweepReason::UnexpectedEntry);
                }
            }
            (true, _) => {}
        }

        if entries.len() > 1 {
            diffs.push(SweepDiff::DuplicateEntries {
                order_id: order.id,
                entry_ids: entries.iter().map(|e| e.id).collect(),
            });
            push_reason_once(&mut reasons, SweepReason::DuplicateEntry);
        }
    }

    for entry in ledger.entries().filter(|e| e.kind == EntryKind::Revenue) {
        if let Some(order_id) = attributed_order(entry) {
            if !known.contains(&order_id) {
                diffs.push(SweepDiff::OrphanEntry {
                    order_id,
                    entry_id: entry.id,
                });
                push_reason_once(&mut reasons, SweepReason::OrphanEntry);
            }
        }
    }

    let orders_checked = known.len();

    reasons.sort();
    diffs.sort();

    if reasons.is_empty() {
        SweepReport::clean(orders_checked)
    } else {
        SweepReport {
            action: SweepAction::Drift,
            reasons,
            diffs,
            orders_checked,
        }
    }
}
