//! Payment description marker: `Payment order #<id>[ <method>]`.
//!
//! New payment entries carry an explicit `order_id`; the marker is still
//! written for humans reading the ledger, and parsed only to recognise
//! older entries that predate the foreign key.

use wsk_schemas::{OrderId, PaymentMethod};

pub const PAYMENT_PREFIX: &str = "Payment order #";

pub fn payment_description(order_id: OrderId, method: Option<PaymentMethod>) -> String {
    match method {
        Some(m) => format!("{PAYMENT_PREFIX}{order_id} {}", m.tag()),
        None => format!("{PAYMENT_PREFIX}{order_id}"),
    }
}

/// Order id named by a payment marker, if `description` starts with one.
///
/// The id must be a whole run of digits terminated by end of text or
/// whitespace, so `#1` never matches `#12` and `#1x` matches nothing.
pub fn parse_payment_marker(description: &str) -> Option<OrderId> {
    let rest = description.trim_start().strip_prefix(PAYMENT_PREFIX)?;
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, tail) = rest.split_at(end);
    if digits.is_empty() {
        return None;
    }
    if !tail.is_empty() && !tail.starts_with(char::is_whitespace) {
        return None;
    }
    digits.parse::<i64>().ok().map(OrderId)
}
