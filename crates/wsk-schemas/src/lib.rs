//! Shared record types for the workshop order and ledger crates.
//!
//! Identifiers are assigned by the persistence layer; everything here is
//! plain data with serde derives so it can cross the gateway boundary and
//! be printed by the CLI.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod money;

pub use money::{parse_amount, AmountError, Micros, MICROS_SCALE};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[inline]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Service order.
    OrderId
);
id_newtype!(ItemId);
id_newtype!(
    /// Ledger entry.
    EntryId
);
id_newtype!(ClientId);
id_newtype!(
    /// Shop user that owns ledger entries.
    UserId
);

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Delivery status of an order. Only ever moves forward.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    InProgress,
    Ready,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_progress" => Some(OrderStatus::InProgress),
            "ready" => Some(OrderStatus::Ready),
            "delivered" => Some(OrderStatus::Delivered),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    Cash,
    Card,
}

impl PaymentMethod {
    /// Tag appended to the payment entry description.
    pub fn tag(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pix" => Some(PaymentMethod::Pix),
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Revenue,
    Expense,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Revenue => "revenue",
            EntryKind::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "revenue" => Some(EntryKind::Revenue),
            "expense" => Some(EntryKind::Expense),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Persisted rows
// ---------------------------------------------------------------------------

/// Order row as stored. Items and the total live elsewhere: the total is
/// always derived from items, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub client_id: ClientId,
    pub deliver_by: Option<NaiveDate>,
    pub status: OrderStatus,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderRecord {
    pub client_id: ClientId,
    pub deliver_by: Option<NaiveDate>,
    pub status: OrderStatus,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: ItemId,
    pub order_id: OrderId,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Micros,
    pub total: Micros,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItemRecord {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Micros,
    pub total: Micros,
    pub note: Option<String>,
}

/// Partial update of an order row. Only status and the paid flag are
/// mutable after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub paid: Option<bool>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        OrderPatch {
            status: Some(status),
            paid: None,
        }
    }

    pub fn paid(paid: bool) -> Self {
        OrderPatch {
            status: None,
            paid: Some(paid),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.paid.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub kind: EntryKind,
    pub amount: Micros,
    pub category: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
    pub owner: UserId,
    /// Set for entries produced by payment reconciliation.
    pub order_id: Option<OrderId>,
    pub idempotency_key: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub kind: EntryKind,
    pub amount: Micros,
    pub category: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
    pub owner: UserId,
    pub order_id: Option<OrderId>,
    pub idempotency_key: Uuid,
}

impl NewLedgerEntry {
    pub fn into_entry(self, id: EntryId) -> LedgerEntry {
        LedgerEntry {
            id,
            kind: self.kind,
            amount: self.amount,
            category: self.category,
            description: self.description,
            occurred_at: self.occurred_at,
            owner: self.owner,
            order_id: self.order_id,
            idempotency_key: self.idempotency_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub phone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for s in [OrderStatus::InProgress, OrderStatus::Ready, OrderStatus::Delivered] {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse(" READY "), Some(OrderStatus::Ready));
        assert_eq!(OrderStatus::parse("shipped"), None);
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(!OrderStatus::Ready.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn method_and_kind_parse() {
        assert_eq!(PaymentMethod::parse("PIX"), Some(PaymentMethod::Pix));
        assert_eq!(PaymentMethod::parse("cheque"), None);
        assert_eq!(EntryKind::parse("expense"), Some(EntryKind::Expense));
    }
}
