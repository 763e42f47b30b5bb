//! Order & item model.
//!
//! [`OrderInput::validate`] turns caller input into an [`OrderDraft`] ready
//! to persist, or a [`ValidationError`] naming the first offending field.
//! [`Order::assemble`] goes the other way: persisted rows back into a full
//! order, with every total recomputed from quantity × unit price.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use wsk_schemas::{
    ClientId, Micros, NewItemRecord, NewOrderRecord, OrderId, OrderItem, OrderRecord,
    OrderStatus, PaymentMethod,
};

/// Quantity used when the caller leaves it out.
pub const DEFAULT_QUANTITY: u32 = 1;

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingClient,
    NoItems,
    EmptyDescription { index: usize },
    ZeroQuantity { index: usize },
    NonPositivePrice { index: usize },
    /// quantity × unit price (or the order sum) does not fit in `Micros`.
    AmountOverflow { index: Option<usize> },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingClient => write!(f, "order has no client"),
            ValidationError::NoItems => write!(f, "order has no items"),
            ValidationError::EmptyDescription { index } => {
                write!(f, "item {index}: description is empty")
            }
            ValidationError::ZeroQuantity { index } => {
                write!(f, "item {index}: quantity must be greater than zero")
            }
            ValidationError::NonPositivePrice { index } => {
                write!(f, "item {index}: unit price must be greater than zero")
            }
            ValidationError::AmountOverflow { index: Some(index) } => {
                write!(f, "item {index}: line total out of range")
            }
            ValidationError::AmountOverflow { index: None } => {
                write!(f, "order total out of range")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// quantity × unit price.
pub fn line_total(quantity: u32, unit_price: Micros) -> Option<Micros> {
    unit_price.checked_mul_qty(quantity)
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInput {
    pub description: String,
    /// Defaults to [`DEFAULT_QUANTITY`].
    pub quantity: Option<u32>,
    pub unit_price: Micros,
    pub note: Option<String>,
}

impl ItemInput {
    pub fn new(description: impl Into<String>, quantity: u32, unit_price: Micros) -> Self {
        ItemInput {
            description: description.into(),
            quantity: Some(quantity),
            unit_price,
            note: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInput {
    pub client_id: Option<ClientId>,
    pub items: Vec<ItemInput>,
    pub deliver_by: Option<NaiveDate>,
    pub paid: bool,
    pub payment_method: Option<PaymentMethod>,
}

/// A validated order, not yet persisted.
///
/// The record is always written unpaid; `paid` is the caller's request and
/// is applied afterwards through payment reconciliation so the ledger entry
/// and the flag are produced by the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub record: NewOrderRecord,
    pub items: Vec<NewItemRecord>,
    pub total: Micros,
    pub paid: bool,
    pub payment_method: Option<PaymentMethod>,
}

impl OrderInput {
    pub fn validate(&self, created_at: DateTime<Utc>) -> Result<OrderDraft, ValidationError> {
        let client_id = self.client_id.ok_or(ValidationError::MissingClient)?;
        if self.items.is_empty() {
            return Err(ValidationError::NoItems);
        }

        let mut items = Vec::with_capacity(self.items.len());
        for (index, item) in self.items.iter().enumerate() {
            let description = item.description.trim();
            if description.is_empty() {
                return Err(ValidationError::EmptyDescription { index });
            }
            let quantity = item.quantity.unwrap_or(DEFAULT_QUANTITY);
            if quantity == 0 {
                return Err(ValidationError::ZeroQuantity { index });
            }
            if !item.unit_price.is_positive() {
                return Err(ValidationError::NonPositivePrice { index });
            }
            let total = line_total(quantity, item.unit_price)
                .ok_or(ValidationError::AmountOverflow { index: Some(index) })?;
            let note = item
                .note
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);

            items.push(NewItemRecord {
                description: description.to_string(),
                quantity,
                unit_price: item.unit_price,
                total,
                note,
            });
        }

        let total = Micros::checked_sum(items.iter().map(|i| i.total))
            .ok_or(ValidationError::AmountOverflow { index: None })?;

        Ok(OrderDraft {
            record: NewOrderRecord {
                client_id,
                deliver_by: self.deliver_by,
                status: OrderStatus::InProgress,
                paid: false,
                created_at,
            },
            items,
            total,
            paid: self.paid,
            payment_method: self.payment_method,
        })
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: ClientId,
    pub deliver_by: Option<NaiveDate>,
    pub status: OrderStatus,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
    pub total: Micros,
}

impl Order {
    /// Build an order from its row and the rows of its items.
    ///
    /// Stored item totals are ignored and recomputed. Items belonging to a
    /// different order are dropped.
    pub fn assemble(record: OrderRecord, items: Vec<OrderItem>) -> Result<Order, ValidationError> {
        let mut own = Vec::with_capacity(items.len());
        for (index, mut item) in items
            .into_iter()
            .filter(|i| i.order_id == record.id)
            .enumerate()
        {
            item.total = line_total(item.quantity, item.unit_price)
                .ok_or(ValidationError::AmountOverflow { index: Some(index) })?;
            own.push(item);
        }
        own.sort_by_key(|i| i.id);

        let total = Micros::checked_sum(own.iter().map(|i| i.total))
            .ok_or(ValidationError::AmountOverflow { index: None })?;

        Ok(Order {
            id: record.id,
            client_id: record.client_id,
            deliver_by: record.deliver_by,
            status: record.status,
            paid: record.paid,
            created_at: record.created_at,
            items: own,
            total,
        })
    }

    pub fn record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id,
            client_id: self.client_id,
            deliver_by: self.deliver_by,
            status: self.status,
            paid: self.paid,
            created_at: self.created_at,
        }
    }
}

/// Assemble every order from flat row sets, keyed by order id.
pub fn assemble_all(
    records: Vec<OrderRecord>,
    items: Vec<OrderItem>,
) -> Result<BTreeMap<OrderId, Order>, (OrderId, ValidationError)> {
    let mut by_order: BTreeMap<OrderId, Vec<OrderItem>> = BTreeMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }

    let mut out = BTreeMap::new();
    for record in records {
        let id = record.id;
        let own = by_order.remove(&id).unwrap_or_default();
        let order = Order::assemble(record, own).map_err(|e| (id, e))?;
        out.insert(id, order);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wsk_schemas::ItemId;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn input(items: Vec<ItemInput>) -> OrderInput {
        OrderInput {
            client_id: Some(ClientId(7)),
            items,
            deliver_by: NaiveDate::from_ymd_opt(2024, 3, 8),
            paid: false,
            payment_method: None,
        }
    }

    #[test]
    fn total_is_sum_of_quantity_times_unit_price() {
        let draft = input(vec![
            ItemInput::new("screen", 2, Micros::from_units(10)),
            ItemInput::new("battery", 1, Micros::from_units(5)),
        ])
        .validate(now())
        .unwrap();

        assert_eq!(draft.total, Micros::from_units(25));
        assert_eq!(draft.items[0].total, Micros::from_units(20));
        assert_eq!(draft.items[1].total, Micros::from_units(5));
        assert_eq!(draft.record.status, OrderStatus::InProgress);
        assert!(!draft.record.paid);
    }

    #[test]
    fn missing_quantity_defaults_to_one() {
        let mut item = ItemInput::new("cleaning", 1, Micros::from_units(30));
        item.quantity = None;
        let draft = input(vec![item]).validate(now()).unwrap();
        assert_eq!(draft.items[0].quantity, 1);
        assert_eq!(draft.total, Micros::from_units(30));
    }

    #[test]
    fn rejects_missing_client_and_empty_items() {
        let mut no_client = input(vec![ItemInput::new("x", 1, Micros::from_units(1))]);
        no_client.client_id = None;
        assert_eq!(no_client.validate(now()), Err(ValidationError::MissingClient));
        assert_eq!(input(vec![]).validate(now()), Err(ValidationError::NoItems));
    }

    #[test]
    fn rejects_bad_items_by_index() {
        let good = ItemInput::new("ok", 1, Micros::from_units(1));

        let blank = ItemInput::new("   ", 1, Micros::from_units(1));
        assert_eq!(
            input(vec![good.clone(), blank]).validate(now()),
            Err(ValidationError::EmptyDescription { index: 1 })
        );

        let zero_qty = ItemInput::new("a", 0, Micros::from_units(1));
        assert_eq!(
            input(vec![zero_qty]).validate(now()),
            Err(ValidationError::ZeroQuantity { index: 0 })
        );

        let free = ItemInput::new("a", 1, Micros::ZERO);
        assert_eq!(
            input(vec![good.clone(), good, free]).validate(now()),
            Err(ValidationError::NonPositivePrice { index: 2 })
        );
    }

    #[test]
    fn overflowing_line_is_rejected() {
        let huge = ItemInput::new("gold", 2, Micros::MAX);
        assert_eq!(
            input(vec![huge]).validate(now()),
            Err(ValidationError::AmountOverflow { index: Some(0) })
        );
    }

    #[test]
    fn assemble_recomputes_stored_totals() {
        let record = OrderRecord {
            id: OrderId(1),
            client_id: ClientId(7),
            deliver_by: None,
            status: OrderStatus::Ready,
            paid: false,
            created_at: now(),
        };
        let tampered = OrderItem {
            id: ItemId(10),
            order_id: OrderId(1),
            description: "screen".into(),
            quantity: 2,
            unit_price: Micros::from_units(10),
            total: Micros::from_units(999),
            note: None,
        };
        let foreign = OrderItem {
            id: ItemId(11),
            order_id: OrderId(2),
            ..tampered.clone()
        };

        let order = Order::assemble(record, vec![tampered, foreign]).unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].total, Micros::from_units(20));
        assert_eq!(order.total, Micros::from_units(20));
    }
}
