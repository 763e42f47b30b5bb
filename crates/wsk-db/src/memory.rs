//! In-process gateway.
//!
//! Clones share the same tables, so several services can be pointed at one
//! store to exercise concurrent writers. Constraint behaviour mirrors the
//! Postgres schema in `migrations/`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use wsk_schemas::{
    Client, ClientId, EntryId, ItemId, LedgerEntry, NewItemRecord, NewLedgerEntry,
    NewOrderRecord, OrderId, OrderItem, OrderPatch, OrderRecord, OrderStatus,
};

use crate::gateway::{
    ClientDirectory, Gateway, GatewayError, GatewayResult, UQ_LEDGER_IDEMPOTENCY_KEY,
    UQ_LEDGER_ORDER_KIND,
};

/// Gateway operations that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Fetch,
    CreateOrder,
    UpdateOrder,
    CreateEntry,
    DeleteEntry,
    CreateClient,
}

#[derive(Debug, Default)]
struct Tables {
    last_id: i64,
    clients: BTreeMap<ClientId, Client>,
    orders: BTreeMap<OrderId, OrderRecord>,
    items: BTreeMap<ItemId, OrderItem>,
    ledger: BTreeMap<EntryId, LedgerEntry>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<HashSet<FaultOp>>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with a backend error.
    #[cfg(feature = "testkit")]
    pub async fn fail_next(&self, op: FaultOp) {
        self.faults.lock().await.insert(op);
    }

    async fn check_fault(&self, op: FaultOp) -> GatewayResult<()> {
        if self.faults.lock().await.remove(&op) {
            return Err(GatewayError::Backend(format!("injected failure: {op:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn fetch_orders(&self) -> GatewayResult<Vec<OrderRecord>> {
        self.check_fault(FaultOp::Fetch).await?;
        Ok(self.tables.lock().await.orders.values().cloned().collect())
    }

    async fn fetch_items(&self) -> GatewayResult<Vec<OrderItem>> {
        Ok(self.tables.lock().await.items.values().cloned().collect())
    }

    async fn fetch_ledger(&self) -> GatewayResult<Vec<LedgerEntry>> {
        Ok(self.tables.lock().await.ledger.values().cloned().collect())
    }

    async fn create_order(
        &self,
        record: NewOrderRecord,
        items: Vec<NewItemRecord>,
    ) -> GatewayResult<(OrderRecord, Vec<OrderItem>)> {
        self.check_fault(FaultOp::CreateOrder).await?;
        let mut t = self.tables.lock().await;
        if !t.clients.contains_key(&record.client_id) {
            return Err(GatewayError::NotFound {
                entity: "client",
                id: record.client_id.get(),
            });
        }

        let id = OrderId(t.next_id());
        let row = OrderRecord {
            id,
            client_id: record.client_id,
            deliver_by: record.deliver_by,
            status: record.status,
            paid: record.paid,
            created_at: record.created_at,
        };
        let mut stored = Vec::with_capacity(items.len());
        for it in items {
            let item = OrderItem {
                id: ItemId(t.next_id()),
                order_id: id,
                description: it.description,
                quantity: it.quantity,
                unit_price: it.unit_price,
                total: it.total,
                note: it.note,
            };
            t.items.insert(item.id, item.clone());
            stored.push(item);
        }
        t.orders.insert(id, row.clone());
        Ok((row, stored))
    }

    async fn update_order(&self, id: OrderId, patch: OrderPatch) -> GatewayResult<OrderRecord> {
        self.check_fault(FaultOp::UpdateOrder).await?;
        let mut t = self.tables.lock().await;
        let row = t.orders.get_mut(&id).ok_or(GatewayError::NotFound {
            entity: "order",
            id: id.get(),
        })?;
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(paid) = patch.paid {
            row.paid = paid;
        }
        Ok(row.clone())
    }

    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> GatewayResult<Option<OrderRecord>> {
        self.check_fault(FaultOp::UpdateOrder).await?;
        let mut t = self.tables.lock().await;
        let row = t.orders.get_mut(&id).ok_or(GatewayError::NotFound {
            entity: "order",
            id: id.get(),
        })?;
        if row.status != from || (to == OrderStatus::Delivered && !row.paid) {
            return Ok(None);
        }
        row.status = to;
        Ok(Some(row.clone()))
    }

    async fn create_entry(&self, entry: NewLedgerEntry) -> GatewayResult<LedgerEntry> {
        self.check_fault(FaultOp::CreateEntry).await?;
        // Same CHECKs as the ledger_entries table.
        if !entry.amount.is_positive() {
            return Err(GatewayError::Backend(format!(
                "check violated: amount_micros > 0 (got {})",
                entry.amount.raw()
            )));
        }
        if entry.category.trim().is_empty() {
            return Err(GatewayError::Backend(
                "check violated: category must not be blank".to_string(),
            ));
        }
        let mut t = self.tables.lock().await;

        if let Some(order_id) = entry.order_id {
            if !t.orders.contains_key(&order_id) {
                return Err(GatewayError::NotFound {
                    entity: "order",
                    id: order_id.get(),
                });
            }
            if t
                .ledger
                .values()
                .any(|e| e.order_id == Some(order_id) && e.kind == entry.kind)
            {
                return Err(GatewayError::Conflict {
                    constraint: UQ_LEDGER_ORDER_KIND.to_string(),
                });
            }
        }
        if t
            .ledger
            .values()
            .any(|e| e.idempotency_key == entry.idempotency_key)
        {
            return Err(GatewayError::Conflict {
                constraint: UQ_LEDGER_IDEMPOTENCY_KEY.to_string(),
            });
        }

        let stored = entry.into_entry(EntryId(t.next_id()));
        t.ledger.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete_entry(&self, id: EntryId) -> GatewayResult<()> {
        self.check_fault(FaultOp::DeleteEntry).await?;
        match self.tables.lock().await.ledger.remove(&id) {
            Some(_) => Ok(()),
            None => Err(GatewayError::NotFound {
                entity: "ledger entry",
                id: id.get(),
            }),
        }
    }
}

#[async_trait]
impl ClientDirectory for MemoryGateway {
    async fn resolve_client(&self, id: ClientId) -> GatewayResult<Option<Client>> {
        Ok(self.tables.lock().await.clients.get(&id).cloned())
    }

    async fn create_client(&self, name: &str, phone: &str) -> GatewayResult<Client> {
        self.check_fault(FaultOp::CreateClient).await?;
        let mut t = self.tables.lock().await;
        let client = Client {
            id: ClientId(t.next_id()),
            name: name.to_string(),
            phone: phone.to_string(),
        };
        t.clients.insert(client.id, client.clone());
        Ok(client)
    }

    async fn list_clients(&self, name_filter: Option<&str>) -> GatewayResult<Vec<Client>> {
        let needle = name_filter.map(|f| f.trim().to_lowercase());
        let mut out: Vec<Client> = self
            .tables
            .lock()
            .await
            .clients
            .values()
            .filter(|c| match &needle {
                Some(n) => c.name.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;
    use wsk_schemas::{EntryKind, Micros, OrderStatus, UserId};

    async fn seeded() -> (MemoryGateway, OrderId) {
        let gw = MemoryGateway::new();
        let client = gw.create_client("Ana", "5511999990000").await.unwrap();
        let (order, _) = gw
            .create_order(
                NewOrderRecord {
                    client_id: client.id,
                    deliver_by: None,
                    status: OrderStatus::InProgress,
                    paid: false,
                    created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
                },
                vec![NewItemRecord {
                    description: "screen".into(),
                    quantity: 1,
                    unit_price: Micros::from_units(10),
                    total: Micros::from_units(10),
                    note: None,
                }],
            )
            .await
            .unwrap();
        (gw, order.id)
    }

    fn payment(order_id: OrderId, key: Uuid) -> NewLedgerEntry {
        NewLedgerEntry {
            kind: EntryKind::Revenue,
            amount: Micros::from_units(10),
            category: "services".into(),
            description: format!("Payment order #{order_id}"),
            occurred_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            owner: UserId(1),
            order_id: Some(order_id),
            idempotency_key: key,
        }
    }

    #[tokio::test]
    async fn second_entry_for_same_order_conflicts() {
        let (gw, order_id) = seeded().await;
        gw.create_entry(payment(order_id, Uuid::from_u128(1))).await.unwrap();
        let err = gw
            .create_entry(payment(order_id, Uuid::from_u128(2)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Conflict {
                constraint: UQ_LEDGER_ORDER_KIND.to_string()
            }
        );
        assert_eq!(gw.fetch_ledger().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reused_idempotency_key_conflicts() {
        let (gw, order_id) = seeded().await;
        let mut manual = payment(order_id, Uuid::from_u128(7));
        manual.order_id = None;
        gw.create_entry(manual.clone()).await.unwrap();
        let err = gw.create_entry(manual).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Conflict {
                constraint: UQ_LEDGER_IDEMPOTENCY_KEY.to_string()
            }
        );
    }

    #[tokio::test]
    async fn entry_for_unknown_order_is_rejected() {
        let (gw, _) = seeded().await;
        let err = gw
            .create_entry(payment(OrderId(999), Uuid::from_u128(1)))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_missing_entry_is_not_found() {
        let (gw, _) = seeded().await;
        assert!(gw.delete_entry(EntryId(42)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn order_for_unknown_client_is_rejected() {
        let gw = MemoryGateway::new();
        let err = gw
            .create_order(
                NewOrderRecord {
                    client_id: ClientId(5),
                    deliver_by: None,
                    status: OrderStatus::InProgress,
                    paid: false,
                    created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
                },
                vec![],
            )
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::NotFound { entity: "client", id: 5 });
        assert!(gw.fetch_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clones_share_tables() {
        let (gw, order_id) = seeded().await;
        let other = gw.clone();
        other
            .update_order(order_id, OrderPatch::paid(true))
            .await
            .unwrap();
        let rows = gw.fetch_orders().await.unwrap();
        assert!(rows[0].paid);
    }

    #[tokio::test]
    async fn entry_breaking_table_checks_is_rejected() {
        let (gw, order_id) = seeded().await;

        let mut zero = payment(order_id, Uuid::from_u128(1));
        zero.amount = Micros::ZERO;
        let err = gw.create_entry(zero).await.unwrap_err();
        assert!(matches!(err, GatewayError::Backend(_)), "{err:?}");

        let mut negative = payment(order_id, Uuid::from_u128(2));
        negative.amount = Micros::from_units(-3);
        assert!(matches!(
            gw.create_entry(negative).await,
            Err(GatewayError::Backend(_))
        ));

        let mut blank = payment(order_id, Uuid::from_u128(3));
        blank.category = "  ".into();
        assert!(matches!(
            gw.create_entry(blank).await,
            Err(GatewayError::Backend(_))
        ));

        assert!(gw.fetch_ledger().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_transition_requires_stored_paid_flag() {
        let (gw, order_id) = seeded().await;
        let ready = gw
            .transition_status(order_id, OrderStatus::InProgress, OrderStatus::Ready)
            .await
            .unwrap()
            .expect("in_progress -> ready applies");
        assert_eq!(ready.status, OrderStatus::Ready);

        let refused = gw
            .transition_status(order_id, OrderStatus::Ready, OrderStatus::Delivered)
            .await
            .unwrap();
        assert!(refused.is_none());

        gw.update_order(order_id, OrderPatch::paid(true)).await.unwrap();
        let delivered = gw
            .transition_status(order_id, OrderStatus::Ready, OrderStatus::Delivered)
            .await
            .unwrap()
            .expect("paid order can be delivered");
        assert_eq!(delivered.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn transition_from_a_status_no_longer_stored_is_refused() {
        let (gw, order_id) = seeded().await;
        gw.transition_status(order_id, OrderStatus::InProgress, OrderStatus::Ready)
            .await
            .unwrap();
        let again = gw
            .transition_status(order_id, OrderStatus::InProgress, OrderStatus::Ready)
            .await
            .unwrap();
        assert!(again.is_none());

        let err = gw
            .transition_status(OrderId(999), OrderStatus::InProgress, OrderStatus::Ready)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn clients_filter_by_name_ignoring_case() {
        let gw = MemoryGateway::new();
        gw.create_client("Bruno Lima", "1").await.unwrap();
        gw.create_client("Ana Souza", "2").await.unwrap();
        gw.create_client("Mariana", "3").await.unwrap();

        let all = gw.list_clients(None).await.unwrap();
        let names: Vec<&str> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Ana Souza", "Bruno Lima", "Mariana"]);

        let ana = gw.list_clients(Some(" ANA ")).await.unwrap();
        let names: Vec<&str> = ana.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Ana Souza", "Mariana"]);

        assert!(gw.list_clients(Some("zé")).await.unwrap().is_empty());
    }
}
