use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use wsk_db::{ClientDirectory, Gateway, GatewayError};
use wsk_ledger::marker::parse_payment_marker;
use wsk_ledger::{DailyTotal, Ledger, LedgerQuery, LedgerSummary};
use wsk_orders::{assemble_all, lifecycle, Order, OrderInput};
use wsk_reconcile::{
    plan_payment, sweep, LedgerAction, PaymentOutcome, PaymentPolicy, SweepReport,
};
use wsk_schemas::{
    Client, EntryKind, LedgerEntry, Micros, NewLedgerEntry, OrderId, OrderPatch, OrderStatus,
    PaymentMethod, UserId,
};

use crate::ServiceError;

type Result<T> = std::result::Result<T, ServiceError>;

/// Plans per set-paid call before giving up to concurrent writers.
const PAYMENT_ATTEMPTS: usize = 3;

/// Manual revenue or expense, not tied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInput {
    pub kind: EntryKind,
    pub amount: Micros,
    pub category: String,
    pub description: String,
    /// Defaults to now.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Defaults to the policy owner.
    pub owner: Option<UserId>,
}

#[derive(Debug, Default)]
struct State {
    orders: BTreeMap<OrderId, Order>,
    ledger: Ledger,
}

pub struct OrderService<G> {
    gateway: G,
    policy: PaymentPolicy,
    state: RwLock<State>,
}

impl<G> OrderService<G>
where
    G: Gateway + ClientDirectory,
{
    /// Build the service and load the first snapshot.
    pub async fn open(gateway: G, policy: PaymentPolicy) -> Result<Self> {
        let svc = OrderService {
            gateway,
            policy,
            state: RwLock::new(State::default()),
        };
        svc.refresh().await?;
        Ok(svc)
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn policy(&self) -> &PaymentPolicy {
        &self.policy
    }

    /// Refetch every order, item and entry and swap the snapshot.
    ///
    /// The write lock is held from fetch to swap, so overlapping refreshes
    /// install snapshots in the order they were read.
    pub async fn refresh(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let snap = self.gateway.fetch_all().await?;
        let order_rows = snap.orders.len();
        let orders = assemble_all(snap.orders, snap.items).map_err(|(id, e)| {
            ServiceError::Transient(format!("stored order {id} is inconsistent: {e}"))
        })?;
        let ledger = Ledger::from_entries(snap.ledger)
            .map_err(|e| ServiceError::Transient(format!("stored ledger is inconsistent: {e}")))?;

        debug!(orders = order_rows, entries = ledger.len(), "snapshot refreshed");
        state.orders = orders;
        state.ledger = ledger;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Register a client. The phone is kept as digits only.
    #[instrument(skip(self, phone))]
    pub async fn create_client(&self, name: &str, phone: &str) -> Result<Client> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("client name is empty".to_string()));
        }
        let phone: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        let client = self.gateway.create_client(name, &phone).await?;
        info!(client_id = %client.id, "client created");
        Ok(client)
    }

    /// Validate, persist, and, when `input.paid` is set, record the payment
    /// through the same path as [`set_order_paid`](Self::set_order_paid).
    #[instrument(skip(self, input), fields(items = input.items.len(), paid = input.paid))]
    pub async fn create_order(&self, input: OrderInput) -> Result<Order> {
        let draft = input.validate(Utc::now())?;

        let client_id = draft.record.client_id;
        if self.gateway.resolve_client(client_id).await?.is_none() {
            return Err(ServiceError::NotFound {
                entity: "client",
                id: client_id.get(),
            });
        }

        let (record, _) = self
            .gateway
            .create_order(draft.record, draft.items)
            .await?;
        info!(order_id = %record.id, total = %draft.total, "order created");
        self.refresh().await?;

        if draft.paid {
            self.set_order_paid(record.id, true, draft.payment_method)
                .await?;
        }
        self.get_order(record.id).await
    }

    /// Bring the ledger and the paid flag to `paid`. Idempotent.
    ///
    /// Plans from a fresh read. The ledger write happens before the flag
    /// write: a failure in between leaves an entry without the flag, which
    /// the next call repairs. When another writer changed the order's
    /// payment entries between the read and the write, the call re-reads
    /// and plans again instead of writing the flag.
    #[instrument(skip(self))]
    pub async fn set_order_paid(
        &self,
        order_id: OrderId,
        paid: bool,
        method: Option<PaymentMethod>,
    ) -> Result<PaymentOutcome> {
        for attempt in 1..=PAYMENT_ATTEMPTS {
            self.refresh().await?;
            let (plan, status) = {
                let state = self.state.read().await;
                let order = state.orders.get(&order_id).ok_or(ServiceError::NotFound {
                    entity: "order",
                    id: order_id.get(),
                })?;
                let plan =
                    plan_payment(order, &state.ledger, paid, method, &self.policy, Utc::now())?;
                (plan, order.status)
            };

            let raced = match plan.ledger {
                LedgerAction::None => false,
                LedgerAction::Create(entry) => match self.gateway.create_entry(entry).await {
                    Ok(stored) => {
                        info!(%order_id, entry_id = %stored.id, amount = %stored.amount, "payment recorded");
                        false
                    }
                    Err(GatewayError::Conflict { constraint }) => {
                        debug!(%order_id, %constraint, attempt, "payment entry written concurrently");
                        true
                    }
                    Err(e) => return Err(e.into()),
                },
                LedgerAction::Delete(ids) => {
                    let mut removed = 0usize;
                    for id in ids {
                        match self.gateway.delete_entry(id).await {
                            Ok(()) => {
                                removed += 1;
                                info!(%order_id, entry_id = %id, "payment removed");
                            }
                            Err(GatewayError::NotFound { .. }) => {
                                debug!(%order_id, entry_id = %id, attempt, "payment entry already gone");
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                    if removed > 0 && status == OrderStatus::Delivered {
                        warn!(%order_id, "payment removed from a delivered order; status stays delivered");
                    }
                    removed == 0
                }
            };
            if raced {
                continue;
            }

            if let Some(flag) = plan.flag {
                self.gateway
                    .update_order(order_id, OrderPatch::paid(flag))
                    .await?;
            }

            info!(%order_id, outcome = plan.outcome.as_str(), "set paid");
            self.refresh().await?;
            return Ok(plan.outcome);
        }

        warn!(%order_id, attempts = PAYMENT_ATTEMPTS, "payment kept changing under concurrent writers");
        Err(ServiceError::Transient(format!(
            "order {order_id} payment changed concurrently {PAYMENT_ATTEMPTS} times; retry"
        )))
    }

    /// Move one step forward: in_progress → ready → delivered.
    ///
    /// Decides from a fresh read and writes through a guarded transition,
    /// so a delivery never lands on an order that is unpaid in storage.
    #[instrument(skip(self))]
    pub async fn advance_status(&self, order_id: OrderId) -> Result<Order> {
        self.refresh().await?;
        let (from, next) = self.next_step(order_id).await?;

        if self
            .gateway
            .transition_status(order_id, from, next)
            .await?
            .is_none()
        {
            // Stored row moved on since the read. Report what it says now.
            self.refresh().await?;
            self.next_step(order_id).await?;
            warn!(%order_id, %from, to = %next, "status transition refused by stored state");
            return Err(ServiceError::PreconditionFailed(format!(
                "order {order_id} changed while moving {from} -> {next}; retry"
            )));
        }

        info!(%order_id, %from, to = %next, "status advanced");
        self.refresh().await?;
        self.get_order(order_id).await
    }

    async fn next_step(&self, order_id: OrderId) -> Result<(OrderStatus, OrderStatus)> {
        let state = self.state.read().await;
        let order = state.orders.get(&order_id).ok_or(ServiceError::NotFound {
            entity: "order",
            id: order_id.get(),
        })?;
        Ok((order.status, lifecycle::advance(order)?))
    }

    /// Record a manual revenue or expense entry.
    ///
    /// Descriptions that read as a payment marker are refused; those belong
    /// to reconciliation.
    #[instrument(skip(self, input), fields(kind = %input.kind, amount = %input.amount))]
    pub async fn record_entry(&self, input: EntryInput) -> Result<LedgerEntry> {
        if !input.amount.is_positive() {
            return Err(ServiceError::Validation(
                "entry amount must be greater than zero".to_string(),
            ));
        }
        let category = input.category.trim();
        if category.is_empty() {
            return Err(ServiceError::Validation("entry category is empty".to_string()));
        }
        if parse_payment_marker(&input.description).is_some() {
            return Err(ServiceError::Validation(
                "description is reserved for order payments".to_string(),
            ));
        }

        let entry = NewLedgerEntry {
            kind: input.kind,
            amount: input.amount,
            category: category.to_string(),
            description: input.description.trim().to_string(),
            occurred_at: input.occurred_at.unwrap_or_else(Utc::now),
            owner: input.owner.unwrap_or(self.policy.owner),
            order_id: None,
            idempotency_key: Uuid::new_v4(),
        };
        let stored = self.gateway.create_entry(entry).await?;
        info!(entry_id = %stored.id, "ledger entry recorded");
        self.refresh().await?;
        Ok(stored)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.state
            .read()
            .await
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(ServiceError::NotFound {
                entity: "order",
                id: order_id.get(),
            })
    }

    /// Clients by name. A blank filter lists everyone.
    pub async fn list_clients(&self, name_filter: Option<&str>) -> Result<Vec<Client>> {
        let filter = name_filter.map(str::trim).filter(|f| !f.is_empty());
        Ok(self.gateway.list_clients(filter).await?)
    }

    /// Total recomputed from the order's items.
    pub async fn order_total(&self, order_id: OrderId) -> Result<Micros> {
        self.get_order(order_id).await.map(|o| o.total)
    }

    /// Newest first; ties broken by id, newest first.
    pub async fn list_orders(&self, status: Option<OrderStatus>) -> Vec<Order> {
        let state = self.state.read().await;
        let mut out: Vec<Order> = state
            .orders
            .values()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out
    }

    pub async fn ledger_entries(&self, q: &LedgerQuery) -> Vec<LedgerEntry> {
        let state = self.state.read().await;
        state.ledger.query(q).into_iter().cloned().collect()
    }

    pub async fn ledger_summary(&self, q: &LedgerQuery) -> LedgerSummary {
        self.state.read().await.ledger.summary(q)
    }

    pub async fn daily_totals(&self, q: &LedgerQuery) -> Vec<DailyTotal> {
        self.state.read().await.ledger.daily_totals(q)
    }

    /// Audit the current snapshot. Drift is logged, never repaired here.
    pub async fn reconcile_sweep(&self) -> SweepReport {
        let state = self.state.read().await;
        let report = sweep(state.orders.values(), &state.ledger);
        if report.is_clean() {
            info!(orders = report.orders_checked, "reconcile sweep clean");
        } else {
            warn!(
                orders = report.orders_checked,
                diffs = report.diffs.len(),
                reasons = ?report.reasons,
                "reconcile sweep found drift"
            );
        }
        report
    }
}
