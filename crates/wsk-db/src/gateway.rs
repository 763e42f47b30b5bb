use std::fmt;

use async_trait::async_trait;
use wsk_schemas::{
    Client, ClientId, EntryId, LedgerEntry, NewItemRecord, NewLedgerEntry, NewOrderRecord,
    OrderId, OrderItem, OrderPatch, OrderRecord, OrderStatus,
};

/// At most one ledger entry per (order_id, kind).
pub const UQ_LEDGER_ORDER_KIND: &str = "uq_ledger_order_kind";
/// Idempotency keys are unique across the ledger.
pub const UQ_LEDGER_IDEMPOTENCY_KEY: &str = "uq_ledger_idempotency_key";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// A uniqueness constraint rejected the write.
    Conflict { constraint: String },
    NotFound { entity: &'static str, id: i64 },
    /// Connectivity, decoding, or any other storage failure.
    Backend(String),
}

impl GatewayError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, GatewayError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Conflict { constraint } => {
                write!(f, "unique constraint violated: {constraint}")
            }
            GatewayError::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            GatewayError::Backend(msg) => write!(f, "storage backend error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

pub type GatewayResult<T> = Result<T, GatewayError>;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Every row the service needs, fetched in one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub orders: Vec<OrderRecord>,
    pub items: Vec<OrderItem>,
    pub ledger: Vec<LedgerEntry>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Narrow persistence interface for orders, items and ledger entries.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn fetch_orders(&self) -> GatewayResult<Vec<OrderRecord>>;

    async fn fetch_items(&self) -> GatewayResult<Vec<OrderItem>>;

    async fn fetch_ledger(&self) -> GatewayResult<Vec<LedgerEntry>>;

    async fn fetch_all(&self) -> GatewayResult<Snapshot> {
        Ok(Snapshot {
            orders: self.fetch_orders().await?,
            items: self.fetch_items().await?,
            ledger: self.fetch_ledger().await?,
        })
    }

    /// Insert an order row and all of its items atomically.
    async fn create_order(
        &self,
        record: NewOrderRecord,
        items: Vec<NewItemRecord>,
    ) -> GatewayResult<(OrderRecord, Vec<OrderItem>)>;

    async fn update_order(&self, id: OrderId, patch: OrderPatch) -> GatewayResult<OrderRecord>;

    /// Conditional status write. Applies only while the stored status is
    /// still `from` and, when `to` is delivered, the stored order is paid.
    ///
    /// `Ok(None)` when the guard rejected the write.
    ///
    /// # Errors
    /// [`GatewayError::NotFound`] when no order has this id.
    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> GatewayResult<Option<OrderRecord>>;

    /// # Errors
    /// [`GatewayError::Conflict`] naming [`UQ_LEDGER_ORDER_KIND`] or
    /// [`UQ_LEDGER_IDEMPOTENCY_KEY`] when an equivalent entry exists.
    async fn create_entry(&self, entry: NewLedgerEntry) -> GatewayResult<LedgerEntry>;

    /// # Errors
    /// [`GatewayError::NotFound`] when no entry has this id.
    async fn delete_entry(&self, id: EntryId) -> GatewayResult<()>;
}

#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn resolve_client(&self, id: ClientId) -> GatewayResult<Option<Client>>;

    async fn create_client(&self, name: &str, phone: &str) -> GatewayResult<Client>;

    /// Clients ordered by name, then id. `name_filter` matches any part of
    /// the name, ignoring case.
    async fn list_clients(&self, name_filter: Option<&str>) -> GatewayResult<Vec<Client>>;
}
