use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;
use wsk_schemas::{
    Client, ClientId, EntryId, EntryKind, ItemId, LedgerEntry, Micros, NewItemRecord,
    NewLedgerEntry, NewOrderRecord, OrderId, OrderItem, OrderPatch, OrderRecord, OrderStatus,
    UserId,
};

use crate::gateway::{ClientDirectory, Gateway, GatewayError, GatewayResult};

pub const ENV_DB_URL: &str = "WSK_DATABASE_URL";

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

/// sqlx-backed gateway. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn from_pool(pool: PgPool) -> Self {
        PgGateway { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(PgGateway { pool })
    }

    /// Connect using the URL held in env var `env_name`.
    pub async fn connect_from_env(env_name: &str, max_connections: u32) -> Result<Self> {
        let url =
            std::env::var(env_name).with_context(|| format!("missing env var {env_name}"))?;
        Self::connect(&url, max_connections).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("db migrate failed")?;
        Ok(())
    }

    /// Connectivity plus schema presence.
    pub async fn status(&self) -> Result<DbStatus> {
        let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
            .fetch_one(&self.pool)
            .await
            .context("status connectivity query failed")?;

        let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
            r#"
            select exists (
                select 1
                from information_schema.tables
                where table_schema='public' and table_name='orders'
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("status table-exists query failed")?;

        Ok(DbStatus {
            ok: one == 1,
            has_orders_table: exists,
        })
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_err(what: &str, err: sqlx::Error) -> GatewayError {
    if let sqlx::Error::Database(db_err) = &err {
        // 23505 unique_violation
        if db_err.code().as_deref() == Some("23505") {
            return GatewayError::Conflict {
                constraint: db_err.constraint().unwrap_or("unknown").to_string(),
            };
        }
    }
    GatewayError::Backend(format!("{what} failed: {err}"))
}

fn decode_err(what: &str, detail: impl std::fmt::Display) -> GatewayError {
    GatewayError::Backend(format!("{what}: {detail}"))
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn order_from_row(row: &PgRow) -> GatewayResult<OrderRecord> {
    let get = |e: sqlx::Error| decode_err("decode order row", e);
    let status: String = row.try_get("status").map_err(get)?;
    Ok(OrderRecord {
        id: OrderId(row.try_get("id").map_err(get)?),
        client_id: ClientId(row.try_get("client_id").map_err(get)?),
        deliver_by: row.try_get::<Option<NaiveDate>, _>("deliver_by").map_err(get)?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| decode_err("decode order row", format!("invalid status '{status}'")))?,
        paid: row.try_get("paid").map_err(get)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(get)?,
    })
}

fn item_from_row(row: &PgRow) -> GatewayResult<OrderItem> {
    let get = |e: sqlx::Error| decode_err("decode item row", e);
    let qty: i32 = row.try_get("quantity").map_err(get)?;
    Ok(OrderItem {
        id: ItemId(row.try_get("id").map_err(get)?),
        order_id: OrderId(row.try_get("order_id").map_err(get)?),
        description: row.try_get("description").map_err(get)?,
        quantity: u32::try_from(qty)
            .map_err(|_| decode_err("decode item row", format!("negative quantity {qty}")))?,
        unit_price: Micros::new(row.try_get("unit_price_micros").map_err(get)?),
        total: Micros::new(row.try_get("total_micros").map_err(get)?),
        note: row.try_get("note").map_err(get)?,
    })
}

fn entry_from_row(row: &PgRow) -> GatewayResult<LedgerEntry> {
    let get = |e: sqlx::Error| decode_err("decode ledger row", e);
    let kind: String = row.try_get("kind").map_err(get)?;
    Ok(LedgerEntry {
        id: EntryId(row.try_get("id").map_err(get)?),
        kind: EntryKind::parse(&kind)
            .ok_or_else(|| decode_err("decode ledger row", format!("invalid kind '{kind}'")))?,
        amount: Micros::new(row.try_get("amount_micros").map_err(get)?),
        category: row.try_get("category").map_err(get)?,
        description: row.try_get("description").map_err(get)?,
        occurred_at: row.try_get::<DateTime<Utc>, _>("occurred_at").map_err(get)?,
        owner: UserId(row.try_get("owner_user_id").map_err(get)?),
        order_id: row
            .try_get::<Option<i64>, _>("order_id")
            .map_err(get)?
            .map(OrderId),
        idempotency_key: row.try_get::<Uuid, _>("idempotency_key").map_err(get)?,
    })
}

const ORDER_COLUMNS: &str = "id, client_id, deliver_by, status, paid, created_at";
const ITEM_COLUMNS: &str =
    "id, order_id, description, quantity, unit_price_micros, total_micros, note";
const ENTRY_COLUMNS: &str = "id, kind, amount_micros, category, description, occurred_at, \
     owner_user_id, order_id, idempotency_key";

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[async_trait]
impl Gateway for PgGateway {
    async fn fetch_orders(&self) -> GatewayResult<Vec<OrderRecord>> {
        let rows = sqlx::query(&format!("select {ORDER_COLUMNS} from orders order by id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_err("fetch orders", e))?;
        rows.iter().map(order_from_row).collect()
    }

    async fn fetch_items(&self) -> GatewayResult<Vec<OrderItem>> {
        let rows = sqlx::query(&format!("select {ITEM_COLUMNS} from order_items order by id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_err("fetch items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    async fn fetch_ledger(&self) -> GatewayResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!("select {ENTRY_COLUMNS} from ledger_entries order by id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_err("fetch ledger", e))?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn create_order(
        &self,
        record: NewOrderRecord,
        items: Vec<NewItemRecord>,
    ) -> GatewayResult<(OrderRecord, Vec<OrderItem>)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_err("begin create_order", e))?;

        let client_exists: Option<(i64,)> =
            sqlx::query_as::<_, (i64,)>("select id from clients where id = $1")
                .bind(record.client_id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_err("lookup client", e))?;
        if client_exists.is_none() {
            return Err(GatewayError::NotFound {
                entity: "client",
                id: record.client_id.get(),
            });
        }

        let row = sqlx::query(&format!(
            "insert into orders (client_id, deliver_by, status, paid, created_at) \
             values ($1, $2, $3, $4, $5) returning {ORDER_COLUMNS}"
        ))
        .bind(record.client_id.get())
        .bind(record.deliver_by)
        .bind(record.status.as_str())
        .bind(record.paid)
        .bind(record.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_err("insert order", e))?;
        let order = order_from_row(&row)?;

        let mut stored = Vec::with_capacity(items.len());
        for it in items {
            let qty = i32::try_from(it.quantity)
                .map_err(|_| decode_err("insert item", format!("quantity {} too large", it.quantity)))?;
            let row = sqlx::query(&format!(
                "insert into order_items \
                 (order_id, description, quantity, unit_price_micros, total_micros, note) \
                 values ($1, $2, $3, $4, $5, $6) returning {ITEM_COLUMNS}"
            ))
            .bind(order.id.get())
            .bind(&it.description)
            .bind(qty)
            .bind(it.unit_price.raw())
            .bind(it.total.raw())
            .bind(it.note.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_err("insert item", e))?;
            stored.push(item_from_row(&row)?);
        }

        tx.commit()
            .await
            .map_err(|e| map_err("commit create_order", e))?;
        Ok((order, stored))
    }

    async fn update_order(&self, id: OrderId, patch: OrderPatch) -> GatewayResult<OrderRecord> {
        let row = sqlx::query(&format!(
            "update orders set status = coalesce($2, status), paid = coalesce($3, paid) \
             where id = $1 returning {ORDER_COLUMNS}"
        ))
        .bind(id.get())
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.paid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_err("update order", e))?;

        match row {
            Some(row) => order_from_row(&row),
            None => Err(GatewayError::NotFound {
                entity: "order",
                id: id.get(),
            }),
        }
    }

    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> GatewayResult<Option<OrderRecord>> {
        let row = sqlx::query(&format!(
            "update orders set status = $3 \
             where id = $1 and status = $2 and ($3 <> 'delivered' or paid) \
             returning {ORDER_COLUMNS}"
        ))
        .bind(id.get())
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_err("transition order status", e))?;

        if let Some(row) = row {
            return order_from_row(&row).map(Some);
        }
        let exists: Option<(i64,)> = sqlx::query_as::<_, (i64,)>("select id from orders where id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("lookup order", e))?;
        match exists {
            Some(_) => Ok(None),
            None => Err(GatewayError::NotFound {
                entity: "order",
                id: id.get(),
            }),
        }
    }

    async fn create_entry(&self, entry: NewLedgerEntry) -> GatewayResult<LedgerEntry> {
        let row = sqlx::query(&format!(
            "insert into ledger_entries \
             (kind, amount_micros, category, description, occurred_at, owner_user_id, order_id, idempotency_key) \
             values ($1, $2, $3, $4, $5, $6, $7, $8) returning {ENTRY_COLUMNS}"
        ))
        .bind(entry.kind.as_str())
        .bind(entry.amount.raw())
        .bind(&entry.category)
        .bind(&entry.description)
        .bind(entry.occurred_at)
        .bind(entry.owner.get())
        .bind(entry.order_id.map(|o| o.get()))
        .bind(entry.idempotency_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_err("insert ledger entry", e))?;
        entry_from_row(&row)
    }

    async fn delete_entry(&self, id: EntryId) -> GatewayResult<()> {
        let res = sqlx::query("delete from ledger_entries where id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_err("delete ledger entry", e))?;
        if res.rows_affected() == 0 {
            return Err(GatewayError::NotFound {
                entity: "ledger entry",
                id: id.get(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ClientDirectory for PgGateway {
    async fn resolve_client(&self, id: ClientId) -> GatewayResult<Option<Client>> {
        let row = sqlx::query("select id, name, phone from clients where id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("resolve client", e))?;
        row.map(|r| client_from_row(&r)).transpose()
    }

    async fn create_client(&self, name: &str, phone: &str) -> GatewayResult<Client> {
        let row = sqlx::query("insert into clients (name, phone) values ($1, $2) returning id, name, phone")
            .bind(name)
            .bind(phone)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_err("insert client", e))?;
        client_from_row(&row)
    }

    async fn list_clients(&self, name_filter: Option<&str>) -> GatewayResult<Vec<Client>> {
        let pattern = name_filter.map(|f| format!("%{}%", escape_like(f.trim())));
        let rows = sqlx::query(
            "select id, name, phone from clients \
             where $1::text is null or name ilike $1 \
             order by name, id",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_err("list clients", e))?;
        rows.iter().map(client_from_row).collect()
    }
}

/// Escape `%`, `_` and `\` so the filter matches literally.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn client_from_row(row: &PgRow) -> GatewayResult<Client> {
    let get = |e: sqlx::Error| decode_err("decode client row", e);
    Ok(Client {
        id: ClientId(row.try_get("id").map_err(get)?),
        name: row.try_get("name").map_err(get)?,
        phone: row.try_get("phone").map_err(get)?,
    })
}
