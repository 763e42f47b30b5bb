use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wsk_config::{LoadedConfig, ShopConfig};
use wsk_db::PgGateway;
use wsk_schemas::{ClientId, OrderId, UserId};
use wsk_service::{
    EntryInput, LedgerQuery, Order, OrderInput, OrderService, PaymentPolicy, SweepReport,
};

mod args;

#[derive(Parser)]
#[command(name = "wsk")]
#[command(about = "Workshop orders and ledger CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (defaults -> site -> local...)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Client registry
    Client {
        #[command(subcommand)]
        cmd: ClientCmd,
    },

    /// Repair orders
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },

    /// Manual ledger entries and reports
    Ledger {
        #[command(subcommand)]
        cmd: LedgerCmd,
    },

    /// Audit orders against the ledger. Exits non-zero on drift.
    Reconcile,
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum ClientCmd {
    /// Register a client and print its id.
    Add {
        #[arg(long)]
        name: String,

        /// Any formatting; only digits are kept.
        #[arg(long, default_value = "")]
        phone: String,
    },

    /// List clients by name.
    List {
        /// Part of the name, any case
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum OrderCmd {
    /// Create an order for an existing or a new client.
    Create {
        /// Existing client id
        #[arg(long, conflicts_with = "new_client_name")]
        client: Option<i64>,

        /// Register this client first
        #[arg(long)]
        new_client_name: Option<String>,

        #[arg(long, requires = "new_client_name")]
        new_client_phone: Option<String>,

        /// "<description>:<qty>:<unit price>", repeatable
        #[arg(long = "item", required = true)]
        items: Vec<String>,

        /// YYYY-MM-DD
        #[arg(long)]
        deliver_by: Option<String>,

        /// Record the payment immediately
        #[arg(long, default_value_t = false)]
        paid: bool,

        /// pix | cash | card
        #[arg(long)]
        method: Option<String>,
    },

    /// Mark paid and record the payment entry (idempotent).
    Pay {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        method: Option<String>,
    },

    /// Mark unpaid and remove the payment entry (idempotent).
    Unpay {
        #[arg(long)]
        id: i64,
    },

    /// in_progress -> ready -> delivered
    Advance {
        #[arg(long)]
        id: i64,
    },

    /// Print the total recomputed from items
    Total {
        #[arg(long)]
        id: i64,
    },

    /// Orders, newest first
    List {
        /// in_progress | ready | delivered
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
enum LedgerCmd {
    /// Record a manual revenue or expense
    Record {
        /// revenue | expense
        #[arg(long)]
        kind: String,

        #[arg(long)]
        amount: String,

        #[arg(long)]
        category: String,

        #[arg(long, default_value = "")]
        description: String,

        /// YYYY-MM-DD; defaults to now
        #[arg(long)]
        date: Option<String>,

        /// Owner user id; defaults to shop.owner_user_id
        #[arg(long)]
        owner: Option<i64>,
    },

    /// Revenue, expense and balance over a filtered range
    Summary {
        #[command(flatten)]
        filter: LedgerFilter,
    },

    /// Per-day totals, newest first
    Daily {
        #[command(flatten)]
        filter: LedgerFilter,
    },
}

#[derive(clap::Args)]
struct LedgerFilter {
    /// revenue | expense
    #[arg(long)]
    kind: Option<String>,

    /// Inclusive, YYYY-MM-DD
    #[arg(long)]
    from: Option<String>,

    /// Exclusive, YYYY-MM-DD
    #[arg(long)]
    to: Option<String>,

    #[arg(long)]
    category: Option<String>,
}

impl LedgerFilter {
    fn query(&self) -> Result<LedgerQuery> {
        let mut q = LedgerQuery::all();
        if let Some(k) = &self.kind {
            q = q.kind(args::parse_kind(k)?);
        }
        if self.from.is_some() || self.to.is_some() {
            let from = match &self.from {
                Some(d) => args::start_of_day(args::parse_date(d)?),
                None => chrono::DateTime::<chrono::Utc>::MIN_UTC,
            };
            let to = match &self.to {
                Some(d) => args::start_of_day(args::parse_date(d)?),
                None => chrono::DateTime::<chrono::Utc>::MAX_UTC,
            };
            if from >= to {
                bail!("invalid range: --from must be before --to");
            }
            q = q.between(from, to);
        }
        if let Some(c) = &self.category {
            q = q.category(c.as_str());
        }
        Ok(q)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // dev-time convenience; a missing file is not an error
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    if let Commands::ConfigHash { paths } = &cli.cmd {
        let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
        let loaded = wsk_config::load_layered_yaml(&path_refs)?;
        println!("config_hash={}", loaded.config_hash);
        println!("{}", loaded.canonical_json);
        return Ok(());
    }

    let loaded = load_config(&cli.config_paths)?;
    let cfg = loaded.shop()?;
    init_tracing(&cfg);
    tracing::debug!(config_hash = %loaded.config_hash, "config loaded");

    match cli.cmd {
        Commands::ConfigHash { .. } => {}

        Commands::Db { cmd } => {
            let gw = connect(&cfg).await?;
            match cmd {
                DbCmd::Status => {
                    let s = gw.status().await?;
                    println!("db_ok={} has_orders_table={}", s.ok, s.has_orders_table);
                }
                DbCmd::Migrate => {
                    gw.migrate().await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Client { cmd } => {
            let svc = open_service(&cfg).await?;
            match cmd {
                ClientCmd::Add { name, phone } => {
                    let c = svc.create_client(&name, &phone).await?;
                    println!("client_id={}", c.id);
                    println!("name={}", c.name);
                    println!("phone={}", c.phone);
                }
                ClientCmd::List { name } => {
                    let clients = svc.list_clients(name.as_deref()).await?;
                    for c in &clients {
                        println!("client_id={} name={} phone={}", c.id, c.name, c.phone);
                    }
                    println!("count={}", clients.len());
                }
            }
        }

        Commands::Order { cmd } => {
            match cmd {
                OrderCmd::Create {
                    client,
                    new_client_name,
                    new_client_phone,
                    items,
                    deliver_by,
                    paid,
                    method,
                } => {
                    // parse everything before writing anything
                    let items = items
                        .iter()
                        .map(|s| args::parse_item_spec(s))
                        .collect::<Result<Vec<_>>>()?;
                    let deliver_by = deliver_by.as_deref().map(args::parse_date).transpose()?;
                    let payment_method = method.as_deref().map(args::parse_method).transpose()?;

                    let svc = open_service(&cfg).await?;
                    let client_id = match (client, new_client_name) {
                        (Some(id), _) => ClientId(id),
                        (None, Some(name)) => {
                            let phone = new_client_phone.unwrap_or_default();
                            let c = svc.create_client(&name, &phone).await?;
                            println!("client_id={}", c.id);
                            c.id
                        }
                        (None, None) => bail!("one of --client or --new-client-name is required"),
                    };

                    let order = svc
                        .create_order(OrderInput {
                            client_id: Some(client_id),
                            items,
                            deliver_by,
                            paid,
                            payment_method,
                        })
                        .await?;
                    print_order(&order);
                }

                OrderCmd::Pay { id, method } => {
                    let method = method.as_deref().map(args::parse_method).transpose()?;
                    let svc = open_service(&cfg).await?;
                    let outcome = svc.set_order_paid(OrderId(id), true, method).await?;
                    println!("order_id={} paid=true outcome={}", id, outcome.as_str());
                }

                OrderCmd::Unpay { id } => {
                    let svc = open_service(&cfg).await?;
                    let outcome = svc.set_order_paid(OrderId(id), false, None).await?;
                    println!("order_id={} paid=false outcome={}", id, outcome.as_str());
                }

                OrderCmd::Advance { id } => {
                    let svc = open_service(&cfg).await?;
                    let order = svc.advance_status(OrderId(id)).await?;
                    println!("order_id={} status={}", order.id, order.status);
                }

                OrderCmd::Total { id } => {
                    let svc = open_service(&cfg).await?;
                    let total = svc.order_total(OrderId(id)).await?;
                    println!("order_id={} total={}", id, total);
                }

                OrderCmd::List { status } => {
                    let status = status.as_deref().map(args::parse_status).transpose()?;
                    let svc = open_service(&cfg).await?;
                    let orders = svc.list_orders(status).await;
                    for o in &orders {
                        println!(
                            "order_id={} client_id={} status={} paid={} total={} created_at={} deliver_by={}",
                            o.id,
                            o.client_id,
                            o.status,
                            o.paid,
                            o.total,
                            o.created_at.to_rfc3339(),
                            opt_date(o.deliver_by),
                        );
                    }
                    println!("count={}", orders.len());
                }
            }
        }

        Commands::Ledger { cmd } => {
            match cmd {
                LedgerCmd::Record {
                    kind,
                    amount,
                    category,
                    description,
                    date,
                    owner,
                } => {
                    let kind = args::parse_kind(&kind)?;
                    let amount = args::parse_money(&amount, "amount")?;
                    let occurred_at = date
                        .as_deref()
                        .map(args::parse_date)
                        .transpose()?
                        .map(args::midday);
                    let svc = open_service(&cfg).await?;
                    let e = svc
                        .record_entry(EntryInput {
                            kind,
                            amount,
                            category,
                            description,
                            occurred_at,
                            owner: owner.map(UserId),
                        })
                        .await?;
                    println!("entry_id={}", e.id);
                    println!("kind={}", e.kind);
                    println!("amount={}", e.amount);
                    println!("category={}", e.category);
                    println!("occurred_at={}", e.occurred_at.to_rfc3339());
                }

                LedgerCmd::Summary { filter } => {
                    let q = filter.query()?;
                    let svc = open_service(&cfg).await?;
                    let s = svc.ledger_summary(&q).await;
                    println!("revenue={}", s.revenue);
                    println!("expense={}", s.expense);
                    println!("balance={}", s.balance);
                    println!("count={}", s.count);
                }

                LedgerCmd::Daily { filter } => {
                    let q = filter.query()?;
                    let svc = open_service(&cfg).await?;
                    for d in svc.daily_totals(&q).await {
                        println!("day={} revenue={} expense={}", d.day, d.revenue, d.expense);
                    }
                }
            }
        }

        Commands::Reconcile => {
            let svc = open_service(&cfg).await?;
            let report = svc.reconcile_sweep().await;
            print_sweep(&report)?;
            if !report.is_clean() {
                bail!(
                    "RECONCILE_DRIFT: {} discrepancies across {} orders",
                    report.diffs.len(),
                    report.orders_checked
                );
            }
        }
    }

    Ok(())
}

fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        return wsk_config::defaults();
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    wsk_config::load_layered_yaml(&path_refs)
}

/// RUST_LOG wins over `logging.filter`. Logs go to stderr so stdout stays
/// parseable.
fn init_tracing(cfg: &ShopConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn connect(cfg: &ShopConfig) -> Result<PgGateway> {
    PgGateway::connect_from_env(&cfg.database.url_env, cfg.database.max_connections).await
}

async fn open_service(cfg: &ShopConfig) -> Result<OrderService<PgGateway>> {
    let gw = connect(cfg).await?;
    let policy = PaymentPolicy {
        revenue_category: cfg.ledger.revenue_category.clone(),
        owner: UserId(cfg.shop.owner_user_id),
    };
    OrderService::open(gw, policy)
        .await
        .context("failed to load orders and ledger")
}

fn print_order(o: &Order) {
    println!("order_id={}", o.id);
    println!("client_id={}", o.client_id);
    println!("status={}", o.status);
    println!("paid={}", o.paid);
    println!("total={}", o.total);
    println!("deliver_by={}", opt_date(o.deliver_by));
    for item in &o.items {
        println!(
            "item_id={} description={:?} quantity={} unit_price={} total={}",
            item.id, item.description, item.quantity, item.unit_price, item.total
        );
    }
}

fn print_sweep(report: &SweepReport) -> Result<()> {
    println!("orders_checked={}", report.orders_checked);
    println!("clean={}", report.is_clean());
    for diff in &report.diffs {
        println!("diff={}", serde_json::to_string(diff)?);
    }
    Ok(())
}

fn opt_date(d: Option<chrono::NaiveDate>) -> String {
    d.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}
