use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use ferry_core::app::{Backoff, Operations, PublisherBuilder, PublisherConfig, PublisherHandle};
use ferry_core::domain::{InstanceId, NewOutboxEntry};
use ferry_core::impls::{DestinationMap, InMemoryLockStore, InMemoryOutboxStore, InMemorySink, Route, WebhookSink};
use ferry_core::ports::{IdGenerator, OutboxStore, SystemClock, UlidGenerator};
use ferry_pg::{PgLockStore, PgOutboxStore};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "ferry",
    version,
    about = "Transactional outbox publisher",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// PostgreSQL connection string. Without it the worker runs on in-memory
    /// stores (development only).
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "FERRY_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the publisher and the operational HTTP surface (default).
    Run(RunArgs),
    /// Create the outbox and lock tables.
    Migrate,
    /// Insert one PENDING entry (smoke testing).
    Enqueue(EnqueueArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, env = "FERRY_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Lock owner identity; a fresh one is generated when omitted.
    #[arg(long, env = "FERRY_INSTANCE_ID")]
    instance_id: Option<InstanceId>,

    /// Webhook route `name=url`; repeatable. Without any, deliveries go to an
    /// in-memory queue.
    #[arg(long = "destination", env = "FERRY_DESTINATIONS", value_delimiter = ',')]
    destinations: Vec<Route>,

    // overrides for the FERRY_* environment settings
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    max_retries: Option<u32>,
    #[arg(long)]
    lock_hold_ms: Option<u64>,
    #[arg(long)]
    lock_name: Option<String>,
    #[arg(long)]
    send_timeout_ms: Option<u64>,
    #[arg(long)]
    delivery_concurrency: Option<usize>,
    #[arg(long)]
    shutdown_deadline_ms: Option<u64>,
    #[arg(long)]
    backoff_base_ms: Option<u64>,
}

impl RunArgs {
    fn apply(&self, config: &mut PublisherConfig) {
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(n) = self.max_retries {
            config.max_retries = n;
        }
        if let Some(ms) = self.lock_hold_ms {
            config.lock_hold = Duration::from_millis(ms);
        }
        if let Some(name) = &self.lock_name {
            config.lock_name = name.clone();
        }
        if let Some(ms) = self.send_timeout_ms {
            config.send_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = self.delivery_concurrency {
            config.delivery_concurrency = n;
        }
        if let Some(ms) = self.shutdown_deadline_ms {
            config.shutdown_deadline = Duration::from_millis(ms);
        }
        if let Some(ms) = self.backoff_base_ms {
            config.backoff = Some(Backoff::with_base(Duration::from_millis(ms)));
        }
    }
}

#[derive(Debug, Args)]
struct EnqueueArgs {
    #[arg(long)]
    destination: String,

    /// Raw payload, usually JSON.
    #[arg(long)]
    payload: String,

    #[arg(long, default_value = "")]
    aggregate_type: String,
    #[arg(long, default_value = "")]
    aggregate_id: String,
    #[arg(long, default_value = "")]
    event_type: String,
    #[arg(long)]
    max_retries: Option<u32>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        fmt.json().init();
    } else {
        fmt.init();
    }
}

async fn connect(url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await
        .context("connecting to database")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => error!(error = %e, "cannot listen for ctrl-c, shutting down"),
    }
}

async fn run(database_url: Option<&str>, args: RunArgs) -> anyhow::Result<()> {
    let mut config = PublisherConfig::from_env()?;
    args.apply(&mut config);

    let ids = UlidGenerator::new(SystemClock);
    let instance = args.instance_id.unwrap_or_else(|| ids.generate_instance_id());
    let mut builder = PublisherBuilder::new().config(config.clone()).instance(instance);

    builder = match database_url {
        Some(url) => {
            let pool = connect(url).await?;
            ferry_pg::migrate(&pool).await.context("creating schema")?;
            builder
                .store(Arc::new(
                    PgOutboxStore::new(pool.clone()).with_default_max_retries(config.max_retries),
                ))
                .lock_store(Arc::new(PgLockStore::new(pool)))
        }
        None => {
            warn!("no DATABASE_URL, running on in-memory stores");
            builder
                .store(Arc::new(
                    InMemoryOutboxStore::new().with_default_max_retries(config.max_retries),
                ))
                .lock_store(Arc::new(InMemoryLockStore::new()))
        }
    };

    builder = if args.destinations.is_empty() {
        warn!("no destinations configured, deliveries stay in process");
        builder.sink(Arc::new(InMemorySink::new()))
    } else {
        let routes: DestinationMap = args.destinations.into_iter().collect();
        info!(routes = routes.len(), "webhook sink configured");
        builder.sink(Arc::new(WebhookSink::new(routes, config.send_timeout)?))
    };

    let publisher = Arc::new(builder.build_loop()?);
    let ops = Operations::new(Arc::clone(&publisher));
    let handle = PublisherHandle::spawn(publisher);

    let listen = args.listen;
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!(addr = %listen, instance = %instance, "ferry started");

    let served = ferry_core::http::serve(ops, listener, shutdown_signal()).await;
    handle.shutdown(config.shutdown_deadline).await;
    served.context("http server")?;

    info!("ferry stopped");
    Ok(())
}

async fn enqueue(database_url: Option<&str>, args: EnqueueArgs) -> anyhow::Result<()> {
    let Some(url) = database_url else {
        bail!("enqueue needs --database-url");
    };
    let pool = connect(url).await?;
    let config = PublisherConfig::from_env()?;
    let store = PgOutboxStore::new(pool).with_default_max_retries(config.max_retries);

    let ids = UlidGenerator::new(SystemClock);
    let mut entry = NewOutboxEntry::new(ids.generate_entry_id(), args.destination, args.payload.into_bytes())
        .aggregate(args.aggregate_type, args.aggregate_id)
        .event_type(args.event_type);
    if let Some(n) = args.max_retries {
        entry = entry.max_retries(n);
    }

    let row = store.insert(entry).await?;
    println!(
        "{}",
        serde_json::json!({
            "id": row.id,
            "destination": row.destination,
            "status": row.status,
            "max_retries": row.max_retries,
        })
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let database_url = cli.database_url.as_deref();
    match cli.command.unwrap_or(Command::Run(cli.run)) {
        Command::Run(args) => run(database_url, args).await,
        Command::Migrate => {
            let Some(url) = database_url else {
                bail!("migrate needs --database-url");
            };
            ferry_pg::migrate(&connect(url).await?).await?;
            Ok(())
        }
        Command::Enqueue(args) => enqueue(database_url, args).await,
    }
}
