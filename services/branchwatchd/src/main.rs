use std::{fs, future::Future, net::SocketAddr, path::Path, path::PathBuf, time::Duration};

use anyhow::{bail, Context};
use clap::Parser;
use metrics::MetricsHandle;
use notify::{Delivery, DeliveryError, DiscordWebhook, LogDelivery, Message};
use snapshot::Snapshot;
use storage::{init_sqlite, JsonFileStore, RunRecord, SnapshotStore, SqliteStore, StoreError};
use tokio::task;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn, Level};
use venue_steam::{SteamClient, SteamConfig, DEFAULT_INFO_API, DEFAULT_STORE_API};
use watcher::{RunReport, Watcher};


const MEMORY_PREFIX: &str = "sqlite::memory:";
const URL_PREFIX: &str = "sqlite://";

#[derive(Parser, Debug)]
#[command(about = "Posts Steam branch and price changes to a Discord webhook")]
struct Args {
    #[arg(long, env = "APP_ID")]
    app_id: u32,

    #[arg(long, env = "DISCORD_WEBHOOK_URL", required_unless_present = "dry_run")]
    webhook_url: Option<String>,

    #[arg(long, env = "STATE_DIR", default_value = ".")]
    state_dir: PathBuf,

    #[arg(long, env = "SQLITE_PATH")]
    sqlite_path: Option<String>,

    #[arg(long, env = "STEAM_COUNTRY", default_value = "us")]
    country_code: String,

    #[arg(long, env = "STEAM_INFO_API", default_value = DEFAULT_INFO_API)]
    info_api_url: String,

    #[arg(long, env = "STEAM_STORE_API", default_value = DEFAULT_STORE_API)]
    store_api_url: String,

    /// Repeat the run every N seconds instead of exiting after one.
    #[arg(long, env = "POLL_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Log payloads instead of posting them.
    #[arg(long)]
    dry_run: bool,
}

enum StateStore {
    Json(JsonFileStore),
    Sqlite(SqliteStore),
}

impl SnapshotStore for StateStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        match self {
            StateStore::Json(store) => store.load().await,
            StateStore::Sqlite(store) => store.load().await,
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        match self {
            StateStore::Json(store) => store.save(snapshot).await,
            StateStore::Sqlite(store) => store.save(snapshot).await,
        }
    }

    async fn record_run(&self, record: &RunRecord) -> Result<(), StoreError> {
        match self {
            StateStore::Json(store) => store.record_run(record).await,
            StateStore::Sqlite(store) => store.record_run(record).await,
        }
    }
}

enum Outbox {
    Webhook(DiscordWebhook),
    DryRun(LogDelivery),
}

impl Delivery for Outbox {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        match self {
            Outbox::Webhook(hook) => hook.deliver(message).await,
            Outbox::DryRun(log) => log.deliver(message).await,
        }
    }
}

fn log_startup(args: &Args) {
    info!(app_id = args.app_id, "tracking app");
    match &args.sqlite_path {
        Some(path) => info!(%path, "sqlite state store configured"),
        None => info!(dir = %args.state_dir.display(), "json state store configured"),
    }
    info!(
        info_api = %args.info_api_url,
        store_api = %args.store_api_url,
        country = %args.country_code,
        "steam endpoints configured"
    );
    if args.dry_run {
        info!("dry run, messages will be logged only");
    } else {
        info!(webhook = args.webhook_url.is_some(), "webhook delivery configured");
    }
    match args.interval_secs {
        Some(secs) => info!(interval_secs = secs, "polling mode"),
        None => info!("single run mode"),
    }
}

fn ensure_sqlite_parent_dir(path: &str) -> anyhow::Result<()> {
    if path.starts_with(MEMORY_PREFIX) {
        return Ok(());
    }

    if let Some(rest) = path.strip_prefix(URL_PREFIX) {
        let path_part = rest.split_once('?').map(|(path, _)| path).unwrap_or(rest);
        if let Some(parent) = Path::new(path_part).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
    }

    Ok(())
}

fn validate_sqlite_path(path: &str) -> anyhow::Result<()> {
    if path.starts_with(MEMORY_PREFIX) {
        return Ok(());
    }

    let Some(rest) = path.strip_prefix(URL_PREFIX) else {
        bail!("sqlite path must start with `sqlite://` or use `sqlite::memory:`");
    };

    let (path_part, _) = rest.split_once('?').unwrap_or((rest, ""));
    if path_part.is_empty() {
        bail!("sqlite path is missing a filesystem component after `sqlite://`");
    }

    Ok(())
}

async fn open_store(args: &Args) -> anyhow::Result<StateStore> {
    match &args.sqlite_path {
        Some(path) => {
            validate_sqlite_path(path)?;
            ensure_sqlite_parent_dir(path)?;
            Ok(StateStore::Sqlite(init_sqlite(path).await?))
        }
        None => Ok(StateStore::Json(JsonFileStore::new(&args.state_dir))),
    }
}

fn open_outbox(args: &Args) -> anyhow::Result<Outbox> {
    if args.dry_run {
        return Ok(Outbox::DryRun(LogDelivery));
    }
    let url = args
        .webhook_url
        .as_deref()
        .context("a webhook url is required unless --dry-run is set")?;
    Ok(Outbox::Webhook(DiscordWebhook::new(url)?))
}

fn observe(metrics: &MetricsHandle, outcome: &anyhow::Result<RunReport>) {
    match outcome {
        Ok(report) => metrics.record_run(
            report.changes.new_branches.len(),
            report.changes.updated_branches.len(),
            report.changes.deleted_branches.len(),
            report.changes.price_change.map(|e| e.kind()),
            report.messages_sent,
            report.delivery_failures,
        ),
        Err(err) => {
            error!(error = ?err, "run failed");
            metrics.record_failure();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    log_startup(&args);

    let store = open_store(&args).await?;
    let outbox = open_outbox(&args)?;
    let source = SteamClient::new(SteamConfig {
        info_api: args.info_api_url.clone(),
        store_api: args.store_api_url.clone(),
        country: args.country_code.clone(),
    })?;
    let watcher = Watcher::new(args.app_id, source, store, outbox);

    let metrics = MetricsHandle::new()?;
    if let Some(addr) = args.metrics_addr {
        let exporter = metrics.clone();
        task::spawn(async move {
            if let Err(err) = exporter.serve(addr).await {
                error!(error = ?err, "metrics server error");
            }
        });
    }

    let Some(secs) = args.interval_secs else {
        let outcome = watcher.run_once().await;
        observe(&metrics, &outcome);
        return outcome.map(|_| ());
    };

    let watcher = &watcher;
    let metrics = &metrics;
    let runs = poll_until(
        Duration::from_secs(secs.max(1)),
        tokio::signal::ctrl_c(),
        move || async move {
            let outcome = watcher.run_once().await;
            observe(metrics, &outcome);
        },
    )
    .await;
    info!(runs, "shutdown requested");
    Ok(())
}

/// Starts `run` on every tick until `shutdown` resolves. Shutdown also
/// cuts short a run that is still in flight. Returns how many runs started.
async fn poll_until<R, Fut, S>(period: Duration, shutdown: S, mut run: R) -> usize
where
    R: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future,
{
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut started = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => return started,
            _ = ticker.tick() => {}
        }
        started += 1;
        tokio::select! {
            _ = &mut shutdown => {
                warn!(run = started, "run abandoned on shutdown");
                return started;
            }
            () = run() => {}
        }
    }
}
