//! `pubflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`           start the API server, with the duration scheduler
//!                     running alongside unless `--no-scheduler` is given.
//! - `scheduler`       run only the duration scheduler.
//! - `migrate`         apply pending database migrations.
//! - `describe-rule`   print the human-readable phrase for a rule.
//! - `validate-config` check an action config file against its kind's schema.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use actions::http_client::ReqwestClient;
use actions::services::{LogNotifier, UnconfiguredExporter};
use actions::Integrations;
use db::{MemoryStore, PgStore, Store};
use engine::{EngineConfig, SystemClock, WorkflowEngine};
use scheduler::{DurationWatcher, SchedulerConfig};

#[derive(Parser)]
#[command(
    name = "pubflow",
    about = "Stage-based publishing workflows with rule-triggered actions",
    version
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "PUBFLOW_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Do not run the duration scheduler in this process.
        #[arg(long)]
        no_scheduler: bool,

        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Run the duration scheduler on its own.
    Scheduler {
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Print how a rule reads, e.g. "a pub stays in this stage for 3 days".
    DescribeRule {
        /// Event name, e.g. `pubInStageForDuration`.
        event: String,
        /// Rule config as inline JSON.
        #[arg(long)]
        config: Option<String>,
    },
    /// Validate an action config JSON file against its kind's schema.
    ValidateConfig {
        /// Action kind, e.g. `email`.
        kind: String,
        /// Path to the config JSON file.
        path: PathBuf,
    },
}

#[derive(Args)]
struct RuntimeArgs {
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Keep everything in memory instead of Postgres. Takes precedence over
    /// `--database-url`.
    #[arg(long)]
    memory: bool,

    #[arg(long, env = "PUBFLOW_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    #[arg(long, env = "PUBFLOW_ACTION_TIMEOUT_SECS", default_value_t = 30)]
    action_timeout_secs: u64,

    #[arg(long, env = "PUBFLOW_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, env = "PUBFLOW_SCHEDULER_INTERVAL_SECS", default_value_t = 60)]
    scheduler_interval_secs: u64,

    #[arg(long, env = "PUBFLOW_SCHEDULER_CONCURRENCY", default_value_t = 8)]
    scheduler_concurrency: usize,
}

impl RuntimeArgs {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            action_timeout: Duration::from_secs(self.action_timeout_secs),
            max_attempts: self.max_attempts,
            ..EngineConfig::default()
        }
    }

    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.scheduler_interval_secs),
            max_concurrency: self.scheduler_concurrency,
        }
    }

    async fn store(&self) -> Result<Arc<dyn Store>> {
        if self.memory {
            warn!("using the in-memory store; nothing will persist");
            return Ok(Arc::new(MemoryStore::new()));
        }
        let Some(url) = &self.database_url else {
            bail!("no database configured: pass --database-url, set DATABASE_URL, or use --memory");
        };
        let pool = db::pool::create_pool(url, self.max_connections, Duration::from_secs(5))
            .await
            .context("failed to connect to database")?;
        Ok(Arc::new(PgStore::new(pool)))
    }

    async fn engine(&self) -> Result<Arc<WorkflowEngine>> {
        let config = self.engine_config();
        let http = ReqwestClient::new(config.action_timeout).context("failed to build HTTP client")?;
        let integrations = Integrations {
            notifier: Arc::new(LogNotifier),
            http: Arc::new(http),
            exporter: Arc::new(UnconfiguredExporter),
        };
        Ok(WorkflowEngine::new(
            self.store().await?,
            Arc::new(SystemClock),
            integrations,
            config,
        ))
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// A shutdown signal that any number of tasks can wait on.
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        let _ = tx.send(true);
    });
    rx
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Serve { bind, no_scheduler, runtime } => {
            let engine = runtime.engine().await?;
            let shutdown = shutdown_channel();

            let scheduler = (!no_scheduler).then(|| {
                let watcher = DurationWatcher::new(engine.clone(), runtime.scheduler_config());
                let rx = shutdown.clone();
                tokio::spawn(async move { watcher.run(stopped(rx)).await })
            });

            api::serve(bind, api::AppState { engine }, stopped(shutdown))
                .await
                .context("api server failed")?;

            if let Some(handle) = scheduler {
                handle.await.context("scheduler task panicked")?;
            }
        }
        Command::Scheduler { runtime } => {
            let engine = runtime.engine().await?;
            let watcher = DurationWatcher::new(engine, runtime.scheduler_config());
            watcher.run(stopped(shutdown_channel())).await;
        }
        Command::Migrate { database_url } => {
            let pool = db::pool::create_pool(&database_url, 2, Duration::from_secs(5))
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool)
                .await
                .context("migration failed")?;
            info!("migrations applied");
        }
        Command::DescribeRule { event, config } => {
            let event: engine::Event = event.parse()?;
            let config = config
                .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
                .transpose()
                .context("--config is not valid JSON")?;
            println!("{}", event.render(config.as_ref()));
        }
        Command::ValidateConfig { kind, path } => {
            let kind: actions::ActionKind = kind.parse()?;
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            let config: serde_json::Value =
                serde_json::from_str(&content).context("config is not valid JSON")?;

            let schema = &kind.descriptor().config_schema;
            let result = schemas::validate(schema, &schemas::apply_defaults(schema, &config))?;
            if result.is_valid() {
                println!("✅ {kind} config is valid");
            } else {
                for issue in &result.issues {
                    eprintln!("❌ {}", issue.message);
                }
                bail!("{} issue(s) in {}", result.issues.len(), path.display());
            }
        }
    }

    Ok(())
}
