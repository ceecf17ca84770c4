//! Interrupt engine CLI
//!
//! Operates the interrupt subsystem against the SQLite store: apply
//! migrations, register interrupts, run monitor sweeps and close interrupts
//! of finished plans.

use anyhow::Context;
use clap::{Parser, Subcommand};
use interrupt_engine::config::LoggingConfig;
use interrupt_engine::{
    BroadcastCompletionPublisher, ConfigLoader, Database, InMemoryWaitNotifyEngine,
    InterruptConfig, InterruptEngine, InterruptEngineConfig, InterruptPackage, InterruptServices,
    InterruptType, IssuerMetadata, LoggingExecutorClient, SqliteInterruptRepository, SqliteLocker,
    SqliteNodeExecutionService, SqlitePlanExecutionService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "interrupt-engine")]
#[command(about = "Interrupt and abort propagation for pipeline executions", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to a TOML config file (default: ./interrupt-engine.toml if present)
    #[arg(short, long, env = "INTERRUPT_ENGINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,

    /// Register an interrupt against a plan execution
    Register {
        /// Plan execution ID
        #[arg(short, long)]
        plan: String,
        /// Interrupt type: ABORT_ALL, ABORT, EXPIRE_ALL, MARK_EXPIRED, PAUSE_ALL, RESUME_ALL, RETRY
        #[arg(short = 't', long = "type")]
        interrupt_type: InterruptType,
        /// Target node execution ID for node-scoped types
        #[arg(short, long)]
        node: Option<String>,
        /// Identifier of the user issuing the interrupt
        #[arg(short, long)]
        issuer: Option<String>,
    },

    /// Run monitor passes for active ABORT_ALL / EXPIRE_ALL interrupts
    Sweep {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Close every active interrupt of a finished plan
    End {
        /// Plan execution ID
        #[arg(short, long)]
        plan: String,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match logging.format.as_str() {
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}

async fn load_config(path: Option<PathBuf>) -> anyhow::Result<InterruptEngineConfig> {
    let loader = match path {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    loader.load().await.context("Failed to load configuration")
}

async fn build_engine(config: InterruptEngineConfig) -> anyhow::Result<InterruptEngine> {
    let db = Arc::new(
        Database::initialize(&config.database.path, config.database.max_connections)
            .await
            .context("Failed to open database")?,
    );

    let locker = Arc::new(SqliteLocker::new(
        db.clone(),
        config.lock.lease_ttl(),
        config.lock.poll_interval(),
    ));
    let services = InterruptServices::new(
        Arc::new(SqlitePlanExecutionService::new(db.clone())),
        Arc::new(SqliteNodeExecutionService::new(db.clone())),
        Arc::new(SqliteInterruptRepository::new(db)),
        Arc::new(LoggingExecutorClient),
        Arc::new(BroadcastCompletionPublisher::default()),
        Arc::new(InMemoryWaitNotifyEngine::with_parked_ttl(
            config.expiry.parked_ttl(),
        )),
        config,
    );

    Ok(InterruptEngine::new(services, locker))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config).await?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Migrate => {
            let db = Database::initialize(&config.database.path, config.database.max_connections)
                .await
                .context("Failed to migrate database")?;
            db.close().await;
            println!("Database ready at {}", config.database.path);
        }

        Commands::Register {
            plan,
            interrupt_type,
            node,
            issuer,
        } => {
            let engine = build_engine(config).await?;

            let issued_by = match issuer {
                Some(identifier) => IssuerMetadata::Manual {
                    identifier,
                    email: None,
                },
                None => IssuerMetadata::System,
            };
            let mut package = InterruptPackage::new(plan, interrupt_type)
                .with_config(InterruptConfig::new(issued_by));
            if let Some(node) = node {
                package = package.with_target_node(node);
            }

            let interrupt = engine.manager().register(package).await?;
            if interrupt.interrupt_type == InterruptType::MarkExpired && interrupt.is_active() {
                tracing::warn!(
                    interrupt_id = %interrupt.id,
                    "Expiry callback lives in this process only; the sweeper will not complete it"
                );
            }
            println!("{}", serde_json::to_string_pretty(&interrupt)?);
            engine.shutdown().await;
        }

        Commands::Sweep { once } => {
            let engine = build_engine(config).await?;

            if once {
                let reports = engine.sweeper().sweep_once().await?;
                for report in &reports {
                    println!(
                        "{}: {:?} (escalated {}, finished {}, waiting {}, in flight {})",
                        report.interrupt_id,
                        report.outcome,
                        report.escalated.len(),
                        report.finished.len(),
                        report.waiting.len(),
                        report.in_flight.len()
                    );
                }
            } else {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Received Ctrl-C, stopping sweeper");
                    }
                    let _ = shutdown_tx.send(true);
                });
                engine.sweeper().run(shutdown_rx).await;
            }
            engine.shutdown().await;
        }

        Commands::End { plan } => {
            let engine = build_engine(config).await?;
            let closed = engine.end_handler().close_now(&plan).await?;
            println!("Closed {} active interrupt(s) for plan {}", closed, plan);
            engine.shutdown().await;
        }
    }

    Ok(())
}
