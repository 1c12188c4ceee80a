//! pip-stats - author productivity percentile service
//!
//! Subcommands:
//! - `serve`: HTTP API (optionally with an embedded queue worker)
//! - `stats <author_id>`: print one author's statistics
//! - `refresh`: schedule author fetches and print the report
//! - `work`: drain the local refresh queue

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pip_common::config::{self, ConfigOrigin, TomlConfig};
use pip_stats::orchestrator::RefreshRequest;
use pip_stats::scoring::{PercentileTable, ScoringEngine};
use pip_stats::services::HttpSourceProvider;
use pip_stats::{AppState, Components};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pip-stats
#[derive(Parser, Debug)]
#[command(name = "pip-stats")]
#[command(about = "Productivity percentile scoring and refresh service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and reference tables
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "PIP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Bind address (overrides `[server] bind`)
        #[arg(short, long, env = "PIP_BIND")]
        bind: Option<String>,

        /// Also run the queue worker in this process
        #[arg(long)]
        with_worker: bool,
    },

    /// Print statistics for one author
    Stats { author_id: String },

    /// Schedule author refreshes
    Refresh {
        /// Author ids; when omitted the least recently updated authors are used
        author_ids: Vec<String>,

        /// Number of authors to pick when no ids are given
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Also schedule a sample of coauthors not yet stored
        #[arg(long)]
        include_new_coauthors: bool,
    },

    /// Process queued refresh tasks
    Work {
        /// Exit once the queue is empty
        #[arg(long)]
        once: bool,

        /// Maximum number of tasks to process with `--once`
        #[arg(long)]
        limit: Option<usize>,

        /// Idle poll interval in seconds
        #[arg(long, default_value = "5")]
        poll_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging starts; its outcome is logged afterwards
    let config_path = args.config.clone().or_else(config::default_config_path);
    let (toml_config, origin) = match config_path.as_deref() {
        Some(path) => {
            let (config, origin) = config::load_or_create_toml_config(path);
            (config, Some(origin))
        }
        None => (TomlConfig::default(), None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pip_stats={0},pip_common={0},tower_http=info", toml_config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("pip-stats {}", env!("CARGO_PKG_VERSION"));
    match (&config_path, &origin) {
        (Some(path), Some(ConfigOrigin::Loaded)) => info!("Loaded configuration from {}", path.display()),
        (Some(path), Some(ConfigOrigin::Created)) => info!("Wrote default configuration to {}", path.display()),
        (_, Some(ConfigOrigin::Defaults(e))) => warn!("{}; using compiled defaults", e),
        _ => info!("No configuration file; using compiled defaults"),
    }

    let resolver = config::RootFolderResolver::new(args.root_folder.clone(), &toml_config);
    let initializer = config::RootFolderInitializer::new(resolver.resolve());
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root().display());

    let db_path = initializer.database_path();
    let pool = pip_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let engine = Arc::new(load_engine(initializer.root(), &toml_config));
    let components = Components::new(pool, &toml_config, engine);

    match args.command {
        Command::Serve { bind, with_worker } => {
            let bind = bind.unwrap_or_else(|| toml_config.server.bind.clone());
            serve(&components, &toml_config, &bind, with_worker).await
        }
        Command::Stats { author_id } => {
            let response = components.orchestrator.get_author_stats(&author_id).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::Refresh {
            author_ids,
            count,
            include_new_coauthors,
        } => {
            let request = RefreshRequest {
                author_ids,
                count,
                include_new_coauthors,
            };
            let report = components.orchestrator.refresh(&request).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Work {
            once,
            limit,
            poll_secs,
        } => {
            let source = HttpSourceProvider::new(&toml_config.queue).context("Failed to build source client")?;
            let worker = components.worker(Arc::new(source));
            if once {
                let summary = worker.drain(limit).await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(())
            } else {
                let (tx, rx) = watch::channel(false);
                tokio::spawn(async move {
                    shutdown_signal().await;
                    let _ = tx.send(true);
                });
                worker.run(Duration::from_secs(poll_secs), rx).await
            }
        }
    }
}

/// Load the reference tables; a missing or malformed table degrades to empty
fn load_engine(root: &Path, config: &TomlConfig) -> ScoringEngine {
    let load = |name: &str, table: &Path| {
        let path = config.tables.resolve(root, table);
        match PercentileTable::from_csv_path(&path) {
            Ok(table) => {
                info!(table = name, rows = table.len(), "Loaded {}", path.display());
                table
            }
            Err(e) => {
                warn!(table = name, error = %e, "Could not load {}; scores depending on it are unavailable", path.display());
                PercentileTable::default()
            }
        }
    };

    ScoringEngine::new(
        load("citations", &config.tables.citations),
        load("productivity", &config.tables.productivity),
        load("pip_auc", &config.tables.pip_auc),
    )
}

async fn serve(components: &Components, config: &TomlConfig, bind: &str, with_worker: bool) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = if with_worker {
        let source = HttpSourceProvider::new(&config.queue).context("Failed to build source client")?;
        let worker = components.worker(Arc::new(source));
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { worker.run(Duration::from_secs(5), rx).await }))
    } else {
        None
    };

    let app = pip_stats::build_router(AppState::new(components.orchestrator.clone()));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("Server error")?;

    if let Some(handle) = worker_handle {
        handle.await.context("Worker task panicked")??;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
