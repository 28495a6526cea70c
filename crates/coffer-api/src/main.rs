//! coffer - file hosting server and maintenance commands

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coffer_api::{router, AppState, ServerConfig};
use coffer_core::defaults;
use coffer_core::{KeyScheme, MetadataStore};
use coffer_db::{blob_store_from_env, Database, PoolConfig};
use coffer_files::{FileService, TransferConfig};
use coffer_jobs::{RetentionSweeper, SweepConfig, SweepScheduler};

#[derive(Parser)]
#[command(name = "coffer")]
#[command(author, version, about = "File hosting with decoupled blob and metadata stores")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server and the periodic retention sweep (default)
    Serve,
    /// Run one retention sweep and exit
    Sweep,
    /// Apply pending database migrations and exit
    Migrate,
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "coffer_api=debug,coffer_files=debug,coffer_db=info,coffer_jobs=info,tower_http=debug"
            .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("coffer.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| defaults::DATABASE_URL.to_string());

    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    let command = cli.command.unwrap_or(Commands::Serve);
    if matches!(command, Commands::Migrate) {
        return Ok(());
    }

    let meta: Arc<dyn MetadataStore> = Arc::new(db.files.clone());
    let blobs = blob_store_from_env().await?;
    let keys = KeyScheme::from_env();
    let sweeper = Arc::new(RetentionSweeper::new(
        blobs.clone(),
        meta.clone(),
        keys.clone(),
        SweepConfig::from_env(),
    ));

    if matches!(command, Commands::Sweep) {
        let report = sweeper.sweep().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let transfer = TransferConfig::from_env();
    info!(
        locator_base = keys.base(),
        multipart_threshold = transfer.multipart_threshold,
        "File service configured"
    );
    let files = Arc::new(FileService::new(blobs, meta, keys, transfer));
    let scheduler = SweepScheduler::new(sweeper.clone()).start();

    let server = ServerConfig::from_env();
    let app = router(
        AppState {
            files: files.clone(),
            sweeper,
        },
        server.max_upload_bytes,
    );

    let addr: SocketAddr = server.bind_addr().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;
    files.shutdown().await?;
    info!("Server stopped");
    Ok(())
}
