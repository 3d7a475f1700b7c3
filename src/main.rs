use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use lethe::{
    Engine,
    clock::SystemClock,
    config::EngineConfig,
    db::DbPool,
    jobs::start_job_executor_worker,
    observability,
    routes::{AppState, build_app},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

#[derive(Parser, Debug)]
#[command(version, about = "Lethe history cleanup engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./lethe.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP API and the job executor (default)
    Serve,
    /// Schedule an immediate history cleanup and run due jobs until none remain
    Cleanup,
    /// Run database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config_path = resolve_config_path(args.config.as_deref());
    let config = load_config(&config_path);

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    match args.command {
        Some(Command::Migrate) => run_migrate(&config).await,
        Some(Command::Cleanup) => run_cleanup(config).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn resolve_config_path(explicit_path: Option<&str>) -> PathBuf {
    explicit_path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("lethe.toml"))
}

fn load_config(path: &Path) -> EngineConfig {
    match EngineConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn exit_with(message: &str, error: impl std::fmt::Display) -> ! {
    tracing::error!(error = %error, "{}", message);
    eprintln!("Error: {}: {}", message, error);
    std::process::exit(1);
}

/// Connect to the database and apply pending migrations when configured to.
async fn connect(config: &EngineConfig) -> Arc<DbPool> {
    if config.database.is_none() {
        exit_with("Database is not configured", "add a [database] section");
    }
    let pool = match DbPool::from_config(&config.database).await {
        Ok(pool) => pool,
        Err(e) => exit_with("Failed to connect to database", e),
    };
    if config.database.run_migrations()
        && let Err(e) = pool.run_migrations().await
    {
        exit_with("Database migrations failed", e);
    }
    Arc::new(pool)
}

async fn build_engine(config: EngineConfig) -> Engine {
    let db = connect(&config).await;
    match Engine::new(config, db, Arc::new(SystemClock)) {
        Ok(engine) => engine,
        Err(e) => exit_with("Failed to start engine", e),
    }
}

async fn run_server(config: EngineConfig) {
    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let job_executor_config = config.job_executor.clone();
    let engine = build_engine(config).await;

    if let Err(e) = engine.bootstrap().await {
        exit_with("Failed to schedule history cleanup", e);
    }

    let task_tracker = TaskTracker::new();
    let shutdown = CancellationToken::new();
    task_tracker.spawn(start_job_executor_worker(
        Arc::clone(engine.executor()),
        job_executor_config,
        shutdown.clone(),
    ));

    let app = build_app(AppState::new(engine));
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => exit_with("Failed to bind to address", e),
    };
    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(task_tracker, shutdown))
        .await
    {
        exit_with("Server error", e);
    }
}

async fn shutdown_signal(task_tracker: TaskTracker, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
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

    tracing::info!("Shutdown signal received, waiting for the job executor to finish...");

    shutdown.cancel();
    task_tracker.close();

    let wait_result =
        tokio::time::timeout(std::time::Duration::from_secs(30), task_tracker.wait()).await;

    match wait_result {
        Ok(()) => tracing::info!("All background tasks completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for background tasks, some may not have completed")
        }
    }

    tracing::info!("Shutdown complete");
}

/// Run history cleanup once, outside any batch window.
async fn run_cleanup(config: EngineConfig) {
    let engine = build_engine(config).await;

    if let Err(e) = engine.history().clean_up_history_async(true).await {
        exit_with("Failed to schedule history cleanup", e);
    }
    match engine.executor().run_due_jobs().await {
        Ok(executed) => {
            tracing::info!(executed, "History cleanup finished");
        }
        Err(e) => exit_with("History cleanup failed", e),
    }
}

async fn run_migrate(config: &EngineConfig) {
    tracing::info!("Running database migrations");

    if config.database.is_none() {
        exit_with("Database is not configured", "nothing to migrate");
    }
    let pool = match DbPool::from_config(&config.database).await {
        Ok(pool) => pool,
        Err(e) => exit_with("Failed to connect to database", e),
    };
    match pool.run_migrations().await {
        Ok(()) => tracing::info!("Database migrations completed successfully"),
        Err(e) => exit_with("Database migrations failed", e),
    }
}
