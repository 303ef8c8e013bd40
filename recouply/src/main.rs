use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use chrono::Duration;
use clap::{Args, Parser};
use recouply::{AuditLogHandler, EventBus, FailMode, KeyStrategy, LockoutConfig, LoginGuardBuilder};
use recouply_storage_sqlite::SqliteStorage;
use tracing_subscriber::EnvFilter;

/// Command line interface for the Recouply login guard
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(
        long,
        env = "RECOUPLY_DATABASE_URL",
        default_value = "sqlite://recouply.db?mode=rwc"
    )]
    database_url: String,

    /// Log filter directives, overriding RUST_LOG (e.g. "info,recouply::audit=warn")
    #[arg(long)]
    log_filter: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Serve the login attempt endpoints
    Serve(ServeArgs),
    /// Run database migrations
    Migrate,
    /// Print version information
    Version,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "RECOUPLY_LISTEN", default_value = "0.0.0.0:3000")]
    listen: SocketAddr,

    /// Path the attempt endpoints are mounted under
    #[arg(long, env = "RECOUPLY_MOUNT_PATH", default_value = recouply_axum::DEFAULT_MOUNT_PATH)]
    mount_path: String,

    /// Consecutive failures that lock an account
    #[arg(long, env = "RECOUPLY_MAX_FAILED_ATTEMPTS", default_value_t = 5)]
    max_failed_attempts: u32,

    /// How long a lock lasts, in minutes
    #[arg(long, env = "RECOUPLY_LOCKOUT_MINUTES", default_value_t = 15)]
    lockout_minutes: i64,

    /// How far back failures are counted, in minutes
    #[arg(long, env = "RECOUPLY_WINDOW_MINUTES", default_value_t = 15)]
    window_minutes: i64,

    /// What attempts are grouped by: identifier, source_address or composite
    #[arg(long, env = "RECOUPLY_KEY_STRATEGY", default_value_t = KeyStrategy::Identifier)]
    key_strategy: KeyStrategy,

    /// Behaviour of the status check when the store is unreadable: closed or open
    #[arg(long, env = "RECOUPLY_FAIL_MODE", default_value_t = FailMode::Closed)]
    fail_mode: FailMode,

    /// Turn lockout protection off
    #[arg(long, env = "RECOUPLY_DISABLED")]
    disabled: bool,
}

impl ServeArgs {
    fn lockout_config(&self) -> anyhow::Result<LockoutConfig> {
        let lockout_duration = Duration::try_minutes(self.lockout_minutes)
            .with_context(|| format!("lockout minutes out of range: {}", self.lockout_minutes))?;
        let attempt_window = Duration::try_minutes(self.window_minutes)
            .with_context(|| format!("window minutes out of range: {}", self.window_minutes))?;

        let config = LockoutConfig {
            enabled: !self.disabled,
            max_failed_attempts: self.max_failed_attempts,
            lockout_duration,
            attempt_window,
            key_strategy: self.key_strategy,
            fail_mode: self.fail_mode,
        };
        config.validate()?;

        Ok(config)
    }
}

fn init_tracing(log_filter: Option<&str>) {
    let filter = match log_filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(database_url: &str, args: ServeArgs) -> anyhow::Result<()> {
    let event_bus = EventBus::new();
    event_bus.register(Arc::new(AuditLogHandler)).await;

    let guard = LoginGuardBuilder::new()
        .with_lockout_config(args.lockout_config()?)
        .with_event_bus(event_bus)
        .apply_migrations(true)
        .with_sqlite(database_url)
        .await?
        .build()
        .await?;

    let app = guard.routes().with_mount_path(args.mount_path).build();

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;

    tracing::info!(address = %listener.local_addr()?, "Login guard listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref());

    match cli.command {
        Commands::Serve(args) => serve(&cli.database_url, args).await?,
        Commands::Migrate => {
            tracing::info!("Running migrations...");
            let storage = SqliteStorage::connect(&cli.database_url).await?;
            storage.migrate().await?;
            let version = storage.schema_version().await?;
            tracing::info!(version = ?version, "Migrations applied");
        }
        Commands::Version => {
            println!("recouply v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
