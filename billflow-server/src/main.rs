//! Billflow Server
//!
//! Event dispatch for a subscription-billing service: payment webhook
//! ingestion, the transactional outbox, audit logging, notifications and
//! subscription expiry.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use billflow_core::events::EventChannels;
use billflow_core::framework::DatabaseProcessor;
use billflow_core::processors::{
    AuditLogWriter, ExpiryChecker, HttpRelayNotifier, LogConsumer, LoggingNotifier,
    NotificationConsumer, NotificationHandler, OutboxDispatcher, PgAuditLogWriter,
    PgOutboxStore, PgPaymentWebhookStore, PgSubscriptionService,
};
use clap::Parser;
use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Billflow - event dispatch for subscription billing
#[derive(Parser, Debug)]
#[command(name = "billflow-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./billflow.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false")]
    json_logs: bool,

    /// Payment webhook secret, overriding `[payments] webhook_secret`
    #[arg(long, env = "BILLFLOW_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.json_logs);

    tracing::info!("Starting billflow-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(
        &args.config,
        args.listen,
        args.webhook_secret.clone(),
    ));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);
    if loaded_config.payments.webhook_secret.is_none() {
        tracing::warn!("No webhook secret configured; payment webhooks will be rejected");
    }

    let listen_addr = loaded_config.server.listen;
    let shared_config = loaded_config.shared();

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // Shutdown signal shared by every background task
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Event channels
    let (producers, receivers) = EventChannels::new(&loaded_config.channels);
    let db = DatabaseProcessor::new(db_pool.clone());
    let audit_log: Arc<dyn AuditLogWriter> = Arc::new(PgAuditLogWriter::new(db.clone()));

    let notifier: Arc<dyn NotificationHandler> = match loaded_config.notifications.relay_url {
        Some(relay_url) => {
            tracing::info!(%relay_url, "Delivering notifications through HTTP relay");
            Arc::new(HttpRelayNotifier::new(relay_url))
        }
        None => {
            tracing::info!("No notification relay configured; notifications go to the audit log");
            Arc::new(LoggingNotifier::new(audit_log.clone()))
        }
    };

    // Spawn background processors
    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(
        LogConsumer::new(receivers.logs, audit_log, shutdown_rx.clone()).run(),
    ));
    tasks.push(tokio::spawn(
        NotificationConsumer::new(receivers.notifications, notifier, shutdown_rx.clone()).run(),
    ));
    tasks.push(tokio::spawn(
        OutboxDispatcher::new(
            Arc::new(PgOutboxStore::new(db_pool.clone())),
            producers.clone(),
            shutdown_rx.clone(),
        )
        .run(),
    ));
    tasks.push(tokio::spawn(
        ExpiryChecker::new(
            Arc::new(PgSubscriptionService::new(db)),
            producers.clone(),
            loaded_config.expiry_interval_hours,
            shutdown_rx.clone(),
        )
        .run(),
    ));

    // Spawn config reload handler (listens for SIGHUP)
    tasks.push(spawn_config_reload_handler(
        shared_config.clone(),
        config_loader,
        shutdown_rx,
    ));

    // Create application state and build the router
    let state = AppState::new(
        shared_config,
        producers,
        Arc::new(PgPaymentWebhookStore::new(db_pool.clone())),
    );
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, shutdown_signal()).await;

    // Stop background processors and wait for them to finish
    tracing::info!("Stopping background processors...");
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!("Background task failed: {}", e);
        }
    }

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
