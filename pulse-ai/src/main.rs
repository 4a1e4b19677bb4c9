//! pulse-ai - AI operation queue and configuration service
//!
//! Serves the async AI queue, configuration governance and scoring endpoints
//! over HTTP (REST + SSE). `pulse-ai issue-token` creates API sessions for
//! operators and integrations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulse_common::auth::{AuthenticatedUser, Role};
use pulse_common::config::{resolve_openai_api_key, RootFolderInitializer, RootFolderResolver};
use pulse_common::db::configurations::seed_defaults;
use pulse_common::db::init_database_pool;
use pulse_common::db::sessions::{create_session, revoke_session};
use pulse_common::events::EventBus;
use pulse_common::settings::DEFAULT_ENVIRONMENT;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pulse_ai::provider::{AiProvider, OpenAiProvider, UnconfiguredProvider, DEFAULT_BASE_URL};
use pulse_ai::queue::OperationQueue;
use pulse_ai::settings::{Settings, SettingsHandle};
use pulse_ai::AppState;

const MODULE_NAME: &str = "pulse-ai";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5730";

/// Command-line arguments for pulse-ai
#[derive(Parser, Debug)]
#[command(name = "pulse-ai")]
#[command(about = "AI operation queue and configuration service for Pulse")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, env = "PULSE_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "PULSE_BIND_ADDRESS")]
    bind: Option<String>,

    /// Deployment environment for configuration lookups
    #[arg(short, long, env = "PULSE_ENVIRONMENT")]
    environment: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an API session and print its token
    IssueToken {
        /// User id; a new one is generated when omitted
        #[arg(long)]
        user_id: Option<Uuid>,

        #[arg(long)]
        name: String,

        /// viewer, member or admin
        #[arg(long, default_value = "member")]
        role: Role,

        /// Lifetime in days; no expiry when omitted
        #[arg(long)]
        days: Option<i64>,
    },

    /// Revoke an API session
    RevokeToken { token: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Step 1: Resolve root folder (CLI > env > TOML > default)
    let resolver = RootFolderResolver::new(MODULE_NAME).with_cli_arg(args.root_folder.clone());
    let toml_config = resolver.toml_config();

    // RUST_LOG wins over the TOML level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));
    info!(
        git_hash = env!("GIT_HASH"),
        build_timestamp = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Build info"
    );

    let root_folder = resolver.resolve();

    // Step 2: Create root folder directory if missing
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    // Step 3: Open or create database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let environment = args
        .environment
        .or_else(|| toml_config.environment.clone())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

    if let Some(command) = args.command {
        return run_command(&db_pool, command).await;
    }

    // Step 4: Seed registry defaults and load runtime settings
    let seeded = seed_defaults(&db_pool, &environment)
        .await
        .context("Failed to seed configuration defaults")?;
    if seeded > 0 {
        info!(seeded, %environment, "Seeded configuration defaults");
    }
    let settings = SettingsHandle::new(
        Settings::load_or_default(&db_pool, &environment).await?,
        environment.clone(),
    );
    let ai = settings.ai();
    info!(
        %environment,
        model = %ai.model,
        workers = ai.worker_count,
        timeout_s = ai.operation_timeout_seconds,
        "Runtime settings loaded"
    );

    // Step 5: Provider, event bus, queue
    let provider: Arc<dyn AiProvider> = match resolve_openai_api_key(&toml_config) {
        Some(key) => {
            let base_url = toml_config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
            info!(%base_url, "AI provider configured");
            Arc::new(OpenAiProvider::new(
                base_url,
                key,
                ai.worker_count,
                ai.requests_per_minute,
            )?)
        }
        None => {
            warn!("No AI provider key configured; AI operations will fail");
            Arc::new(UnconfiguredProvider)
        }
    };

    let event_bus = EventBus::new(100);
    let shutdown = CancellationToken::new();
    let reload_listener =
        settings.spawn_reload_listener(db_pool.clone(), &event_bus, shutdown.clone());

    let queue = Arc::new(OperationQueue::new(
        provider,
        settings.clone(),
        event_bus.clone(),
        db_pool.clone(),
    ));
    queue.start().await;

    let state = AppState::new(db_pool, event_bus, queue.clone(), settings);
    let app = pulse_ai::build_router(state);

    // Step 6: Serve
    let bind = args
        .bind
        .or_else(|| toml_config.bind_address.clone())
        .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    queue.stop().await;
    if let Err(e) = reload_listener.await {
        warn!(error = %e, "Settings listener ended abnormally");
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn run_command(db_pool: &sqlx::SqlitePool, command: Command) -> Result<()> {
    match command {
        Command::IssueToken {
            user_id,
            name,
            role,
            days,
        } => {
            let user = AuthenticatedUser {
                user_id: user_id.unwrap_or_else(Uuid::new_v4),
                display_name: name,
                role,
            };
            let expires_at = days.map(|d| chrono::Utc::now() + chrono::Duration::days(d));
            let token = create_session(db_pool, &user, expires_at).await?;
            info!(user_id = %user.user_id, role = %user.role, "API session created");
            println!("{}", token);
        }
        Command::RevokeToken { token } => {
            if revoke_session(db_pool, &token).await? {
                info!("API session revoked");
            } else {
                warn!("No session for that token");
            }
        }
    }
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
