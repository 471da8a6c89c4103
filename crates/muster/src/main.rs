//! Muster - Squad Membership Service for Citadel
//!
//! Keeps auto squad membership in line with squad filters:
//! - Consumes character change events from a Redis Stream and re-evaluates the
//!   squads each change can affect
//! - Runs a scheduled sweep over every user and auto squad

mod config;
mod consumer;
mod events;
mod pg;
mod reconciler;
mod scheduler;
mod store;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use citadel_rules::eligibility::EligibilityService;
use citadel_rules::registry::FilterCompiler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::consumer::ChangeConsumer;
use crate::pg::PgStore;
use crate::reconciler::Reconciler;
use crate::scheduler::SweepScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "muster=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Muster Squad Membership Service");

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    tracing::info!("Environment: {}", config.environment);

    // Create database pool
    tracing::info!("Connecting to database...");
    let db_pool = sqlx::PgPool::connect(&config.database_url).await?;
    tracing::info!("Database connected");

    // Create Redis pool
    tracing::info!("Connecting to Redis...");
    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis_pool = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    tracing::info!("Redis connected");

    let store = Arc::new(PgStore::new(db_pool));
    let eligibility = EligibilityService::new(FilterCompiler::with_config(config.engine()));
    let reconciler = Arc::new(Reconciler::new(store.clone(), store, eligibility));

    // Create shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // Setup signal handlers
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        tracing::info!("Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    // Start consuming change events
    let consumer = ChangeConsumer::new(
        (*config).clone(),
        redis_pool,
        reconciler.clone(),
        shutdown.clone(),
    );
    consumer.initialize().await?;
    let consumer_handle = tokio::spawn(async move { consumer.run().await });

    // Create and setup scheduler
    let mut scheduler = SweepScheduler::new(config, reconciler).await?;
    scheduler.setup_jobs().await?;

    tracing::info!("Muster ready, starting scheduler");
    scheduler.start().await?;

    // Wait for shutdown signal
    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }

    // Graceful shutdown
    tracing::info!("Shutting down scheduler...");
    scheduler.shutdown().await?;

    tracing::info!("Waiting for consumer to finish...");
    consumer_handle.await??;

    tracing::info!("Muster shutdown complete");
    Ok(())
}
