//! Configuration for the Muster reconciliation service

use std::env;

use anyhow::{Context, Result};
use citadel_rules::{DEFAULT_MAX_DEPTH, EngineConfig};

/// Muster configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment (development, staging, production)
    pub environment: String,

    /// PostgreSQL connection URL
    pub database_url: String,

    /// Redis connection URL
    pub redis_url: String,

    /// Worker ID for consumer group
    pub worker_id: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Stream carrying character and affiliation change events
    pub stream_name: String,

    /// Stream receiving events that could not be decoded
    pub dead_letter_stream: String,

    /// Block timeout for XREADGROUP (milliseconds)
    pub block_timeout_ms: usize,

    /// Idle time after which another consumer's pending entries are claimed (milliseconds)
    pub claim_idle_ms: u64,

    /// Cron expression for the full membership sweep (default: every 30 min)
    pub sweep_cron: String,

    /// Maximum combinator nesting accepted in squad filters
    pub max_filter_depth: usize,
}

impl Config {
    /// Load configuration from environment variables, reading `.env` if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let stream_name =
            env::var("STREAM_NAME").unwrap_or_else(|_| "character_changes".to_string());

        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            worker_id: env::var("WORKER_ID")
                .unwrap_or_else(|_| format!("muster-{}", uuid::Uuid::new_v4())),
            consumer_group: env::var("CONSUMER_GROUP").unwrap_or_else(|_| "muster".to_string()),
            dead_letter_stream: env::var("DEAD_LETTER_STREAM")
                .unwrap_or_else(|_| format!("{stream_name}:dead")),
            stream_name,
            block_timeout_ms: env::var("BLOCK_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            claim_idle_ms: env::var("CLAIM_IDLE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60_000),
            sweep_cron: env::var("SWEEP_CRON").unwrap_or_else(|_| "0 */30 * * * *".to_string()),
            max_filter_depth: env::var("MAX_FILTER_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_DEPTH),
        })
    }

    /// Engine limits derived from this configuration
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            max_depth: self.max_filter_depth,
        }
    }
}
