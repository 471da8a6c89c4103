//! Redis Stream consumer for character change events

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use deadpool_redis::redis;

use crate::config::Config;
use crate::events::ChangeEvent;
use crate::reconciler::Reconciler;
use crate::store::{MembershipStore, SnapshotProvider};

/// A single entry read from the stream.
#[derive(Debug, PartialEq, Eq)]
struct StreamMessage {
    id: String,
    fields: HashMap<String, String>,
}

/// Consumer that turns change events into membership reconciliation
pub struct ChangeConsumer<P, M> {
    config: Config,
    redis_pool: deadpool_redis::Pool,
    reconciler: Arc<Reconciler<P, M>>,
    shutdown: Arc<AtomicBool>,
}

impl<P, M> ChangeConsumer<P, M>
where
    P: SnapshotProvider,
    M: MembershipStore,
{
    pub fn new(
        config: Config,
        redis_pool: deadpool_redis::Pool,
        reconciler: Arc<Reconciler<P, M>>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            redis_pool,
            reconciler,
            shutdown,
        }
    }

    /// Initialize consumer group
    pub async fn initialize(&self) -> Result<()> {
        let mut conn = self.redis_pool.get().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut *conn)
            .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    "Created consumer group '{}' on stream '{}'",
                    self.config.consumer_group,
                    self.config.stream_name
                );
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                tracing::debug!("Consumer group already exists");
            }
            Err(e) => {
                return Err(anyhow!("Failed to create consumer group: {}", e));
            }
        }

        Ok(())
    }

    /// Run the consumer loop until shutdown
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            "Starting change consumer '{}' in group '{}'",
            self.config.worker_id,
            self.config.consumer_group
        );

        match self.claim_pending_messages().await {
            Ok(0) => {}
            Ok(claimed) => tracing::info!("Processed {} abandoned events", claimed),
            Err(e) => tracing::error!("Failed to claim pending events: {}", e),
        }

        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.process_next_event().await {
                let err_msg = e.to_string();
                tracing::error!("Error processing change event: {}", err_msg);

                // If Redis lost the consumer group, re-create it
                if err_msg.contains("NOGROUP") {
                    tracing::warn!("Consumer group missing, re-initializing...");
                    if let Err(init_err) = self.initialize().await {
                        tracing::error!("Failed to re-initialize consumer group: {}", init_err);
                    }
                }

                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        tracing::info!("Change consumer shutting down");
        Ok(())
    }

    /// Process the next event from the stream. Returns `false` when the read timed
    /// out without an event.
    async fn process_next_event(&self) -> Result<bool> {
        let mut conn = self.redis_pool.get().await?;

        let result: Vec<redis::Value> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.worker_id)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(self.config.block_timeout_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        if result.is_empty() {
            return Ok(false);
        }

        let message = parse_stream_message(&result)?;
        self.process_message(&message).await?;
        Ok(true)
    }

    /// Reconcile one stream entry and acknowledge it.
    async fn process_message(&self, message: &StreamMessage) -> Result<()> {
        let Some(payload) = message.fields.get("payload") else {
            self.send_to_dead_letter(message, "", "missing payload field").await?;
            return self.ack_message(&message.id).await;
        };

        let event: ChangeEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                self.send_to_dead_letter(message, payload, &e.to_string()).await?;
                return self.ack_message(&message.id).await;
            }
        };

        match self.reconciler.handle(&event).await {
            Ok(report) => {
                tracing::info!(
                    "Event {} reconciled: added={}, removed={}, unchanged={}, failed={}",
                    message.id,
                    report.added,
                    report.removed,
                    report.unchanged,
                    report.failed
                );
            }
            Err(e) => {
                // The periodic sweep re-evaluates everyone, so the event is not retried
                tracing::error!(
                    ?event,
                    code = e.error_code(),
                    "Failed to reconcile event {}: {}",
                    message.id,
                    e
                );
            }
        }

        self.ack_message(&message.id).await
    }

    /// Claim entries left pending by consumers that went away and process them.
    pub async fn claim_pending_messages(&self) -> Result<usize> {
        let mut cursor = "0-0".to_string();
        let mut claimed = 0;

        loop {
            let mut conn = self.redis_pool.get().await?;
            let reply: redis::Value = redis::cmd("XAUTOCLAIM")
                .arg(&self.config.stream_name)
                .arg(&self.config.consumer_group)
                .arg(&self.config.worker_id)
                .arg(self.config.claim_idle_ms)
                .arg(&cursor)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await?;
            drop(conn);

            let (next, messages) = parse_autoclaim_reply(&reply)?;
            for message in &messages {
                tracing::info!("Claimed abandoned event {}", message.id);
                self.process_message(message).await?;
            }
            claimed += messages.len();

            if next == "0-0" {
                break;
            }
            cursor = next;
        }

        Ok(claimed)
    }

    /// Acknowledge a message
    async fn ack_message(&self, message_id: &str) -> Result<()> {
        let mut conn = self.redis_pool.get().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<i64>(&mut *conn)
            .await?;

        Ok(())
    }

    /// Park an undecodable event on the dead letter stream
    async fn send_to_dead_letter(
        &self,
        message: &StreamMessage,
        payload: &str,
        error: &str,
    ) -> Result<()> {
        let mut conn = self.redis_pool.get().await?;

        tracing::error!(
            "Sending event {} to dead letter stream: {}",
            message.id,
            error
        );

        redis::cmd("XADD")
            .arg(&self.config.dead_letter_stream)
            .arg("*")
            .arg("source_id")
            .arg(&message.id)
            .arg("payload")
            .arg(payload)
            .arg("error")
            .arg(error)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .query_async::<String>(&mut *conn)
            .await?;

        Ok(())
    }
}

/// Parse an XREADGROUP reply holding a single message.
fn parse_stream_message(result: &[redis::Value]) -> Result<StreamMessage> {
    // XREADGROUP returns: [[stream_name, [[message_id, [field, value, ...]]]]]
    let stream_data = match result.first() {
        Some(redis::Value::Array(data)) => data,
        _ => return Err(anyhow!("Invalid stream response format")),
    };

    let messages = match stream_data.get(1) {
        Some(redis::Value::Array(msgs)) => msgs,
        _ => return Err(anyhow!("No messages in response")),
    };

    messages
        .first()
        .ok_or_else(|| anyhow!("No message data"))
        .and_then(parse_entry)
}

/// Parse an XAUTOCLAIM reply into the next cursor and the claimed entries.
fn parse_autoclaim_reply(reply: &redis::Value) -> Result<(String, Vec<StreamMessage>)> {
    // XAUTOCLAIM returns: [next_cursor, [[message_id, [field, value, ...]], ...], ...]
    let parts = match reply {
        redis::Value::Array(parts) => parts,
        _ => return Err(anyhow!("Invalid XAUTOCLAIM response format")),
    };

    let cursor = match parts.first() {
        Some(redis::Value::BulkString(id)) => String::from_utf8_lossy(id).to_string(),
        Some(redis::Value::SimpleString(id)) => id.clone(),
        _ => return Err(anyhow!("Missing XAUTOCLAIM cursor")),
    };

    let messages = match parts.get(1) {
        Some(redis::Value::Array(entries)) => entries
            .iter()
            // Entries deleted from the stream come back as nil
            .filter(|entry| matches!(entry, redis::Value::Array(_)))
            .map(parse_entry)
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };

    Ok((cursor, messages))
}

/// Parse a single `[message_id, [field, value, ...]]` entry.
fn parse_entry(entry: &redis::Value) -> Result<StreamMessage> {
    let message = match entry {
        redis::Value::Array(msg) => msg,
        _ => return Err(anyhow!("No message data")),
    };

    let id = match message.first() {
        Some(redis::Value::BulkString(id)) => String::from_utf8_lossy(id).to_string(),
        _ => return Err(anyhow!("Invalid message ID")),
    };

    let raw_fields = match message.get(1) {
        Some(redis::Value::Array(f)) => f,
        _ => return Err(anyhow!("No message fields")),
    };

    let mut fields = HashMap::new();
    for chunk in raw_fields.chunks(2) {
        if let [redis::Value::BulkString(key), redis::Value::BulkString(value)] = chunk {
            fields.insert(
                String::from_utf8_lossy(key).to_string(),
                String::from_utf8_lossy(value).to_string(),
            );
        }
    }

    Ok(StreamMessage { id, fields })
}
