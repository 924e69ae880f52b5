use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleAction {
    SoftDelete,
    Restore,
}

/// Message consumed by the workout service when an account changes state.
/// Field names and the base64-wrapped JSON body are part of the downstream
/// contract; do not rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub user_id: i64,
    pub action: LifecycleAction,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl LifecycleEvent {
    pub fn now(user_id: i64, action: LifecycleAction) -> Self {
        Self {
            user_id,
            action,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Base64-wrapped UTF-8 JSON, text-safe for any queue transport.
pub fn encode_message(event: &LifecycleEvent) -> Result<String, ApiError> {
    let json = serde_json::to_string(event)
        .map_err(|e| ApiError::Unexpected(anyhow::Error::new(e).context("serialize event")))?;
    Ok(Base64::encode_string(json.as_bytes()))
}

/// Queue-transport seam. Publishing is best-effort: the caller's persisted
/// state change is already committed and cannot be rolled back if the
/// transport is down, so failures surface as `TransientIo`. There is no
/// durable outbox; delivery is at-least-once only while the transport is up.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Idempotent channel provisioning; safe to call before every publish.
    async fn ensure_channel(&self) -> Result<(), ApiError>;
    async fn publish(&self, event: &LifecycleEvent) -> Result<(), ApiError>;
}

/// Publishes to a named Redis list over a shared `ConnectionManager` handle
/// (safe for concurrent use, reconnects internally).
#[derive(Clone)]
pub struct RedisQueuePublisher {
    connection: ConnectionManager,
    queue_name: String,
}

impl RedisQueuePublisher {
    pub async fn connect(url: &str, queue_name: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            queue_name: queue_name.to_string(),
        })
    }
}

#[async_trait]
impl EventPublisher for RedisQueuePublisher {
    async fn ensure_channel(&self) -> Result<(), ApiError> {
        // Lists are created on first push; an explicit PING verifies the
        // transport is reachable, mirroring create-if-not-exists semantics.
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(|e| {
            error!(error = %e, queue = %self.queue_name, "queue transport unreachable");
            ApiError::TransientIo(anyhow::Error::new(e).context("queue ping"))
        })?;
        Ok(())
    }

    async fn publish(&self, event: &LifecycleEvent) -> Result<(), ApiError> {
        self.ensure_channel().await?;
        let payload = encode_message(event)?;
        let mut conn = self.connection.clone();
        let _: i64 = conn.lpush(&self.queue_name, payload).await.map_err(|e| {
            error!(error = %e, queue = %self.queue_name, "queue publish failed");
            ApiError::TransientIo(anyhow::Error::new(e).context("queue publish"))
        })?;
        info!(
            user_id = event.user_id,
            action = ?event.action,
            queue = %self.queue_name,
            "lifecycle event published"
        );
        Ok(())
    }
}
