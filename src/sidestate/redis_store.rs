//! Redis-backed [`SideStateStore`].
//!
//! Holds the "commands" half of the two-connection pattern described in
//! SPEC_FULL §10 / spec §9: a `ConnectionManager` used for every
//! non-blocking command. The dedicated blocking-read connection used for
//! `XREADGROUP`/`XAUTOCLAIM` lives with the consumer loop instead, so that
//! no command issued here can ever be queued behind an outstanding block.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use super::{AttachmentEntry, FailedRecord, SideStateStore};
use crate::error::{BootstrapError, SideEffectError};

pub struct RedisSideStateStore {
    commands: ConnectionManager,
}

impl RedisSideStateStore {
    /// Connect to `redis_url`, establishing the commands connection.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::SideStateConnection`] if the connection
    /// cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, BootstrapError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BootstrapError::SideStateConnection(e.to_string()))?;
        let commands = ConnectionManager::new(client)
            .await
            .map_err(|e| BootstrapError::SideStateConnection(e.to_string()))?;
        Ok(Self { commands })
    }

    fn dedup_key(hex: &str) -> String {
        format!("streams:{hex}")
    }

    fn attachments_key(hex: &str) -> String {
        format!("attachments:{hex}")
    }
}

#[async_trait]
impl SideStateStore for RedisSideStateStore {
    #[tracing::instrument(skip(self))]
    async fn delete_dedup(&self, hex: &str) -> Result<(), SideEffectError> {
        let mut conn = self.commands.clone();
        conn.del::<_, ()>(Self::dedup_key(hex))
            .await
            .map_err(|e| SideEffectError::SideState(e.to_string()))
    }

    #[tracing::instrument(skip(self))]
    async fn load_attachments(
        &self,
        hex: &str,
    ) -> Result<Option<Vec<AttachmentEntry>>, SideEffectError> {
        let mut conn = self.commands.clone();
        let raw: Option<String> = conn
            .hget(Self::attachments_key(hex), "files")
            .await
            .map_err(|e| SideEffectError::SideState(e.to_string()))?;

        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| SideEffectError::SideState(e.to_string())),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn delete_attachments_entry(&self, hex: &str) -> Result<(), SideEffectError> {
        let mut conn = self.commands.clone();
        conn.del::<_, ()>(Self::attachments_key(hex))
            .await
            .map_err(|e| SideEffectError::SideState(e.to_string()))
    }

    #[tracing::instrument(skip(self, record))]
    async fn append_failed(&self, record: FailedRecord) -> Result<(), SideEffectError> {
        let mut conn = self.commands.clone();
        let json =
            serde_json::to_string(&record).map_err(|e| SideEffectError::SideState(e.to_string()))?;
        conn.rpush::<_, _, ()>("failed", json)
            .await
            .map_err(|e| SideEffectError::SideState(e.to_string()))
    }

    #[tracing::instrument(skip(self))]
    async fn ack_and_remove(
        &self,
        stream: &str,
        group: &str,
        entry_id: &str,
    ) -> Result<(), SideEffectError> {
        let mut conn = self.commands.clone();
        conn.xack::<_, _, _, ()>(stream, group, &[entry_id])
            .await
            .map_err(|e| SideEffectError::SideState(e.to_string()))?;
        conn.xdel::<_, _, ()>(stream, &[entry_id])
            .await
            .map_err(|e| SideEffectError::SideState(e.to_string()))
    }

    #[tracing::instrument(skip(self, payload))]
    async fn enqueue_retry(
        &self,
        stream: &str,
        original_id: &str,
        payload: Vec<(String, String)>,
    ) -> Result<(), SideEffectError> {
        let mut conn = self.commands.clone();
        // Reuses the original entry id rather than "*" (auto-id). Preserved
        // per DESIGN.md open question #3: a stream engine may reject this
        // if `original_id` is not monotonically greater than the stream's
        // last id.
        conn.xadd::<_, _, _, _, ()>(stream, original_id, &payload)
            .await
            .map_err(|e| SideEffectError::SideState(e.to_string()))
    }
}
