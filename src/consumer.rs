//! Consumer Loop (SPEC_FULL §4.G): group creation happens during bootstrap
//! (see [`crate::lifecycle`]); this module owns the dedicated blocking-read
//! connection (spec §9 two-connection pattern), the startup-only stalled-
//! entry reclamation via `XAUTOCLAIM`, and the `XREADGROUP BLOCK` loop that
//! decodes and dispatches entries to the Attempt Executor.
//!
//! Both reads go through raw `XAUTOCLAIM`/`XREADGROUP` commands rather than
//! the `redis` crate's typed `StreamAutoClaimReply`/`StreamReadReply`
//! helpers: those collapse each entry's field list into a `HashMap`, which
//! discards the field order the stream preserved on the wire. The
//! decode-failure path's offset-based `attachment_count` read (spec §9 open
//! question #2) only means anything against that original order, so the
//! RESP reply is walked by hand here instead.

use std::{sync::Arc, time::Duration};

use redis::{aio::ConnectionManager, AsyncCommands, Value};
use tokio::sync::broadcast;

use crate::{
    attachments, deadletter,
    error::BootstrapError,
    executor::{self, ExecutorContext},
    message,
    mode::ModeBindings,
};

/// One decoded stream entry: its id plus the field/value pairs in the order
/// Redis returned them.
type RawEntry = (String, Vec<(String, String)>);

/// Shutdown broadcast payload. A single variant today; kept as an enum so
/// additional lifecycle signals (spec §9 "Finalised"-style acks) can be
/// added without changing every receiver's match arm count.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}

/// Owns the blocking-read connection and the stream/group/consumer
/// bindings this process was started with (spec §4.H).
pub struct ConsumerLoop {
    reader: ConnectionManager,
    bindings: ModeBindings,
    batch_size: usize,
    block: Duration,
}

impl ConsumerLoop {
    /// Establish the dedicated blocking-read connection.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::SideStateConnection`] if the connection
    /// cannot be established.
    pub async fn connect(
        redis_url: &str,
        bindings: ModeBindings,
        batch_size: u32,
        block_secs: u64,
    ) -> Result<Self, BootstrapError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BootstrapError::SideStateConnection(e.to_string()))?;
        let reader = ConnectionManager::new(client)
            .await
            .map_err(|e| BootstrapError::SideStateConnection(e.to_string()))?;
        Ok(Self {
            reader,
            bindings,
            batch_size: batch_size as usize,
            block: Duration::from_secs(block_secs),
        })
    }

    /// Verify the target stream exists (spec §4.I); bootstrap aborts otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::StreamAbsent`] if it does not.
    pub async fn verify_stream_exists(&mut self) -> Result<(), BootstrapError> {
        let exists: bool = self
            .reader
            .exists(self.bindings.stream)
            .await
            .map_err(|e| BootstrapError::SideStateConnection(e.to_string()))?;
        if exists {
            Ok(())
        } else {
            Err(BootstrapError::StreamAbsent(self.bindings.stream.to_string()))
        }
    }

    /// Create the consumer group anchored at sequence `0` (spec §4.G step
    /// 1). Idempotent: an already-existing group is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::SideStateConnection`] for any failure other
    /// than the group already existing.
    pub async fn ensure_group(&mut self) -> Result<(), BootstrapError> {
        let result: redis::RedisResult<()> = self
            .reader
            .xgroup_create(self.bindings.stream, &self.bindings.group, "0")
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(BootstrapError::SideStateConnection(e.to_string())),
        }
    }

    /// Startup-only reclamation of entries idle longer than this mode's
    /// threshold (spec §4.G step 2). Tolerant of an empty group.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn reclaim_stalled(&mut self, ctx: &ExecutorContext) {
        let min_idle_ms = u64::try_from(self.bindings.idle_threshold.as_millis()).unwrap_or(u64::MAX);
        let mut cursor = "0-0".to_string();

        loop {
            let mut conn = self.reader.clone();
            let reply: Value = match redis::cmd("XAUTOCLAIM")
                .arg(self.bindings.stream)
                .arg(&self.bindings.group)
                .arg(&self.bindings.consumer)
                .arg(min_idle_ms)
                .arg(&cursor)
                .arg("COUNT")
                .arg(self.batch_size)
                .query_async(&mut conn)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(error = %e, "stalled-entry reclamation failed, continuing with an empty group");
                    return;
                }
            };

            let Some((next_cursor, claimed)) = parse_xautoclaim_reply(&reply) else {
                return;
            };

            if claimed.is_empty() {
                return;
            }

            for (entry_id, raw) in &claimed {
                dispatch_one(entry_id, raw, &self.bindings, ctx).await;
            }

            if next_cursor == "0-0" {
                return;
            }
            cursor = next_cursor;
        }
    }

    /// Run the long-poll loop until `shutdown` fires. Performs startup
    /// reclamation first (spec §4.G step 2), then alternates `XREADGROUP
    /// BLOCK` reads with dispatch (spec §4.G steps 3-5).
    pub async fn run(mut self, ctx: Arc<ExecutorContext>, mut shutdown: broadcast::Receiver<Signal>) {
        self.reclaim_stalled(&ctx).await;

        let block_ms = u64::try_from(self.block.as_millis()).unwrap_or(u64::MAX);

        tracing::info!(stream = self.bindings.stream, group = %self.bindings.group, "consumer loop started");

        loop {
            let mut conn = self.reader.clone();
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("consumer loop received shutdown signal");
                    return;
                }
                result = redis::cmd("XREADGROUP")
                    .arg("GROUP").arg(&self.bindings.group).arg(&self.bindings.consumer)
                    .arg("COUNT").arg(self.batch_size)
                    .arg("BLOCK").arg(block_ms)
                    .arg("STREAMS").arg(self.bindings.stream).arg(">")
                    .query_async::<Value>(&mut conn) => {
                    match result {
                        Ok(Value::Nil) => {}
                        Ok(reply) => self.dispatch_batch(parse_xread_reply(&reply), &ctx).await,
                        Err(e) => {
                            tracing::warn!(error = %e, "stream read failed");
                        }
                    }
                }
            }
        }
    }

    async fn dispatch_batch(&self, entries: Vec<RawEntry>, ctx: &Arc<ExecutorContext>) {
        for (entry_id, raw) in entries {
            if self.bindings.is_delayed_and_concurrent() {
                let ctx = Arc::clone(ctx);
                let bindings = self.bindings.clone();
                let retry_policy = ctx.retry_policy;
                let fail_count = raw
                    .iter()
                    .find(|(k, _)| k == "fail_count")
                    .and_then(|(_, v)| v.parse::<u32>().ok())
                    .unwrap_or(0);
                tokio::spawn(async move {
                    tokio::time::sleep(retry_policy.delay_for(fail_count)).await;
                    dispatch_one(&entry_id, &raw, &bindings, &ctx).await;
                });
            } else {
                dispatch_one(&entry_id, &raw, &self.bindings, ctx).await;
            }
        }
    }
}

/// Parse an `XAUTOCLAIM` reply: `[cursor, [[id, [field, value, ...]], ...]]`
/// on Redis 6.2, with a trailing deleted-ids array on 7.0+ that this
/// ignores. Returns `None` if the reply doesn't match the expected shape.
fn parse_xautoclaim_reply(reply: &Value) -> Option<(String, Vec<RawEntry>)> {
    let Value::Array(top) = reply else { return None };
    let cursor = value_as_string(top.first()?)?;
    let Value::Array(entries) = top.get(1)? else {
        return None;
    };
    Some((cursor, entries.iter().filter_map(parse_stream_entry).collect()))
}

/// Parse an `XREADGROUP`/`XREAD` reply for the single stream this process
/// subscribes to: `[[stream_name, [[id, [field, value, ...]], ...]]]`.
fn parse_xread_reply(reply: &Value) -> Vec<RawEntry> {
    let Value::Array(streams) = reply else {
        return Vec::new();
    };
    streams
        .iter()
        .filter_map(|stream_reply| {
            let Value::Array(pair) = stream_reply else {
                return None;
            };
            let Value::Array(entries) = pair.get(1)? else {
                return None;
            };
            Some(entries.iter().filter_map(parse_stream_entry))
        })
        .flatten()
        .collect()
}

/// Parse one `[entry_id, [field, value, field, value, ...]]` element,
/// preserving the field order the server returned.
fn parse_stream_entry(entry: &Value) -> Option<RawEntry> {
    let Value::Array(entry) = entry else { return None };
    let id = value_as_string(entry.first()?)?;
    let Value::Array(fields) = entry.get(1)? else {
        return None;
    };
    let mut pairs = Vec::with_capacity(fields.len() / 2);
    let mut iter = fields.iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        if let (Some(key), Some(value)) = (value_as_string(key), value_as_string(value)) {
            pairs.push((key, value));
        }
    }
    Some((id, pairs))
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

/// Decode-then-dispatch, or decode-failure handling (spec §4.G step 5):
/// malformed entries never reach the executor. Their attachments (if any)
/// are reaped, the raw payload is dead-lettered, the dedup key is deleted,
/// and the entry is acknowledged.
async fn dispatch_one(entry_id: &str, raw: &[(String, String)], bindings: &ModeBindings, ctx: &ExecutorContext) {
    match message::decode(entry_id, raw) {
        Ok(msg) => {
            let outcome = executor::execute(&msg, bindings, ctx).await;
            tracing::debug!(hex = %msg.hex, ?outcome, "entry processed");
        }
        Err(e) => {
            tracing::warn!(entry_id, error = %e, "entry failed to decode, dead-lettering");
            let hex = raw
                .iter()
                .find(|(k, _)| k == "hex")
                .map(|(_, v)| v.as_str())
                .unwrap_or_default();
            let attachment_count = message::attachment_count_at_offset(raw);

            if attachment_count > 0 {
                if let Err(reap_err) = attachments::reap(hex, ctx.side_state.as_ref(), ctx.object_store.as_ref()).await
                {
                    tracing::warn!(hex, error = %reap_err, "attachment reap failed for malformed entry");
                }
            }

            if let Err(record_err) =
                deadletter::record_raw(hex, raw, attachment_count, &e.to_string(), ctx.side_state.as_ref()).await
            {
                tracing::warn!(hex, error = %record_err, "failed to dead-letter malformed entry");
            }

            if let Err(dedup_err) = ctx.side_state.delete_dedup(hex).await {
                tracing::warn!(hex, error = %dedup_err, "failed to delete dedup key for malformed entry");
            }

            if let Err(ack_err) = ctx
                .side_state
                .ack_and_remove(bindings.stream, &bindings.group, entry_id)
                .await
            {
                tracing::warn!(entry_id, error = %ack_err, "failed to acknowledge malformed entry");
            }
        }
    }
}
