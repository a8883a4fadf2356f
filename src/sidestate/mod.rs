//! Side-state store: dedup keys, attachment manifests, the dead-letter
//! list, and the stream acknowledge/enqueue operations that ride alongside
//! the message stream itself.

pub mod memory;
pub mod redis_store;

pub use memory::MemorySideStateStore;
pub use redis_store::RedisSideStateStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SideEffectError;

/// One attachment entry in a message's manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentEntry {
    pub name: String,
    pub key: String,
    pub filename: String,
}

/// A terminal failure record, as appended to the dead-letter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRecord {
    pub hex: String,
    pub form_id: String,
    pub fields: String,
    pub origin: String,
    pub attachment_count: u32,
    pub error: String,
}

/// The side-band state store backing dedup keys, attachment manifests, the
/// dead-letter list, and stream teardown operations.
///
/// Implementations must treat every method as a single round-trip; no
/// cross-key transactions are assumed by callers (see SPEC_FULL §4.B).
#[async_trait]
pub trait SideStateStore: Send + Sync {
    /// Delete the dedup presence marker for `hex`, if any.
    async fn delete_dedup(&self, hex: &str) -> Result<(), SideEffectError>;

    /// Load the attachment manifest for `hex`, if one exists.
    async fn load_attachments(&self, hex: &str) -> Result<Option<Vec<AttachmentEntry>>, SideEffectError>;

    /// Delete the attachment manifest entry for `hex`.
    async fn delete_attachments_entry(&self, hex: &str) -> Result<(), SideEffectError>;

    /// Append a record to the dead-letter list.
    async fn append_failed(&self, record: FailedRecord) -> Result<(), SideEffectError>;

    /// Acknowledge and remove an entry from `stream` on behalf of `group`.
    async fn ack_and_remove(
        &self,
        stream: &str,
        group: &str,
        entry_id: &str,
    ) -> Result<(), SideEffectError>;

    /// Enqueue `payload` into `stream`, using `original_id` as the new
    /// entry's id (see DESIGN.md open question #3: this is a deliberately
    /// preserved behavior, not a recommendation).
    async fn enqueue_retry(
        &self,
        stream: &str,
        original_id: &str,
        payload: Vec<(String, String)>,
    ) -> Result<(), SideEffectError>;
}
