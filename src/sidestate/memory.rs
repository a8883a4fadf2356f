//! In-memory [`SideStateStore`] test double.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use super::{AttachmentEntry, FailedRecord, SideStateStore};
use crate::error::SideEffectError;

/// In-memory side-state store used exclusively in tests. Mirrors the
/// `HashMap`-behind-`RwLock` shape used elsewhere in this codebase for
/// in-memory backing-store test doubles.
#[derive(Debug, Clone, Default)]
pub struct MemorySideStateStore {
    dedup: Arc<RwLock<HashMap<String, ()>>>,
    attachments: Arc<RwLock<HashMap<String, Vec<AttachmentEntry>>>>,
    failed: Arc<RwLock<Vec<FailedRecord>>>,
    acknowledged: Arc<RwLock<Vec<(String, String)>>>,
    retries: Arc<RwLock<Vec<(String, String, Vec<(String, String)>)>>>,
}

impl MemorySideStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a dedup marker for `hex`, as if upstream ingestion had created it.
    pub fn seed_dedup(&self, hex: &str) {
        self.dedup.write().expect("lock poisoned").insert(hex.to_string(), ());
    }

    /// Seed an attachment manifest for `hex`.
    pub fn seed_attachments(&self, hex: &str, entries: Vec<AttachmentEntry>) {
        self.attachments
            .write()
            .expect("lock poisoned")
            .insert(hex.to_string(), entries);
    }

    #[must_use]
    pub fn dedup_exists(&self, hex: &str) -> bool {
        self.dedup.read().expect("lock poisoned").contains_key(hex)
    }

    #[must_use]
    pub fn attachments_exist(&self, hex: &str) -> bool {
        self.attachments.read().expect("lock poisoned").contains_key(hex)
    }

    #[must_use]
    pub fn failed_records(&self) -> Vec<FailedRecord> {
        self.failed.read().expect("lock poisoned").clone()
    }

    #[must_use]
    pub fn acknowledged_entries(&self) -> Vec<(String, String)> {
        self.acknowledged.read().expect("lock poisoned").clone()
    }

    #[must_use]
    pub fn retry_enqueues(&self) -> Vec<(String, String, Vec<(String, String)>)> {
        self.retries.read().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl SideStateStore for MemorySideStateStore {
    async fn delete_dedup(&self, hex: &str) -> Result<(), SideEffectError> {
        self.dedup.write().expect("lock poisoned").remove(hex);
        Ok(())
    }

    async fn load_attachments(
        &self,
        hex: &str,
    ) -> Result<Option<Vec<AttachmentEntry>>, SideEffectError> {
        Ok(self.attachments.read().expect("lock poisoned").get(hex).cloned())
    }

    async fn delete_attachments_entry(&self, hex: &str) -> Result<(), SideEffectError> {
        self.attachments.write().expect("lock poisoned").remove(hex);
        Ok(())
    }

    async fn append_failed(&self, record: FailedRecord) -> Result<(), SideEffectError> {
        self.failed.write().expect("lock poisoned").push(record);
        Ok(())
    }

    async fn ack_and_remove(
        &self,
        stream: &str,
        _group: &str,
        entry_id: &str,
    ) -> Result<(), SideEffectError> {
        self.acknowledged
            .write()
            .expect("lock poisoned")
            .push((stream.to_string(), entry_id.to_string()));
        Ok(())
    }

    async fn enqueue_retry(
        &self,
        stream: &str,
        original_id: &str,
        payload: Vec<(String, String)>,
    ) -> Result<(), SideEffectError> {
        self.retries.write().expect("lock poisoned").push((
            stream.to_string(),
            original_id.to_string(),
            payload,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_dedup_removes_marker() {
        let store = MemorySideStateStore::new();
        store.seed_dedup("a1");
        assert!(store.dedup_exists("a1"));
        store.delete_dedup("a1").await.unwrap();
        assert!(!store.dedup_exists("a1"));
    }

    #[tokio::test]
    async fn load_attachments_returns_none_when_absent() {
        let store = MemorySideStateStore::new();
        assert_eq!(store.load_attachments("a1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn load_attachments_returns_seeded_manifest() {
        let store = MemorySideStateStore::new();
        let entries = vec![AttachmentEntry {
            name: "doc".to_string(),
            key: "blobs/doc".to_string(),
            filename: "doc.pdf".to_string(),
        }];
        store.seed_attachments("a1", entries.clone());
        assert_eq!(store.load_attachments("a1").await.unwrap(), Some(entries));
    }

    #[tokio::test]
    async fn ack_and_remove_is_recorded() {
        let store = MemorySideStateStore::new();
        store.ack_and_remove("messages", "mailer-group", "1-0").await.unwrap();
        assert_eq!(
            store.acknowledged_entries(),
            vec![("messages".to_string(), "1-0".to_string())]
        );
    }

    #[tokio::test]
    async fn enqueue_retry_is_recorded() {
        let store = MemorySideStateStore::new();
        store
            .enqueue_retry("retry_queue", "1-0", vec![("hex".to_string(), "a1".to_string())])
            .await
            .unwrap();
        assert_eq!(store.retry_enqueues().len(), 1);
    }
}
