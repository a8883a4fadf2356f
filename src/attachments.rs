//! Attachment Reaper (SPEC_FULL §4.C): given a `hex`, loads the manifest,
//! bulk-deletes the referenced object-store blobs, and clears the
//! manifest entry. Object-store failures are logged but never block
//! termination of the message (see spec §4.C, §7 Side-effect-loss).

use async_trait::async_trait;
use s3::{creds::Credentials, Bucket, Region};

use crate::{error::SideEffectError, sidestate::SideStateStore};

/// The object store backing attachment blobs. Modeled as a trait so the
/// production S3/MinIO adapter and an in-memory fake share a call surface.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Delete every key in `keys`. Implementations should make a best
    /// effort to delete as many as possible rather than stopping at the
    /// first failure.
    async fn delete_many(&self, keys: &[String]) -> Result<(), SideEffectError>;
}

/// S3/MinIO-backed object store, built on `rust-s3`.
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
}

impl S3ObjectStore {
    /// # Errors
    ///
    /// Returns an error if the bucket handle cannot be constructed.
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> anyhow::Result<Self> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };
        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)?;
        let bucket = Bucket::new(bucket_name, region, credentials)?.with_path_style();
        Ok(Self { bucket })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[tracing::instrument(skip(self))]
    async fn delete_many(&self, keys: &[String]) -> Result<(), SideEffectError> {
        let mut last_err = None;
        for key in keys {
            if let Err(e) = self.bucket.delete_object(key).await {
                tracing::warn!(key, error = %e, "failed to delete attachment blob");
                last_err = Some(e.to_string());
            }
        }
        match last_err {
            Some(e) => Err(SideEffectError::ObjectStoreDelete(e)),
            None => Ok(()),
        }
    }
}

/// Enumerate and delete all object-store entries for `hex`, then clear the
/// manifest. Never returns an error that should block message termination:
/// failures are logged by the caller via the `Err` value, but the Executor
/// treats this as advisory (§7 Side-effect-loss).
#[tracing::instrument(skip(side_state, object_store))]
pub async fn reap(
    hex: &str,
    side_state: &dyn SideStateStore,
    object_store: &dyn ObjectStore,
) -> Result<(), SideEffectError> {
    let Some(manifest) = side_state.load_attachments(hex).await? else {
        return Ok(());
    };

    let keys: Vec<String> = manifest.into_iter().map(|entry| entry.key).collect();
    if !keys.is_empty() {
        if let Err(e) = object_store.delete_many(&keys).await {
            tracing::warn!(hex, error = %e, "attachment blob deletion failed, manifest still cleared");
        }
    }

    side_state.delete_attachments_entry(hex).await
}


#[cfg(test)]
mod tests {
    use fake::MemoryObjectStore;

    use super::*;
    use crate::sidestate::{AttachmentEntry, MemorySideStateStore};

    #[tokio::test]
    async fn reap_deletes_blobs_and_manifest_when_present() {
        let side_state = MemorySideStateStore::new();
        let object_store = MemoryObjectStore::new();
        side_state.seed_attachments(
            "a1",
            vec![AttachmentEntry {
                name: "doc".to_string(),
                key: "blobs/doc".to_string(),
                filename: "doc.pdf".to_string(),
            }],
        );

        reap("a1", &side_state, &object_store).await.unwrap();

        assert_eq!(object_store.deleted_keys(), vec!["blobs/doc".to_string()]);
        assert!(!side_state.attachments_exist("a1"));
    }

    #[tokio::test]
    async fn reap_is_noop_when_no_manifest() {
        let side_state = MemorySideStateStore::new();
        let object_store = MemoryObjectStore::new();

        reap("a1", &side_state, &object_store).await.unwrap();

        assert!(object_store.deleted_keys().is_empty());
    }

    #[tokio::test]
    async fn reap_clears_manifest_even_if_object_store_delete_fails() {
        let side_state = MemorySideStateStore::new();
        let object_store = MemoryObjectStore::new();
        side_state.seed_attachments(
            "a1",
            vec![AttachmentEntry {
                name: "doc".to_string(),
                key: "blobs/doc".to_string(),
                filename: "doc.pdf".to_string(),
            }],
        );
        object_store.fail_next_delete();

        reap("a1", &side_state, &object_store).await.unwrap();

        assert!(!side_state.attachments_exist("a1"));
    }
}
