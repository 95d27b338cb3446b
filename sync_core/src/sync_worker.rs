//! Sync worker (§4.1): applies one local container's change rows to a
//! remote bucket, idempotently, in strictly increasing row-id order.

use std::sync::Arc;

use change_stream::ChangeRow;
use local_store::{LocalStoreApi, ReadOptions};
use remote_storage::{get_slo_etag, PutMetadata, RemoteProvider, SegmentHash};
use tracing::{debug, info, info_span, Instrument};

use crate::errors::CoreError;
use crate::large_object;

/// Everything one sync worker needs to drive one (local account, local
/// container) -> (remote bucket) mapping.
pub struct SyncWorker {
    pub local: Arc<dyn LocalStoreApi>,
    pub remote: Arc<RemoteProvider>,
    pub local_account: String,
    pub local_container: String,
    pub custom_prefix: Option<String>,
}

impl SyncWorker {
    fn remote_key(&self, object_name: &str) -> String {
        remote_storage::remote_object_key(&self.local_account, &self.local_container, object_name, self.custom_prefix.as_deref())
    }

    /// Applies a single change row (§4.1 "Algorithm"). Returns `Ok(())` once
    /// the remote has been brought up to date (or is already up to date);
    /// the caller is responsible for advancing the checkpoint only after
    /// this returns `Ok`.
    pub async fn apply_row(&self, row: &ChangeRow) -> Result<(), CoreError> {
        let object_name = row.object_name().into_owned();
        let span = info_span!("sync_row", account = %self.local_account, container = %self.local_container, row_id = row.row_id);
        self.apply_row_inner(&object_name, row).instrument(span).await
    }

    async fn apply_row_inner(&self, object_name: &str, row: &ChangeRow) -> Result<(), CoreError> {
        let remote_key = self.remote_key(object_name);

        if row.deleted {
            return match self.remote.delete(&remote_key).await {
                Ok(()) => Ok(()),
                Err(remote_storage::ProviderError::NotFound) => Ok(()),
                Err(err) => Err(err.into()),
            };
        }

        let read_opts = ReadOptions {
            storage_policy_index: Some(row.storage_policy_index),
            newest: true,
        };

        let local_meta = match self.local.head_object(&self.local_account, &self.local_container, object_name, &read_opts).await? {
            Some(meta) => meta,
            None => {
                // The object was deleted again locally before this row could be
                // applied; the eventual delete row will clean up the remote side.
                debug!("local object disappeared before row could be applied, skipping");
                return Ok(());
            }
        };

        if local_meta.is_large_object() {
            return self.apply_large_object(object_name, &local_meta, &remote_key, &read_opts).await;
        }

        let translated = remote_storage::translate_headers(&local_meta.headers);
        let remote_meta = self.remote.head(&remote_key).await?;

        if let Some(remote_meta) = &remote_meta {
            let etag_matches = remote_storage::strip_etag_quotes(&remote_meta.etag) == local_meta.etag;
            if etag_matches {
                if remote_storage::metadata_already_synced(&remote_meta.user_metadata, &translated) {
                    return Ok(());
                }
                if !remote_meta.is_archival() {
                    let put_meta = PutMetadata {
                        content_type: translated.content_type.clone(),
                        user_metadata: translated.user_metadata.clone(),
                        content_md5: None,
                    };
                    self.remote.post_metadata(&remote_key, &put_meta).await?;
                    return Ok(());
                }
            }
        }

        let (_meta, body, _counter) = self
            .local
            .get_object(&self.local_account, &self.local_container, object_name, &read_opts)
            .await?;
        let content_md5 = hex_etag_to_content_md5(&local_meta.etag);
        let put_meta = PutMetadata {
            content_type: translated.content_type,
            user_metadata: translated.user_metadata,
            content_md5,
        };
        let etag = self.remote.put(&remote_key, body, local_meta.content_length, &put_meta).await?;
        info!(etag, "synced object to remote");
        Ok(())
    }

    async fn apply_large_object(
        &self,
        object_name: &str,
        local_meta: &local_store::ObjectMetadata,
        remote_key: &str,
        read_opts: &ReadOptions,
    ) -> Result<(), CoreError> {
        if !local_meta.is_static_large_object() {
            // A DLO's body is empty; the original daemon does not translate
            // DLOs into a remote multipart object, only SLOs (§4.2 covers SLO
            // only). Record its manifest header as metadata and move on.
            let translated = remote_storage::translate_headers(&local_meta.headers);
            let put_meta = PutMetadata {
                content_type: translated.content_type,
                user_metadata: translated.user_metadata,
                content_md5: None,
            };
            self.remote.post_metadata(remote_key, &put_meta).await.or_else(|err| match err {
                remote_storage::ProviderError::NotFound => Err(CoreError::Transient(anyhow::anyhow!("DLO manifest object missing on remote"))),
                other => Err(other.into()),
            })?;
            return Ok(());
        }

        let raw = self
            .local
            .get_raw_manifest(&self.local_account, &self.local_container, object_name)
            .await?;
        let manifest: Vec<local_store::ManifestSegment> = serde_json::from_slice(&raw).map_err(|e| CoreError::Permanent(anyhow::anyhow!(e)))?;
        local_store::validate_slo_manifest(&manifest)?;

        let translated = remote_storage::translate_headers(&local_meta.headers);
        let put_meta = PutMetadata {
            content_type: translated.content_type,
            user_metadata: translated.user_metadata,
            content_md5: None,
        };

        // Mirrors the non-large path above: head the remote first, and if the
        // data is already there under an identical overall ETag, only the
        // multipart-copy metadata-only path runs (§4.1 step 5 / §4.2).
        if self.remote.supports_multipart() {
            if let Some(remote_meta) = self.remote.head(remote_key).await? {
                if !remote_meta.is_archival() {
                    let overall_etag = get_slo_etag(manifest.iter().map(|s| SegmentHash(&s.hash)))
                        .map_err(|e| CoreError::Permanent(anyhow::anyhow!(e)))?;
                    if remote_storage::strip_etag_quotes(&remote_meta.etag) == overall_etag {
                        let etag = large_object::update_slo_metadata_only(&self.remote, &self.local_account, remote_key, &manifest, &put_meta).await?;
                        info!(etag, "updated large object metadata on remote");
                        return Ok(());
                    }
                }
            }
        }

        let etag = if self.remote.supports_multipart() {
            large_object::upload_slo_multipart(
                self.remote.clone(),
                self.local.clone(),
                self.local_account.clone(),
                self.local_container.clone(),
                remote_key,
                &manifest,
                &put_meta,
                read_opts.clone(),
            )
            .await?
        } else {
            large_object::upload_slo_concatenated(&self.remote, &self.local, &self.local_account, remote_key, &manifest, put_meta, read_opts)
                .await?
        };
        info!(etag, "synced large object to remote");
        Ok(())
    }
}

/// The local ETag is hex-encoded MD5; §6 asks the caller to send it as
/// `Content-MD5`, which is base64 of the *raw* digest bytes, not the hex text.
fn hex_etag_to_content_md5(etag: &str) -> Option<String> {
    let bytes = hex::decode(etag).ok()?;
    Some(base64::encode(bytes))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use change_stream::ChangeRow;
    use local_store::FakeLocalStore;
    use remote_storage::FakeRemoteProvider;

    use super::*;

    #[test]
    fn content_md5_round_trips_known_digest() {
        let md5_hex = "d41d8cd98f00b204e9800998ecf8427e"; // md5("")
        let content_md5 = hex_etag_to_content_md5(md5_hex).unwrap();
        assert_eq!(content_md5, "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn non_hex_etag_yields_no_content_md5() {
        assert!(hex_etag_to_content_md5("not-hex").is_none());
    }

    fn worker(local: Arc<FakeLocalStore>, remote: Arc<RemoteProvider>) -> SyncWorker {
        SyncWorker {
            local,
            remote,
            local_account: "acct".to_string(),
            local_container: "cont".to_string(),
            custom_prefix: None,
        }
    }

    fn row(name: &str, deleted: bool) -> ChangeRow {
        ChangeRow {
            row_id: 1,
            name: name.as_bytes().to_vec(),
            storage_policy_index: 0,
            deleted,
            created_at_ns: 0,
        }
    }

    #[tokio::test]
    async fn apply_row_puts_new_object_to_remote() {
        let local = Arc::new(FakeLocalStore::new());
        local.put_container("acct", "cont").await.unwrap();
        local
            .put_object("acct", "cont", "obj1", local_store::fake::body_from_bytes(Bytes::from_static(b"hello")), 5, &HashMap::new())
            .await
            .unwrap();
        let remote = Arc::new(RemoteProvider::Fake(FakeRemoteProvider::new(true)));
        let w = worker(local, remote.clone());

        w.apply_row(&row("obj1", false)).await.unwrap();

        let key = remote_storage::remote_object_key("acct", "cont", "obj1", None);
        let head = remote.head(&key).await.unwrap();
        assert!(head.is_some());
        assert_eq!(head.unwrap().content_length, 5);
    }

    #[tokio::test]
    async fn apply_row_is_idempotent_once_synced() {
        let local = Arc::new(FakeLocalStore::new());
        local.put_container("acct", "cont").await.unwrap();
        local
            .put_object("acct", "cont", "obj1", local_store::fake::body_from_bytes(Bytes::from_static(b"hello")), 5, &HashMap::new())
            .await
            .unwrap();
        let remote = Arc::new(RemoteProvider::Fake(FakeRemoteProvider::new(true)));
        let w = worker(local, remote.clone());

        w.apply_row(&row("obj1", false)).await.unwrap();
        let key = remote_storage::remote_object_key("acct", "cont", "obj1", None);
        let first_etag = remote.head(&key).await.unwrap().unwrap().etag;

        w.apply_row(&row("obj1", false)).await.unwrap();
        let second_etag = remote.head(&key).await.unwrap().unwrap().etag;
        assert_eq!(first_etag, second_etag);
    }

    #[tokio::test]
    async fn apply_row_deletes_remote_object() {
        let local = Arc::new(FakeLocalStore::new());
        let remote = Arc::new(RemoteProvider::Fake(FakeRemoteProvider::new(true)));
        let key = remote_storage::remote_object_key("acct", "cont", "obj1", None);
        if let RemoteProvider::Fake(fake) = remote.as_ref() {
            fake.seed_object(&key, b"hello", "etag1", HashMap::new());
        }
        let w = worker(local, remote.clone());

        w.apply_row(&row("obj1", true)).await.unwrap();
        assert!(remote.head(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn apply_row_delete_of_missing_remote_object_is_ok() {
        let local = Arc::new(FakeLocalStore::new());
        let remote = Arc::new(RemoteProvider::Fake(FakeRemoteProvider::new(true)));
        let w = worker(local, remote);

        w.apply_row(&row("never-existed", true)).await.unwrap();
    }

    #[tokio::test]
    async fn apply_row_skips_object_that_disappeared_locally() {
        let local = Arc::new(FakeLocalStore::new());
        local.put_container("acct", "cont").await.unwrap();
        let remote = Arc::new(RemoteProvider::Fake(FakeRemoteProvider::new(true)));
        let w = worker(local, remote.clone());

        w.apply_row(&row("ghost", false)).await.unwrap();
        let key = remote_storage::remote_object_key("acct", "cont", "ghost", None);
        assert!(remote.head(&key).await.unwrap().is_none());
    }
}
