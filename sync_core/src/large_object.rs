//! Large-object pipeline (§4.2): translates a segmented manifest into either
//! a multipart upload (one segment = one part) or a concatenated single put,
//! grounded on the original daemon's `_upload_slo`/`_upload_part_worker` pair,
//! reimplemented with a `tokio::sync::mpsc` bounded queue and a fixed worker
//! pool instead of a green-thread pool and an eventlet queue.

use std::sync::Arc;

use bytes::Bytes;
use local_store::{LocalStoreApi, ManifestSegment, ReadOptions};
use remote_storage::{CompletedPart, PutMetadata, RemoteProvider, SegmentHash};
use tokio::sync::mpsc;

use crate::errors::CoreError;

/// Work queue depth (§5 "Large-object worker pool"); bounds memory when a
/// manifest references thousands of segments.
const QUEUE_CAPACITY: usize = 100;
/// Fixed worker pool size (§5).
const WORKER_COUNT: usize = 10;

struct SegmentTask {
    part_number: i32,
    segment: ManifestSegment,
}

struct PartError {
    part_number: i32,
    message: String,
}

/// Uploads an already-validated SLO manifest as a multipart object, one
/// segment per part, fanned out across a fixed worker pool. On any worker
/// error the whole multipart upload is aborted (§4.2, no partial retry —
/// the original never retried individual parts either, see the open
/// question in the design notes).
pub async fn upload_slo_multipart(
    remote: Arc<RemoteProvider>,
    local: Arc<dyn LocalStoreApi>,
    account: String,
    container: String,
    s3_key: &str,
    manifest: &[ManifestSegment],
    meta: &PutMetadata,
    read_opts: ReadOptions,
) -> Result<String, CoreError> {
    let upload_id = remote.create_multipart(s3_key, meta).await?;

    let (tx, rx) = mpsc::channel::<SegmentTask>(QUEUE_CAPACITY);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut worker_handles = Vec::with_capacity(WORKER_COUNT);
    for _ in 0..WORKER_COUNT {
        let remote = remote.clone();
        let local = local.clone();
        let rx = rx.clone();
        let account = account.clone();
        let upload_id = upload_id.clone();
        let s3_key = s3_key.to_string();
        let read_opts = read_opts.clone();
        worker_handles.push(tokio::spawn(async move {
            let mut errors = Vec::new();
            loop {
                let task = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                let Some(task) = task else { break };
                if let Err(message) =
                    upload_one_part(&remote, &local, &account, &upload_id, &s3_key, &task, &read_opts).await
                {
                    errors.push(PartError {
                        part_number: task.part_number,
                        message,
                    });
                }
            }
            errors
        }));
    }

    for (i, segment) in manifest.iter().enumerate() {
        let task = SegmentTask {
            part_number: (i + 1) as i32,
            segment: segment.clone(),
        };
        // Closing `tx` after the loop is what lets every worker's `recv()`
        // observe end-of-queue without a sentinel value.
        if tx.send(task).await.is_err() {
            break;
        }
    }
    drop(tx);

    let mut errors = Vec::new();
    let mut join_failure = None;
    for handle in worker_handles {
        match handle.await {
            Ok(worker_errors) => errors.extend(worker_errors),
            Err(e) => join_failure.get_or_insert(e),
        };
    }
    if let Some(e) = join_failure {
        remote.abort_multipart(s3_key, &upload_id).await.ok();
        return Err(CoreError::Transient(anyhow::anyhow!(e)));
    }

    if !errors.is_empty() {
        remote.abort_multipart(s3_key, &upload_id).await.ok();
        let summary = errors
            .iter()
            .map(|e| format!("part {}: {}", e.part_number, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CoreError::Transient(anyhow::anyhow!(
            "large object upload failed for {s3_key}: {summary}"
        )));
    }

    let parts: Vec<CompletedPart> = manifest
        .iter()
        .enumerate()
        .map(|(i, segment)| CompletedPart {
            part_number: (i + 1) as i32,
            etag: segment.hash.clone(),
        })
        .collect();

    match remote.complete_multipart(s3_key, &upload_id, &parts).await {
        Ok(etag) => Ok(etag),
        Err(err) => {
            remote.abort_multipart(s3_key, &upload_id).await.ok();
            Err(err.into())
        }
    }
}

async fn upload_one_part(
    remote: &RemoteProvider,
    local: &dyn LocalStoreApi,
    account: &str,
    upload_id: &str,
    s3_key: &str,
    task: &SegmentTask,
    read_opts: &ReadOptions,
) -> Result<(), String> {
    let (container, name) = task
        .segment
        .container_and_name()
        .ok_or_else(|| format!("unparseable segment path {:?}", task.segment.path))?;

    let (_meta, body, _counter) = local
        .get_object(account, container, name, read_opts)
        .await
        .map_err(|e| e.to_string())?;

    let etag = remote
        .upload_part(s3_key, upload_id, task.part_number, collect(body).await.map_err(|e| e.to_string())?, None)
        .await
        .map_err(|e| e.to_string())?;

    if etag != task.segment.hash {
        return Err(format!(
            "ETag mismatch for segment {}: manifest says {}, remote returned {}",
            task.segment.path, task.segment.hash, etag
        ));
    }
    Ok(())
}

async fn collect(body: local_store::ObjectBodyStream) -> Result<Bytes, std::io::Error> {
    use futures::StreamExt;
    let mut buf = Vec::new();
    let mut body = body;
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buf))
}

/// Uploads an SLO as one concatenated put against a vendor that does not
/// support multipart, preserving segment order. Precondition (already
/// checked by the caller): `total_bytes <= MAX_CONCATENATED_BYTES`.
pub async fn upload_slo_concatenated(
    remote: &RemoteProvider,
    local: &dyn LocalStoreApi,
    account: &str,
    s3_key: &str,
    manifest: &[ManifestSegment],
    mut meta: PutMetadata,
    read_opts: &ReadOptions,
) -> Result<String, CoreError> {
    let total_bytes: u64 = manifest.iter().map(|s| s.bytes).sum();
    let overall_etag = remote_storage::get_slo_etag(manifest.iter().map(|s| SegmentHash(&s.hash)))
        .map_err(|e| CoreError::Permanent(anyhow::anyhow!(e)))?;
    meta.user_metadata
        .insert(remote_storage::metadata::SLO_ETAG_META_KEY.to_string(), overall_etag.clone());

    let mut buf = Vec::with_capacity(total_bytes as usize);
    for segment in manifest {
        let (container, name) = segment
            .container_and_name()
            .ok_or_else(|| CoreError::Permanent(anyhow::anyhow!("unparseable segment path {}", segment.path)))?;
        let (_meta, body, _counter) = local.get_object(account, container, name, read_opts).await?;
        buf.extend_from_slice(&collect(body).await.map_err(|e| CoreError::Transient(anyhow::anyhow!(e)))?);
    }

    let body = remote_storage::body_from_bytes(Bytes::from(buf));
    let etag = remote.put(s3_key, body, total_bytes, &meta).await?;
    Ok(etag)
}

/// Reproduces the metadata-only update path for a multipart-backed SLO
/// (§4.2 "Metadata-only update"): a fresh multipart upload whose parts are
/// populated by server-side copy rather than re-reading local segment data,
/// so the resulting ETag is identical to the original upload's.
pub async fn update_slo_metadata_only(
    remote: &RemoteProvider,
    account: &str,
    s3_key: &str,
    manifest: &[ManifestSegment],
    meta: &PutMetadata,
) -> Result<String, CoreError> {
    let upload_id = remote.create_multipart(s3_key, meta).await?;

    let mut offset = 0u64;
    let mut parts = Vec::with_capacity(manifest.len());
    for (i, segment) in manifest.iter().enumerate() {
        let part_number = (i + 1) as i32;
        let range = (offset, offset + segment.bytes - 1);
        offset += segment.bytes;
        let source_key = format!("{account}{}", segment.path);
        match remote.upload_part_copy(s3_key, &upload_id, part_number, &source_key, range).await {
            Ok(etag) => parts.push(CompletedPart { part_number, etag }),
            Err(err) => {
                remote.abort_multipart(s3_key, &upload_id).await.ok();
                return Err(err.into());
            }
        }
    }

    match remote.complete_multipart(s3_key, &upload_id, &parts).await {
        Ok(etag) => Ok(etag),
        Err(err) => {
            remote.abort_multipart(s3_key, &upload_id).await.ok();
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use local_store::FakeLocalStore;
    use remote_storage::FakeRemoteProvider;

    use super::*;

    #[test]
    fn part_error_formats_with_part_number() {
        let err = PartError {
            part_number: 3,
            message: "boom".to_string(),
        };
        assert_eq!(format!("part {}: {}", err.part_number, err.message), "part 3: boom");
    }

    fn seed_segment(local: &FakeLocalStore, name: &str, body: &[u8], etag: &str) -> ManifestSegment {
        local.seed_object("acct", "segments", name, body, etag, HashMap::new());
        ManifestSegment {
            path: format!("/segments/{name}"),
            bytes: body.len() as u64,
            hash: etag.to_string(),
            range: None,
        }
    }

    #[tokio::test]
    async fn upload_slo_multipart_assembles_parts_in_order() {
        let local = Arc::new(FakeLocalStore::new());
        let manifest = vec![
            seed_segment(&local, "seg1", b"hello-", "4f0e5ee00cfa619160879e514d810da5"),
            seed_segment(&local, "seg2", b"world", "7d793037a0760186574b0282f2f435e7"),
        ];
        let remote = Arc::new(RemoteProvider::Fake(FakeRemoteProvider::new(true)));
        let meta = PutMetadata::default();

        let etag = upload_slo_multipart(remote.clone(), local, "acct".to_string(), "cont".to_string(), "obj1", &manifest, &meta, ReadOptions::default())
            .await
            .unwrap();
        assert!(!etag.is_empty());

        let (_meta, body) = remote.get("obj1").await.unwrap();
        let bytes = collect(body).await.unwrap();
        assert_eq!(&bytes[..], b"hello-world");
    }

    #[tokio::test]
    async fn upload_slo_multipart_aborts_on_etag_mismatch() {
        let local = Arc::new(FakeLocalStore::new());
        let manifest = vec![seed_segment(&local, "seg1", b"hello", "wrong-etag")];
        let remote = Arc::new(RemoteProvider::Fake(FakeRemoteProvider::new(true)));
        let meta = PutMetadata::default();

        let err = upload_slo_multipart(remote, local, "acct".to_string(), "cont".to_string(), "obj1", &manifest, &meta, ReadOptions::default()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn upload_slo_concatenated_preserves_segment_order() {
        let local = Arc::new(FakeLocalStore::new());
        let manifest = vec![
            seed_segment(&local, "seg1", b"foo-", "etag1"),
            seed_segment(&local, "seg2", b"bar", "etag2"),
        ];
        let remote = Arc::new(RemoteProvider::Fake(FakeRemoteProvider::new(false)));

        let etag = upload_slo_concatenated(&remote, local.as_ref(), "acct", "obj1", &manifest, PutMetadata::default(), &ReadOptions::default())
            .await
            .unwrap();
        assert!(!etag.is_empty());

        let (_meta, body) = remote.get("obj1").await.unwrap();
        let bytes = collect(body).await.unwrap();
        assert_eq!(&bytes[..], b"foo-bar");
    }

    #[tokio::test]
    async fn update_slo_metadata_only_reuses_segment_bytes() {
        let manifest = vec![
            ManifestSegment { path: "/segments/seg1".to_string(), bytes: 6, hash: "etag1".to_string(), range: None },
            ManifestSegment { path: "/segments/seg2".to_string(), bytes: 5, hash: "etag2".to_string(), range: None },
        ];
        let provider = RemoteProvider::Fake(FakeRemoteProvider::new(true));
        if let RemoteProvider::Fake(fake) = &provider {
            fake.seed_object("acct/segments/seg1", b"hello-", "etag1", HashMap::new());
            fake.seed_object("acct/segments/seg2", b"world", "etag2", HashMap::new());
        }

        let etag = update_slo_metadata_only(&provider, "acct", "obj1", &manifest, &PutMetadata::default()).await.unwrap();
        assert!(!etag.is_empty());

        let (_meta, body) = provider.get("obj1").await.unwrap();
        let bytes = collect(body).await.unwrap();
        assert_eq!(&bytes[..], b"hello-world");
    }
}
