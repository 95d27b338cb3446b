//! In-memory stand-in for a remote bucket/container, letting the sync
//! worker, large-object pipeline, and migrator be exercised in tests without
//! a live S3-compatible or native-peer endpoint.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use futures::TryStreamExt;

use crate::error::ProviderError;
use crate::{BodyStream, CompletedPart, ListingEntry, ListingPage, PutMetadata, RemoteObjectMeta};

#[derive(Clone)]
struct FakeObject {
    body: Bytes,
    etag: String,
    content_type: Option<String>,
    user_metadata: HashMap<String, String>,
    last_modified: SystemTime,
    storage_class: Option<String>,
}

struct FakeUpload {
    key: String,
    meta: PutMetadata,
    parts: BTreeMap<i32, Bytes>,
}

struct FakeState {
    objects: BTreeMap<String, FakeObject>,
    container_headers: Option<HashMap<String, String>>,
    account_headers: HashMap<String, String>,
    uploads: HashMap<String, FakeUpload>,
}

/// Backs [`crate::RemoteProvider::Fake`]. Every write advances an internal
/// logical clock so `ListingEntry::last_modified` behaves like a real
/// store's monotonically increasing timestamps, without depending on
/// wall-clock time.
pub struct FakeRemoteProvider {
    state: Mutex<FakeState>,
    clock: AtomicU64,
    multipart: bool,
    next_upload_id: AtomicU64,
}

impl FakeRemoteProvider {
    pub fn new(multipart: bool) -> Self {
        Self {
            state: Mutex::new(FakeState {
                objects: BTreeMap::new(),
                container_headers: Some(HashMap::new()),
                account_headers: HashMap::new(),
                uploads: HashMap::new(),
            }),
            clock: AtomicU64::new(1),
            multipart,
            next_upload_id: AtomicU64::new(1),
        }
    }

    fn tick(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.clock.fetch_add(1, Ordering::SeqCst))
    }

    /// Directly seeds an object, for test setup, bypassing `put`.
    pub fn seed_object(&self, key: &str, body: &[u8], etag: &str, user_metadata: HashMap<String, String>) {
        let mut state = self.state.lock().unwrap();
        let last_modified = self.tick();
        state.objects.insert(
            key.to_string(),
            FakeObject {
                body: Bytes::copy_from_slice(body),
                etag: etag.to_string(),
                content_type: None,
                user_metadata,
                last_modified,
                storage_class: None,
            },
        );
    }

    /// Simulates the remote container itself having been deleted, for
    /// migrator "container lifecycle" tests.
    pub fn delete_container(&self) {
        self.state.lock().unwrap().container_headers = None;
    }

    pub fn set_account_headers(&self, headers: HashMap<String, String>) {
        self.state.lock().unwrap().account_headers = headers;
    }

    pub fn set_container_headers(&self, headers: HashMap<String, String>) {
        self.state.lock().unwrap().container_headers = Some(headers);
    }

    pub fn supports_multipart(&self) -> bool {
        self.multipart
    }

    pub async fn list(&self, prefix: Option<&str>, marker: Option<&str>, max_keys: i32) -> Result<ListingPage, ProviderError> {
        let state = self.state.lock().unwrap();
        let entries: Vec<ListingEntry> = state
            .objects
            .iter()
            .filter(|(key, _)| prefix.map(|p| key.starts_with(p)).unwrap_or(true))
            .filter(|(key, _)| marker.map(|m| key.as_str() > m).unwrap_or(true))
            .take(max_keys.max(0) as usize)
            .map(|(key, obj)| ListingEntry {
                key: key.clone(),
                etag: obj.etag.clone(),
                size: obj.body.len() as u64,
                last_modified: obj.last_modified,
            })
            .collect();
        let next_marker = entries.last().map(|e| e.key.clone());
        Ok(ListingPage { entries, next_marker })
    }

    pub async fn head(&self, key: &str) -> Result<Option<RemoteObjectMeta>, ProviderError> {
        let state = self.state.lock().unwrap();
        Ok(state.objects.get(key).map(meta_from_object))
    }

    pub async fn get(&self, key: &str) -> Result<(RemoteObjectMeta, BodyStream), ProviderError> {
        let obj = {
            let state = self.state.lock().unwrap();
            state.objects.get(key).cloned().ok_or(ProviderError::NotFound)?
        };
        let meta = meta_from_object(&obj);
        Ok((meta, crate::body_from_bytes(obj.body)))
    }

    pub async fn put(&self, key: &str, body: BodyStream, _content_length: u64, meta: &PutMetadata) -> Result<String, ProviderError> {
        let bytes = collect(body).await?;
        let etag = format!("{:x}", md5::compute(&bytes));
        let last_modified = self.tick();
        let mut state = self.state.lock().unwrap();
        state.objects.insert(
            key.to_string(),
            FakeObject {
                body: bytes,
                etag: etag.clone(),
                content_type: meta.content_type.clone(),
                user_metadata: meta.user_metadata.clone(),
                last_modified,
                storage_class: None,
            },
        );
        Ok(etag)
    }

    pub async fn post_metadata(&self, key: &str, meta: &PutMetadata) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        let obj = state.objects.get_mut(key).ok_or(ProviderError::NotFound)?;
        obj.content_type = meta.content_type.clone();
        obj.user_metadata = meta.user_metadata.clone();
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.objects.remove(key).is_none() {
            return Err(ProviderError::NotFound);
        }
        Ok(())
    }

    pub async fn create_multipart(&self, key: &str, meta: &PutMetadata) -> Result<String, ProviderError> {
        if !self.multipart {
            return Err(ProviderError::Permanent(anyhow::anyhow!("fake provider configured without multipart support")));
        }
        let upload_id = format!("fake-upload-{}", self.next_upload_id.fetch_add(1, Ordering::SeqCst));
        let mut state = self.state.lock().unwrap();
        state.uploads.insert(
            upload_id.clone(),
            FakeUpload {
                key: key.to_string(),
                meta: meta.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    pub async fn upload_part(&self, _key: &str, upload_id: &str, part_number: i32, body: Bytes, _content_md5: Option<&str>) -> Result<String, ProviderError> {
        let etag = format!("{:x}", md5::compute(&body));
        let mut state = self.state.lock().unwrap();
        let upload = state.uploads.get_mut(upload_id).ok_or(ProviderError::NotFound)?;
        upload.parts.insert(part_number, body);
        Ok(etag)
    }

    pub async fn upload_part_copy(&self, _key: &str, upload_id: &str, part_number: i32, source_key: &str, byte_range: (u64, u64)) -> Result<String, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let source = state.objects.get(source_key).cloned().ok_or(ProviderError::NotFound)?;
        let (start, end) = byte_range;
        let slice = source
            .body
            .get(start as usize..=(end as usize).min(source.body.len().saturating_sub(1)))
            .ok_or_else(|| ProviderError::Permanent(anyhow::anyhow!("byte range {start}-{end} out of bounds for {source_key}")))?
            .to_vec();
        let etag = format!("{:x}", md5::compute(&slice));
        let upload = state.uploads.get_mut(upload_id).ok_or(ProviderError::NotFound)?;
        upload.parts.insert(part_number, Bytes::from(slice));
        Ok(etag)
    }

    pub async fn complete_multipart(&self, key: &str, upload_id: &str, parts: &[CompletedPart]) -> Result<String, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let upload = state.uploads.remove(upload_id).ok_or(ProviderError::NotFound)?;
        let mut body = Vec::new();
        for part in parts {
            let chunk = upload.parts.get(&part.part_number).ok_or(ProviderError::NotFound)?;
            body.extend_from_slice(chunk);
        }
        let etag = format!("{:x}-{}", md5::compute(&body), parts.len());
        let last_modified = self.tick();
        state.objects.insert(
            key.to_string(),
            FakeObject {
                body: Bytes::from(body),
                etag: etag.clone(),
                content_type: upload.meta.content_type,
                user_metadata: upload.meta.user_metadata,
                last_modified,
                storage_class: None,
            },
        );
        let _ = upload.key;
        Ok(etag)
    }

    pub async fn abort_multipart(&self, _key: &str, upload_id: &str) -> Result<(), ProviderError> {
        self.state.lock().unwrap().uploads.remove(upload_id);
        Ok(())
    }

    pub async fn head_container_headers(&self) -> Result<Option<HashMap<String, String>>, ProviderError> {
        Ok(self.state.lock().unwrap().container_headers.clone())
    }

    pub async fn head_account_headers(&self) -> Result<HashMap<String, String>, ProviderError> {
        Ok(self.state.lock().unwrap().account_headers.clone())
    }
}

fn meta_from_object(obj: &FakeObject) -> RemoteObjectMeta {
    RemoteObjectMeta {
        etag: obj.etag.clone(),
        content_length: obj.body.len() as u64,
        content_type: obj.content_type.clone(),
        user_metadata: obj.user_metadata.clone(),
        last_modified: Some(obj.last_modified),
        storage_class: obj.storage_class.clone(),
    }
}

async fn collect(body: BodyStream) -> Result<Bytes, ProviderError> {
    let mut buf = Vec::new();
    let mut body = body;
    while let Some(chunk) = body.try_next().await.map_err(|e| ProviderError::Transient(anyhow::anyhow!(e)))? {
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_head_round_trips() {
        let fake = FakeRemoteProvider::new(true);
        let meta = PutMetadata::default();
        fake.put("key1", crate::body_from_bytes(Bytes::from_static(b"hello")), 5, &meta).await.unwrap();
        let head = fake.head("key1").await.unwrap().unwrap();
        assert_eq!(head.content_length, 5);
    }

    #[tokio::test]
    async fn missing_object_head_is_none() {
        let fake = FakeRemoteProvider::new(true);
        assert!(fake.head("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn multipart_upload_round_trips_body() {
        let fake = FakeRemoteProvider::new(true);
        let meta = PutMetadata::default();
        let upload_id = fake.create_multipart("big", &meta).await.unwrap();
        fake.upload_part("big", &upload_id, 1, Bytes::from_static(b"part-one-"), None).await.unwrap();
        fake.upload_part("big", &upload_id, 2, Bytes::from_static(b"part-two"), None).await.unwrap();
        let parts = vec![
            CompletedPart { part_number: 1, etag: String::new() },
            CompletedPart { part_number: 2, etag: String::new() },
        ];
        fake.complete_multipart("big", &upload_id, &parts).await.unwrap();
        let (_meta, body) = fake.get("big").await.unwrap();
        let bytes = collect(body).await.unwrap();
        assert_eq!(&bytes[..], b"part-one-part-two");
    }

    #[tokio::test]
    async fn deleted_container_reports_none() {
        let fake = FakeRemoteProvider::new(true);
        assert!(fake.head_container_headers().await.unwrap().is_some());
        fake.delete_container();
        assert!(fake.head_container_headers().await.unwrap().is_none());
    }
}
