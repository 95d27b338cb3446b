//! In-memory double for [`LocalStoreApi`], letting the sync worker, migrator,
//! and large-object pipeline be driven end to end in tests without a live
//! native-store endpoint.

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;

use crate::client::{ListingEntry, LocalStoreApi, LocalStoreError, ObjectBodyStream, ReadOptions};
use crate::reader::{BytesReadCounter, CountingStream};
use crate::types::ObjectMetadata;

#[derive(Clone, Default)]
struct FakeObject {
    body: Bytes,
    headers: HashMap<String, String>,
    etag: String,
    last_modified_secs: i64,
}

#[derive(Default)]
struct FakeContainer {
    headers: HashMap<String, String>,
    objects: BTreeMap<String, FakeObject>,
}

#[derive(Default)]
struct FakeState {
    accounts: HashMap<String, HashMap<String, String>>,
    containers: HashMap<(String, String), FakeContainer>,
}

/// An in-memory account/container/object store. Every write bumps an
/// internal logical clock so `ObjectMetadata::last_modified_secs()`
/// and `ListingEntry::last_modified` behave like a real store's
/// monotonically increasing timestamps, without depending on wall-clock time.
pub struct FakeLocalStore {
    state: Mutex<FakeState>,
    clock: AtomicI64,
}

impl Default for FakeLocalStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            clock: AtomicI64::new(1),
        }
    }
}

impl FakeLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    /// Seeds an object directly, bypassing `put_object`, for test setup that
    /// needs to control the resulting etag/headers precisely.
    pub fn seed_object(&self, account: &str, container: &str, name: &str, body: &[u8], etag: &str, headers: HashMap<String, String>) {
        let mut state = self.state.lock().unwrap();
        let last_modified_secs = self.tick();
        let entry = state.containers.entry((account.to_string(), container.to_string())).or_default();
        entry.objects.insert(
            name.to_string(),
            FakeObject {
                body: Bytes::copy_from_slice(body),
                headers,
                etag: etag.to_string(),
                last_modified_secs,
            },
        );
    }
}

fn apply_header_diff(target: &mut HashMap<String, String>, diff: &HashMap<String, String>) {
    for (k, v) in diff {
        if v.is_empty() {
            target.remove(k);
        } else {
            target.insert(k.clone(), v.clone());
        }
    }
}

fn format_rfc3339(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339()).unwrap_or_default()
}

fn meta_from_object(obj: &FakeObject) -> ObjectMetadata {
    ObjectMetadata {
        etag: obj.etag.clone(),
        content_length: obj.body.len() as u64,
        last_modified_ns: obj.last_modified_secs as i128 * 1_000_000_000,
        headers: obj.headers.clone(),
    }
}

/// Wraps a whole body in a one-chunk stream, for tests driving `put_object`
/// against a [`FakeLocalStore`] without standing up a real byte stream.
pub fn body_from_bytes(body: Bytes) -> ObjectBodyStream {
    let chunk: std::io::Result<Bytes> = Ok(body);
    Box::pin(futures::stream::iter(vec![chunk])) as Pin<Box<_>>
}

#[async_trait::async_trait]
impl LocalStoreApi for FakeLocalStore {
    async fn head_account(&self, account: &str) -> Result<HashMap<String, String>, LocalStoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.accounts.get(account).cloned().unwrap_or_default())
    }

    async fn post_account(&self, account: &str, headers: &HashMap<String, String>) -> Result<(), LocalStoreError> {
        let mut state = self.state.lock().unwrap();
        let entry = state.accounts.entry(account.to_string()).or_default();
        apply_header_diff(entry, headers);
        Ok(())
    }

    async fn head_container(&self, account: &str, container: &str) -> Result<Option<HashMap<String, String>>, LocalStoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.containers.get(&(account.to_string(), container.to_string())).map(|c| c.headers.clone()))
    }

    async fn post_container(&self, account: &str, container: &str, headers: &HashMap<String, String>) -> Result<(), LocalStoreError> {
        let mut state = self.state.lock().unwrap();
        let key = (account.to_string(), container.to_string());
        let entry = state.containers.get_mut(&key).ok_or(LocalStoreError::NotFound)?;
        apply_header_diff(&mut entry.headers, headers);
        Ok(())
    }

    async fn put_container(&self, account: &str, container: &str) -> Result<(), LocalStoreError> {
        let mut state = self.state.lock().unwrap();
        state.containers.entry((account.to_string(), container.to_string())).or_default();
        Ok(())
    }

    async fn delete_container(&self, account: &str, container: &str) -> Result<(), LocalStoreError> {
        let mut state = self.state.lock().unwrap();
        state.containers.remove(&(account.to_string(), container.to_string()));
        Ok(())
    }

    async fn list_container(&self, account: &str, container: &str, marker: Option<&str>, limit: usize) -> Result<Vec<ListingEntry>, LocalStoreError> {
        let state = self.state.lock().unwrap();
        let c = state
            .containers
            .get(&(account.to_string(), container.to_string()))
            .ok_or(LocalStoreError::NotFound)?;
        Ok(c.objects
            .iter()
            .filter(|(name, _)| marker.map(|m| name.as_str() > m).unwrap_or(true))
            .take(limit)
            .map(|(name, obj)| ListingEntry {
                name: name.clone(),
                hash: obj.etag.clone(),
                bytes: obj.body.len() as u64,
                last_modified: format_rfc3339(obj.last_modified_secs),
            })
            .collect())
    }

    async fn head_object(&self, account: &str, container: &str, name: &str, _opts: &ReadOptions) -> Result<Option<ObjectMetadata>, LocalStoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .get(&(account.to_string(), container.to_string()))
            .and_then(|c| c.objects.get(name))
            .map(meta_from_object))
    }

    async fn get_object(
        &self,
        account: &str,
        container: &str,
        name: &str,
        _opts: &ReadOptions,
    ) -> Result<(ObjectMetadata, ObjectBodyStream, BytesReadCounter), LocalStoreError> {
        let obj = {
            let state = self.state.lock().unwrap();
            state
                .containers
                .get(&(account.to_string(), container.to_string()))
                .and_then(|c| c.objects.get(name))
                .cloned()
                .ok_or(LocalStoreError::NotFound)?
        };
        let meta = meta_from_object(&obj);
        let (stream, counter) = CountingStream::new(futures::stream::iter(vec![Ok::<Bytes, std::io::Error>(obj.body)]));
        Ok((meta, Box::pin(stream), counter))
    }

    async fn get_raw_manifest(&self, account: &str, container: &str, name: &str) -> Result<Bytes, LocalStoreError> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(&(account.to_string(), container.to_string()))
            .and_then(|c| c.objects.get(name))
            .map(|obj| obj.body.clone())
            .ok_or(LocalStoreError::NotFound)
    }

    async fn put_object(
        &self,
        account: &str,
        container: &str,
        name: &str,
        body: ObjectBodyStream,
        _content_length: u64,
        headers: &HashMap<String, String>,
    ) -> Result<String, LocalStoreError> {
        use futures::StreamExt;
        let mut buf = Vec::new();
        let mut body = body;
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk.map_err(|e| LocalStoreError::Transient(anyhow::anyhow!(e)))?);
        }
        let etag = format!("{:x}", md5::compute(&buf));
        let last_modified_secs = self.tick();
        let mut state = self.state.lock().unwrap();
        let entry = state.containers.entry((account.to_string(), container.to_string())).or_default();
        entry.objects.insert(
            name.to_string(),
            FakeObject {
                body: Bytes::from(buf),
                headers: headers.clone(),
                etag: etag.clone(),
                last_modified_secs,
            },
        );
        Ok(etag)
    }

    async fn post_object(&self, account: &str, container: &str, name: &str, headers: &HashMap<String, String>) -> Result<(), LocalStoreError> {
        let mut state = self.state.lock().unwrap();
        let obj = state
            .containers
            .get_mut(&(account.to_string(), container.to_string()))
            .and_then(|c| c.objects.get_mut(name))
            .ok_or(LocalStoreError::NotFound)?;
        apply_header_diff(&mut obj.headers, headers);
        Ok(())
    }

    async fn delete_object(&self, account: &str, container: &str, name: &str) -> Result<(), LocalStoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.containers.get_mut(&(account.to_string(), container.to_string())) {
            c.objects.remove(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_head_round_trips_headers() {
        let store = FakeLocalStore::new();
        store.put_container("acct", "cont").await.unwrap();
        let mut headers = HashMap::new();
        headers.insert("x-object-meta-color".to_string(), "blue".to_string());
        store
            .put_object("acct", "cont", "obj", body_from_bytes(Bytes::from_static(b"hello")), 5, &headers)
            .await
            .unwrap();
        let meta = store.head_object("acct", "cont", "obj", &ReadOptions::default()).await.unwrap().unwrap();
        assert_eq!(meta.headers.get("x-object-meta-color"), Some(&"blue".to_string()));
        assert_eq!(meta.content_length, 5);
    }

    #[tokio::test]
    async fn missing_container_listing_is_not_found() {
        let store = FakeLocalStore::new();
        assert!(matches!(
            store.list_container("acct", "missing", None, 10).await,
            Err(LocalStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn post_object_deletes_header_on_empty_value() {
        let store = FakeLocalStore::new();
        store.put_container("acct", "cont").await.unwrap();
        let mut headers = HashMap::new();
        headers.insert("x-object-meta-color".to_string(), "blue".to_string());
        store
            .put_object("acct", "cont", "obj", body_from_bytes(Bytes::from_static(b"hi")), 2, &headers)
            .await
            .unwrap();

        let mut clear = HashMap::new();
        clear.insert("x-object-meta-color".to_string(), String::new());
        store.post_object("acct", "cont", "obj", &clear).await.unwrap();

        let meta = store.head_object("acct", "cont", "obj", &ReadOptions::default()).await.unwrap().unwrap();
        assert!(!meta.headers.contains_key("x-object-meta-color"));
    }
}
