//! Migrator (§4.3): paginated reconciliation from a remote bucket into a
//! local container, with deletion propagation and container/account
//! metadata diffing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use local_store::{LocalStoreApi, ReadOptions};
use remote_storage::RemoteProvider;
use status_store::{MigrationStatus, StatusStore};
use tracing::{info, info_span, warn, Instrument};

use crate::errors::CoreError;

const MIGRATOR_ORIGIN_HEADER: &str = local_store::MIGRATOR_ORIGIN_HEADER;
const MIGRATOR_MIGRATED_AT_HEADER: &str = local_store::MIGRATOR_MIGRATED_AT_HEADER;
const CONTAINER_MIGRATOR_ORIGIN_HEADER: &str = local_store::CONTAINER_MIGRATOR_ORIGIN_HEADER;
const VERSIONS_LOCATION_HEADER: &str = "x-versions-location";
const HISTORY_LOCATION_HEADER: &str = "x-history-location";
const VERSIONS_SYSMETA_LOCATION: &str = "x-container-sysmeta-versions-location";
const VERSIONS_SYSMETA_MODE: &str = "x-container-sysmeta-versions-mode";
const ACCOUNT_ACL_HEADER: &str = "x-account-access-control";
const ACCOUNT_ACL_SYSMETA: &str = "x-account-sysmeta-core-access-control";
const TEMP_URL_KEY_HEADER: &str = "x-account-meta-temp-url-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryComparison {
    Equal,
    RemoteNewer,
    LocalNewer,
}

/// A name-keyed entry carrying just what the merge-walk and `cmp_object_entries`
/// need, independent of which side (`remote_storage::ListingEntry` vs
/// `local_store::ListingEntry`) it came from.
#[derive(Debug, Clone)]
pub struct ComparableEntry {
    pub name: String,
    pub hash: String,
    pub last_modified_secs: i64,
}

/// §8: equal `{last_modified, hash}` -> `Equal`; equal `last_modified`,
/// unequal `hash` -> a hard consistency error; otherwise newer side wins.
pub fn cmp_object_entries(remote: &ComparableEntry, local: &ComparableEntry) -> Result<EntryComparison, CoreError> {
    if remote.last_modified_secs == local.last_modified_secs {
        if remote.hash == local.hash {
            return Ok(EntryComparison::Equal);
        }
        return Err(CoreError::Consistency(anyhow::anyhow!(
            "object {} has matching last-modified ({}) but mismatched hash (remote {}, local {})",
            remote.name,
            remote.last_modified_secs,
            remote.hash,
            local.hash
        )));
    }
    if remote.last_modified_secs > local.last_modified_secs {
        Ok(EntryComparison::RemoteNewer)
    } else {
        Ok(EntryComparison::LocalNewer)
    }
}

/// Header changes required to make `local` reflect `remote` (§4.3
/// `diff_container_headers`). Values of `""` mean "delete this header" in
/// the native store's POST semantics.
pub fn diff_container_headers(local: &HashMap<String, String>, remote: &HashMap<String, String>) -> HashMap<String, String> {
    let mut diff = HashMap::new();

    for (key, local_value) in local {
        if key.starts_with("x-container-meta-") && !remote.contains_key(key) {
            diff.insert(key.clone(), String::new());
        } else if let Some(remote_value) = remote.get(key) {
            if remote_value != local_value {
                diff.insert(key.clone(), remote_value.clone());
            }
        }
    }
    for (key, remote_value) in remote {
        if key.starts_with("x-container-meta-") && !diff.contains_key(key) && local.get(key) != Some(remote_value) {
            diff.insert(key.clone(), remote_value.clone());
        }
    }

    if let Some(versions) = remote.get(VERSIONS_LOCATION_HEADER) {
        if local.get(VERSIONS_SYSMETA_LOCATION) != Some(versions) {
            diff.insert(VERSIONS_SYSMETA_LOCATION.to_string(), versions.clone());
            diff.insert(VERSIONS_SYSMETA_MODE.to_string(), "stack".to_string());
        }
    }
    if let Some(history) = remote.get(HISTORY_LOCATION_HEADER) {
        if local.get(VERSIONS_SYSMETA_LOCATION) != Some(history) {
            diff.insert(VERSIONS_SYSMETA_LOCATION.to_string(), history.clone());
            diff.insert(VERSIONS_SYSMETA_MODE.to_string(), "history".to_string());
        }
    }

    diff
}

/// As [`diff_container_headers`], plus the account-level ACL and temp-url
/// translations (§4.3 `diff_account_headers`).
pub fn diff_account_headers(local: &HashMap<String, String>, remote: &HashMap<String, String>) -> HashMap<String, String> {
    let mut diff = container_style_diff(local, remote, "x-account-meta-");

    match remote.get(ACCOUNT_ACL_HEADER) {
        Some(acl) if local.get(ACCOUNT_ACL_SYSMETA) != Some(acl) => {
            diff.insert(ACCOUNT_ACL_SYSMETA.to_string(), acl.clone());
        }
        None if local.contains_key(ACCOUNT_ACL_SYSMETA) => {
            diff.insert(ACCOUNT_ACL_SYSMETA.to_string(), String::new());
        }
        _ => {}
    }

    if let Some(temp_url_key) = remote.get(TEMP_URL_KEY_HEADER) {
        if local.get(TEMP_URL_KEY_HEADER) != Some(temp_url_key) {
            diff.insert(TEMP_URL_KEY_HEADER.to_string(), temp_url_key.clone());
        }
    }

    diff
}

fn container_style_diff(local: &HashMap<String, String>, remote: &HashMap<String, String>, prefix: &str) -> HashMap<String, String> {
    let mut diff = HashMap::new();
    for (key, local_value) in local {
        if key.starts_with(prefix) {
            match remote.get(key) {
                Some(remote_value) if remote_value != local_value => {
                    diff.insert(key.clone(), remote_value.clone());
                }
                None => {
                    diff.insert(key.clone(), String::new());
                }
                _ => {}
            }
        }
    }
    for (key, remote_value) in remote {
        if key.starts_with(prefix) && !diff.contains_key(key) && local.get(key) != Some(remote_value) {
            diff.insert(key.clone(), remote_value.clone());
        }
    }
    diff
}

pub struct PassSummary {
    pub moved_count: u64,
    pub scanned_count: u64,
}

pub struct Migrator {
    pub local: Arc<dyn LocalStoreApi>,
    pub remote: Arc<RemoteProvider>,
    pub status: Arc<StatusStore>,
    pub local_account: String,
    pub local_container: String,
    pub items_chunk: usize,
}

impl Migrator {
    pub async fn run_pass(&self, now_unix_secs: i64) -> Result<PassSummary, CoreError> {
        let span = info_span!("migration_pass", account = %self.local_account, container = %self.local_container);
        self.run_pass_inner(now_unix_secs).instrument(span).await
    }

    async fn run_pass_inner(&self, now_unix_secs: i64) -> Result<PassSummary, CoreError> {
        let mut status = self.status.load_migration_status(&self.local_account, &self.local_container).await?;

        let Some(remote_container_headers) = self.remote.head_container_headers().await? else {
            return self.handle_remote_container_gone().await;
        };

        self.ensure_local_container().await?;
        self.reconcile_container_metadata(&remote_container_headers).await?;
        self.reconcile_account_metadata().await?;

        let remote_page = self.remote.list(None, status.marker.as_deref(), self.items_chunk as i32).await?;
        let local_page = self
            .local
            .list_container(&self.local_account, &self.local_container, status.marker.as_deref(), self.items_chunk)
            .await
            .or_else(|err| match err {
                local_store::LocalStoreError::NotFound => Ok(Vec::new()),
                other => Err(other),
            })?;

        let short_page = remote_page.entries.len() < self.items_chunk;

        let mut segments_seen: HashSet<String> = HashSet::new();
        let mut moved = 0u64;
        let mut scanned = 0u64;
        let mut last_seen_key = status.marker.clone();

        let mut remote_iter = remote_page.entries.into_iter().peekable();
        let mut local_iter = local_page.into_iter().peekable();

        loop {
            match (remote_iter.peek(), local_iter.peek()) {
                (None, None) => break,
                (Some(remote_entry), None) => {
                    scanned += 1;
                    last_seen_key = Some(remote_entry.key.clone());
                    moved += self.copy_remote_object(&remote_entry.key, &mut segments_seen).await?;
                    remote_iter.next();
                }
                (None, Some(local_entry)) => {
                    scanned += 1;
                    self.maybe_delete_local(&local_entry.name).await?;
                    local_iter.next();
                }
                (Some(remote_entry), Some(local_entry)) => {
                    scanned += 1;
                    match remote_entry.key.cmp(&local_entry.name) {
                        std::cmp::Ordering::Less => {
                            last_seen_key = Some(remote_entry.key.clone());
                            moved += self.copy_remote_object(&remote_entry.key, &mut segments_seen).await?;
                            remote_iter.next();
                        }
                        std::cmp::Ordering::Greater => {
                            self.maybe_delete_local(&local_entry.name).await?;
                            local_iter.next();
                        }
                        std::cmp::Ordering::Equal => {
                            let remote_last_modified = remote_entry.last_modified.duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0);
                            let local_last_modified = parse_last_modified_secs(&local_entry.last_modified);
                            let comparison = cmp_object_entries(
                                &ComparableEntry {
                                    name: remote_entry.key.clone(),
                                    hash: remote_entry.etag.clone(),
                                    last_modified_secs: remote_last_modified,
                                },
                                &ComparableEntry {
                                    name: local_entry.name.clone(),
                                    hash: local_entry.hash.clone(),
                                    last_modified_secs: local_last_modified,
                                },
                            )?;
                            last_seen_key = Some(remote_entry.key.clone());
                            if comparison == EntryComparison::RemoteNewer {
                                moved += self.copy_remote_object(&remote_entry.key, &mut segments_seen).await?;
                            }
                            remote_iter.next();
                            local_iter.next();
                        }
                    }
                }
            }
        }

        status.advance(last_seen_key, moved, scanned, short_page, now_unix_secs);
        self.status.save_migration_status(&self.local_account, &self.local_container, &status).await?;

        Ok(PassSummary { moved_count: moved, scanned_count: scanned })
    }

    async fn ensure_local_container(&self) -> Result<(), CoreError> {
        if self.local.head_container(&self.local_account, &self.local_container).await?.is_none() {
            self.local.put_container(&self.local_account, &self.local_container).await?;
            let mut origin = HashMap::new();
            origin.insert(CONTAINER_MIGRATOR_ORIGIN_HEADER.to_string(), "true".to_string());
            self.local.post_container(&self.local_account, &self.local_container, &origin).await?;
        }
        Ok(())
    }

    /// Brings the local container's own headers in line with the remote's
    /// (§4.3 "Container metadata diff"), stamping the migrator-origin marker
    /// whenever it actually writes a diff so `handle_remote_container_gone`
    /// can later tell a migrator-managed container apart from one that
    /// predates migration.
    async fn reconcile_container_metadata(&self, remote_headers: &HashMap<String, String>) -> Result<(), CoreError> {
        let local_headers = self
            .local
            .head_container(&self.local_account, &self.local_container)
            .await?
            .unwrap_or_default();
        let mut diff = diff_container_headers(&local_headers, remote_headers);
        if diff.is_empty() {
            return Ok(());
        }
        diff.insert(CONTAINER_MIGRATOR_ORIGIN_HEADER.to_string(), "true".to_string());
        self.local.post_container(&self.local_account, &self.local_container, &diff).await?;
        Ok(())
    }

    /// As [`Self::reconcile_container_metadata`], for the account (§4.3
    /// "Account metadata diff").
    async fn reconcile_account_metadata(&self) -> Result<(), CoreError> {
        let remote_headers = self.remote.head_account_headers().await?;
        let local_headers = self.local.head_account(&self.local_account).await?;
        let diff = diff_account_headers(&local_headers, &remote_headers);
        if diff.is_empty() {
            return Ok(());
        }
        self.local.post_account(&self.local_account, &diff).await?;
        Ok(())
    }

    /// The remote container has disappeared (§4.3 "Container lifecycle"):
    /// prune every migrator-origin, unmodified-since-migration object from
    /// the local mirror, then delete the local container itself only if it
    /// ends up empty of anything the migrator didn't itself put there.
    async fn handle_remote_container_gone(&self) -> Result<PassSummary, CoreError> {
        let Some(local_headers) = self.local.head_container(&self.local_account, &self.local_container).await? else {
            return Ok(PassSummary { moved_count: 0, scanned_count: 0 });
        };

        let mut marker = None;
        let mut scanned = 0u64;
        let mut everything_prunable = true;
        loop {
            let page = self
                .local
                .list_container(&self.local_account, &self.local_container, marker.as_deref(), self.items_chunk)
                .await?;
            if page.is_empty() {
                break;
            }
            let short_page = page.len() < self.items_chunk;
            for entry in &page {
                scanned += 1;
                if !self.maybe_delete_local(&entry.name).await? {
                    everything_prunable = false;
                }
            }
            marker = page.last().map(|e| e.name.clone());
            if short_page {
                break;
            }
        }

        let is_migrator_managed = local_headers.contains_key(CONTAINER_MIGRATOR_ORIGIN_HEADER);
        let has_foreign_metadata = local_headers.keys().any(|k| k.starts_with("x-container-meta-"));

        if everything_prunable && is_migrator_managed && !has_foreign_metadata {
            self.local.delete_container(&self.local_account, &self.local_container).await?;
            info!(account = %self.local_account, container = %self.local_container, "remote container gone, local mirror pruned and deleted");
        }

        Ok(PassSummary { moved_count: 0, scanned_count: scanned })
    }

    /// Copies one remote object (and, for a Dynamic Large Object, its segment
    /// container recursively, deduplicated within the pass) into the local
    /// container. Returns the number of objects actually copied.
    async fn copy_remote_object(&self, remote_key: &str, segments_seen: &mut HashSet<String>) -> Result<u64, CoreError> {
        let (meta, body) = self.remote.get(remote_key).await?;
        let mut copied = 1u64;

        if let Some(manifest_location) = meta.user_metadata.get(remote_storage::metadata::MANIFEST_META_KEY) {
            if let Some(local_store::LargeObjectKind::Dynamic { container, prefix }) = local_store::parse_dlo_manifest(manifest_location) {
                if segments_seen.insert(container.clone()) {
                    copied += self.copy_segment_container(&container, &prefix).await?;
                }
            }
        }

        let mut headers = meta.user_metadata.clone();
        if let Some(content_type) = &meta.content_type {
            headers.insert("content-type".to_string(), content_type.clone());
        }
        headers.insert(MIGRATOR_ORIGIN_HEADER.to_string(), "true".to_string());

        self.local
            .put_object(&self.local_account, &self.local_container, remote_key, body, meta.content_length, &headers)
            .await?;
        self.stamp_migrated_at(&self.local_container, remote_key).await?;
        Ok(copied)
    }

    /// Copies every object in a remote DLO segment container into a like-named
    /// local container, used once per distinct segment container per pass.
    async fn copy_segment_container(&self, container: &str, prefix: &str) -> Result<u64, CoreError> {
        if self.local.head_container(&self.local_account, container).await?.is_none() {
            self.local.put_container(&self.local_account, container).await?;
        }

        let mut copied = 0u64;
        let mut marker = None;
        loop {
            let page = self.remote.list(Some(prefix), marker.as_deref(), self.items_chunk as i32).await?;
            if page.entries.is_empty() {
                break;
            }
            for entry in &page.entries {
                let (meta, body) = self.remote.get(&entry.key).await?;
                let mut headers = meta.user_metadata.clone();
                headers.insert(MIGRATOR_ORIGIN_HEADER.to_string(), "true".to_string());
                self.local
                    .put_object(&self.local_account, container, &entry.key, body, meta.content_length, &headers)
                    .await?;
                self.stamp_migrated_at(container, &entry.key).await?;
                copied += 1;
            }
            marker = page.next_marker;
            if marker.is_none() {
                break;
            }
        }
        Ok(copied)
    }

    /// Records the object's own (server-assigned) Last-Modified at write time
    /// as its migration timestamp via a metadata-only POST, which the native
    /// store does not treat as a data change. Comparing this stamp against a
    /// later `last_modified_secs()` is how `maybe_delete_local` tells an
    /// untouched migrated object apart from one modified since (§4.3
    /// "Deletion propagation" condition (b)), without racing the migrator's
    /// own clock against the store's.
    async fn stamp_migrated_at(&self, container: &str, name: &str) -> Result<(), CoreError> {
        let read_opts = ReadOptions::default();
        let written = self.local.head_object(&self.local_account, container, name, &read_opts).await?;
        let Some(written) = written else {
            return Ok(());
        };
        let mut stamp = HashMap::new();
        stamp.insert(MIGRATOR_MIGRATED_AT_HEADER.to_string(), written.last_modified_secs().to_string());
        self.local.post_object(&self.local_account, container, name, &stamp).await?;
        Ok(())
    }

    /// Deletes a local-only object only if it carries the migrator-origin
    /// marker and has not been modified since it was migrated (§4.3
    /// "Deletion propagation"). Returns whether the object is now gone
    /// (already absent, or deleted by this call).
    async fn maybe_delete_local(&self, name: &str) -> Result<bool, CoreError> {
        let read_opts = ReadOptions::default();
        let local_meta = match self.local.head_object(&self.local_account, &self.local_container, name, &read_opts).await? {
            Some(meta) => meta,
            None => return Ok(true),
        };
        if !local_meta.has_migrator_origin() {
            return Ok(false);
        }
        if local_meta.migrated_at_secs() != Some(local_meta.last_modified_secs()) {
            info!(name, "local object modified since migration, retaining");
            return Ok(false);
        }
        match self.local.delete_object(&self.local_account, &self.local_container, name).await {
            Ok(()) => {
                info!(name, "deleted local object absent from remote");
                Ok(true)
            }
            Err(err) => {
                warn!(name, error = %err, "failed to delete local-only migrator-origin object");
                Err(err.into())
            }
        }
    }
}

fn parse_last_modified_secs(rfc_like: &str) -> i64 {
    // The native store's listing returns an ISO-8601-ish timestamp; only
    // whole-second resolution matters for the newest-wins comparison (§4.3).
    chrono::DateTime::parse_from_rfc3339(rfc_like).map(|dt| dt.timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, hash: &str, secs: i64) -> ComparableEntry {
        ComparableEntry {
            name: name.to_string(),
            hash: hash.to_string(),
            last_modified_secs: secs,
        }
    }

    #[test]
    fn equal_hash_and_time_is_equal() {
        let r = entry("a", "h1", 100);
        let l = entry("a", "h1", 100);
        assert_eq!(cmp_object_entries(&r, &l).unwrap(), EntryComparison::Equal);
    }

    #[test]
    fn equal_time_mismatched_hash_is_consistency_error() {
        let r = entry("a", "h1", 100);
        let l = entry("a", "h2", 100);
        assert!(matches!(cmp_object_entries(&r, &l), Err(CoreError::Consistency(_))));
    }

    #[test]
    fn remote_strictly_newer_wins() {
        let r = entry("a", "h1", 200);
        let l = entry("a", "h2", 100);
        assert_eq!(cmp_object_entries(&r, &l).unwrap(), EntryComparison::RemoteNewer);
    }

    #[test]
    fn local_strictly_newer_wins() {
        let r = entry("a", "h1", 100);
        let l = entry("a", "h2", 200);
        assert_eq!(cmp_object_entries(&r, &l).unwrap(), EntryComparison::LocalNewer);
    }

    #[test]
    fn diff_container_headers_is_idempotent() {
        let mut local = HashMap::new();
        local.insert("x-container-meta-color".to_string(), "blue".to_string());
        let mut remote = HashMap::new();
        remote.insert("x-container-meta-color".to_string(), "red".to_string());

        let diff = diff_container_headers(&local, &remote);
        assert_eq!(diff.get("x-container-meta-color"), Some(&"red".to_string()));

        for (k, v) in &diff {
            local.insert(k.clone(), v.clone());
        }
        let second_diff = diff_container_headers(&local, &remote);
        assert!(second_diff.is_empty());
    }

    #[test]
    fn diff_container_headers_deletes_local_only_keys() {
        let mut local = HashMap::new();
        local.insert("x-container-meta-stale".to_string(), "old".to_string());
        let remote = HashMap::new();
        let diff = diff_container_headers(&local, &remote);
        assert_eq!(diff.get("x-container-meta-stale"), Some(&String::new()));
    }

    #[test]
    fn diff_container_headers_translates_versions_location() {
        let local = HashMap::new();
        let mut remote = HashMap::new();
        remote.insert(VERSIONS_LOCATION_HEADER.to_string(), "versions-cont".to_string());
        let diff = diff_container_headers(&local, &remote);
        assert_eq!(diff.get(VERSIONS_SYSMETA_LOCATION), Some(&"versions-cont".to_string()));
        assert_eq!(diff.get(VERSIONS_SYSMETA_MODE), Some(&"stack".to_string()));
    }

    #[test]
    fn diff_account_headers_translates_acl_and_temp_url() {
        let local = HashMap::new();
        let mut remote = HashMap::new();
        remote.insert(ACCOUNT_ACL_HEADER.to_string(), "acl-value".to_string());
        remote.insert(TEMP_URL_KEY_HEADER.to_string(), "secret".to_string());
        let diff = diff_account_headers(&local, &remote);
        assert_eq!(diff.get(ACCOUNT_ACL_SYSMETA), Some(&"acl-value".to_string()));
        assert_eq!(diff.get(TEMP_URL_KEY_HEADER), Some(&"secret".to_string()));
    }

    use local_store::FakeLocalStore;
    use remote_storage::FakeRemoteProvider;

    fn migrator(local: Arc<FakeLocalStore>, remote: Arc<RemoteProvider>, status: Arc<StatusStore>) -> Migrator {
        Migrator {
            local,
            remote,
            status,
            local_account: "acct".to_string(),
            local_container: "cont".to_string(),
            items_chunk: 100,
        }
    }

    #[tokio::test]
    async fn run_pass_copies_new_remote_object_and_stamps_migration() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(StatusStore::new(dir.path()));
        let local = Arc::new(FakeLocalStore::new());
        let fake_remote = FakeRemoteProvider::new(true);
        fake_remote.seed_object("foo", b"hello", "etag1", HashMap::new());
        let remote = Arc::new(RemoteProvider::Fake(fake_remote));
        let m = migrator(local.clone(), remote, status);

        let summary = m.run_pass(1_000).await.unwrap();
        assert_eq!(summary.moved_count, 1);

        let meta = local.head_object("acct", "cont", "foo", &ReadOptions::default()).await.unwrap().unwrap();
        assert!(meta.has_migrator_origin());
        assert_eq!(meta.migrated_at_secs(), Some(meta.last_modified_secs()));
    }

    #[tokio::test]
    async fn run_pass_reconciles_container_headers() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(StatusStore::new(dir.path()));
        let local = Arc::new(FakeLocalStore::new());
        let fake_remote = FakeRemoteProvider::new(true);
        let mut remote_headers = HashMap::new();
        remote_headers.insert("x-container-meta-color".to_string(), "blue".to_string());
        fake_remote.set_container_headers(remote_headers);
        let remote = Arc::new(RemoteProvider::Fake(fake_remote));
        let m = migrator(local.clone(), remote, status);

        m.run_pass(1_000).await.unwrap();

        let local_headers = local.head_container("acct", "cont").await.unwrap().unwrap();
        assert_eq!(local_headers.get("x-container-meta-color"), Some(&"blue".to_string()));
        assert_eq!(local_headers.get(CONTAINER_MIGRATOR_ORIGIN_HEADER), Some(&"true".to_string()));
    }

    #[tokio::test]
    async fn maybe_delete_local_retains_object_modified_since_migration() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(StatusStore::new(dir.path()));
        let local = Arc::new(FakeLocalStore::new());
        let fake_remote = FakeRemoteProvider::new(true);
        fake_remote.seed_object("foo", b"hello", "etag1", HashMap::new());
        let remote = Arc::new(RemoteProvider::Fake(fake_remote));
        let m = migrator(local.clone(), remote.clone(), status.clone());
        m.run_pass(1_000).await.unwrap();

        // Locally modify the object after migration: a plain PUT drops sysmeta,
        // including the migrated-at stamp, leaving the migrator-origin header gone too.
        local
            .put_object("acct", "cont", "foo", local_store::fake::body_from_bytes(bytes::Bytes::from_static(b"changed")), 7, &HashMap::new())
            .await
            .unwrap();
        // Restore the origin marker by hand to isolate condition (b) from condition (a).
        let mut origin = HashMap::new();
        origin.insert(local_store::MIGRATOR_ORIGIN_HEADER.to_string(), "true".to_string());
        local.post_object("acct", "cont", "foo", &origin).await.unwrap();

        // Remote object now gone: the next pass should see "foo" as local-only.
        if let RemoteProvider::Fake(fake) = remote.as_ref() {
            fake.delete("foo").await.unwrap();
        }
        let m = migrator(local.clone(), remote, status);
        m.run_pass(2_000).await.unwrap();

        assert!(local.head_object("acct", "cont", "foo", &ReadOptions::default()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn handle_remote_container_gone_deletes_empty_migrator_managed_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(StatusStore::new(dir.path()));
        let local = Arc::new(FakeLocalStore::new());
        let fake_remote = FakeRemoteProvider::new(true);
        fake_remote.seed_object("foo", b"hello", "etag1", HashMap::new());
        let remote = Arc::new(RemoteProvider::Fake(fake_remote));
        let m = migrator(local.clone(), remote.clone(), status.clone());
        m.run_pass(1_000).await.unwrap();

        if let RemoteProvider::Fake(fake) = remote.as_ref() {
            fake.delete_container();
        }
        let m = migrator(local.clone(), remote, status);
        m.run_pass(2_000).await.unwrap();

        assert!(local.head_container("acct", "cont").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn handle_remote_container_gone_keeps_mirror_with_foreign_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(StatusStore::new(dir.path()));
        let local = Arc::new(FakeLocalStore::new());
        let fake_remote = FakeRemoteProvider::new(true);
        fake_remote.seed_object("foo", b"hello", "etag1", HashMap::new());
        let remote = Arc::new(RemoteProvider::Fake(fake_remote));
        let m = migrator(local.clone(), remote.clone(), status.clone());
        m.run_pass(1_000).await.unwrap();

        let mut foreign = HashMap::new();
        foreign.insert("x-container-meta-owner".to_string(), "someone-else".to_string());
        local.post_container("acct", "cont", &foreign).await.unwrap();

        if let RemoteProvider::Fake(fake) = remote.as_ref() {
            fake.delete_container();
        }
        let m = migrator(local.clone(), remote, status);
        m.run_pass(2_000).await.unwrap();

        assert!(local.head_container("acct", "cont").await.unwrap().is_some());
    }
}
