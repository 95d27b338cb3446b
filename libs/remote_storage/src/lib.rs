//! A set of generic storage abstractions the sync worker and migrator use when
//! mirroring objects to or from a remote bucket.
//!
//! [`RemoteProvider`] is a thin enum dispatch (not a trait object) over the two
//! protocols this daemon speaks on the remote side, each with its own module:
//!   * [`s3_provider`] speaks the S3-compatible protocol, including the
//!     path-style/v2-signing/no-multipart quirks a specific cloud vendor needs.
//!   * [`native_provider`] treats a peer native store as the remote side.
//!
//! No other module outside this crate should reach into `s3_provider` or
//! `native_provider` directly; everything goes through [`RemoteProvider`].

pub mod error;
pub mod fake;
pub mod key;
pub mod metadata;
pub mod native_provider;
pub mod pool;
pub mod s3_provider;

use std::collections::HashMap;
use std::pin::Pin;
use std::time::SystemTime;

use bytes::Bytes;
use futures::Stream;

pub use error::{ErrorKind, ProviderError};
pub use fake::FakeRemoteProvider;
pub use key::{hashed_prefix, remote_object_key};
pub use metadata::{get_slo_etag, strip_etag_quotes, translate_headers, SegmentHash, TranslatedMetadata};
pub use native_provider::NativeProvider;
pub use s3_provider::S3Provider;

/// A stream of raw body chunks, used both for a single-put body and for a
/// non-multipart concatenated Large Object upload (§4.2). `Send` only: a
/// body is always owned and polled by a single task, never shared.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Metadata about a remote object as returned by HEAD/GET, already quote-stripped
/// on the ETag field.
#[derive(Debug, Clone, Default)]
pub struct RemoteObjectMeta {
    pub etag: String,
    pub content_length: u64,
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
    pub last_modified: Option<SystemTime>,
    pub storage_class: Option<String>,
}

impl RemoteObjectMeta {
    pub fn is_archival(&self) -> bool {
        matches!(
            self.storage_class.as_deref(),
            Some("GLACIER") | Some("DEEP_ARCHIVE") | Some("ARCHIVE")
        )
    }
}

/// One entry in a remote listing page.
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub key: String,
    pub etag: String,
    pub size: u64,
    pub last_modified: SystemTime,
}

/// One page of a remote listing, with a cursor to continue from.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub entries: Vec<ListingEntry>,
    /// Present when the listing was truncated; pass back as `marker` on the
    /// next call to continue. Absent signals the final page.
    pub next_marker: Option<String>,
}

/// A completed multipart part, either freshly uploaded or copied, identified
/// by its 1-based part number and the ETag the provider returned for it.
#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// The data to carry on a PUT or multipart-create call.
#[derive(Debug, Clone, Default)]
pub struct PutMetadata {
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
    /// When known, sent as `Content-MD5` by the caller rather than letting the
    /// client library precompute it (§6 "MD5 pre-compute hook is disabled").
    pub content_md5: Option<String>,
}

/// Dispatches to the S3-compatible or native-peer implementation. An enum
/// rather than `dyn RemoteProvider` because several methods take `impl Stream`
/// bodies, which are not object-safe. [`RemoteProvider::Fake`] is a third,
/// in-memory arm used by tests to drive the sync worker, large-object
/// pipeline, and migrator without a live endpoint.
pub enum RemoteProvider {
    S3(S3Provider),
    Native(NativeProvider),
    Fake(FakeRemoteProvider),
}

impl RemoteProvider {
    pub fn supports_multipart(&self) -> bool {
        match self {
            RemoteProvider::S3(p) => p.supports_multipart(),
            RemoteProvider::Native(_) => false,
            RemoteProvider::Fake(p) => p.supports_multipart(),
        }
    }

    pub async fn list(
        &self,
        prefix: Option<&str>,
        marker: Option<&str>,
        max_keys: i32,
    ) -> Result<ListingPage, ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.list(prefix, marker, max_keys).await,
            RemoteProvider::Native(p) => p.list(prefix, marker, max_keys).await,
            RemoteProvider::Fake(p) => p.list(prefix, marker, max_keys).await,
        }
    }

    pub async fn head(&self, key: &str) -> Result<Option<RemoteObjectMeta>, ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.head(key).await,
            RemoteProvider::Native(p) => p.head(key).await,
            RemoteProvider::Fake(p) => p.head(key).await,
        }
    }

    pub async fn get(&self, key: &str) -> Result<(RemoteObjectMeta, BodyStream), ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.get(key).await,
            RemoteProvider::Native(p) => p.get(key).await,
            RemoteProvider::Fake(p) => p.get(key).await,
        }
    }

    pub async fn put(
        &self,
        key: &str,
        body: BodyStream,
        content_length: u64,
        meta: &PutMetadata,
    ) -> Result<String, ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.put(key, body, content_length, meta).await,
            RemoteProvider::Native(p) => p.put(key, body, content_length, meta).await,
            RemoteProvider::Fake(p) => p.put(key, body, content_length, meta).await,
        }
    }

    /// Server-side metadata-only update: S3-compatible does this with a
    /// self-copy carrying a REPLACE-metadata directive; native does it with a
    /// plain POST (§4.1).
    pub async fn post_metadata(&self, key: &str, meta: &PutMetadata) -> Result<(), ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.post_metadata(key, meta).await,
            RemoteProvider::Native(p) => p.post_metadata(key, meta).await,
            RemoteProvider::Fake(p) => p.post_metadata(key, meta).await,
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.delete(key).await,
            RemoteProvider::Native(p) => p.delete(key).await,
            RemoteProvider::Fake(p) => p.delete(key).await,
        }
    }

    pub async fn create_multipart(&self, key: &str, meta: &PutMetadata) -> Result<String, ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.create_multipart(key, meta).await,
            RemoteProvider::Native(_) => Err(ProviderError::Permanent(anyhow::anyhow!(
                "native provider does not support multipart uploads"
            ))),
            RemoteProvider::Fake(p) => p.create_multipart(key, meta).await,
        }
    }

    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_md5: Option<&str>,
    ) -> Result<String, ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.upload_part(key, upload_id, part_number, body, content_md5).await,
            RemoteProvider::Native(_) => unreachable!("checked by supports_multipart"),
            RemoteProvider::Fake(p) => p.upload_part(key, upload_id, part_number, body, content_md5).await,
        }
    }

    pub async fn upload_part_copy(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        source_key: &str,
        byte_range: (u64, u64),
    ) -> Result<String, ProviderError> {
        match self {
            RemoteProvider::S3(p) => {
                p.upload_part_copy(key, upload_id, part_number, source_key, byte_range)
                    .await
            }
            RemoteProvider::Native(_) => unreachable!("checked by supports_multipart"),
            RemoteProvider::Fake(p) => p.upload_part_copy(key, upload_id, part_number, source_key, byte_range).await,
        }
    }

    pub async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.complete_multipart(key, upload_id, parts).await,
            RemoteProvider::Native(_) => unreachable!("checked by supports_multipart"),
            RemoteProvider::Fake(p) => p.complete_multipart(key, upload_id, parts).await,
        }
    }

    pub async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.abort_multipart(key, upload_id).await,
            RemoteProvider::Native(_) => unreachable!("checked by supports_multipart"),
            RemoteProvider::Fake(p) => p.abort_multipart(key, upload_id).await,
        }
    }

    /// The remote container/bucket's own headers, or `None` if it no longer
    /// exists (§4.3 "Container metadata diff" / "Container lifecycle").
    pub async fn head_container_headers(&self) -> Result<Option<HashMap<String, String>>, ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.head_container_headers().await,
            RemoteProvider::Native(p) => p.head_container_headers().await,
            RemoteProvider::Fake(p) => p.head_container_headers().await,
        }
    }

    /// The remote account's own headers (§4.3 "Account metadata diff").
    pub async fn head_account_headers(&self) -> Result<HashMap<String, String>, ProviderError> {
        match self {
            RemoteProvider::S3(p) => p.head_account_headers().await,
            RemoteProvider::Native(p) => p.head_account_headers().await,
            RemoteProvider::Fake(p) => p.head_account_headers().await,
        }
    }
}

/// Wraps a single in-memory buffer as a one-chunk `BodyStream`.
pub fn body_from_bytes(bytes: Bytes) -> BodyStream {
    Box::pin(futures::stream::once(async move { Ok(bytes) }))
}
