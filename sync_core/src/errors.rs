//! Unified error classification for the sync worker, large-object pipeline,
//! and migrator (§7 "Error handling design").

use thiserror::Error;

/// The three propagation classes §7 distinguishes, shared across every
/// component in this crate so callers match on `kind()` rather than
/// re-deriving the classification from whichever lower-level error type
/// happened to surface it.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Connection failures, 5xx, throttling, partial reads. The caller must
    /// not advance its checkpoint; the same row or page is retried next pass.
    #[error("transient: {0}")]
    Transient(#[source] anyhow::Error),

    /// Manifest too large, segment too small, byte-range present, or any
    /// other validation failure that can never succeed by retrying. Logged
    /// and the row is skipped (checkpoint still advances).
    #[error("permanent: {0}")]
    Permanent(#[source] anyhow::Error),

    /// Matching last-modified with mismatching content hash between sides.
    /// Fatal per-pass; requires operator intervention (§7).
    #[error("consistency violation: {0}")]
    Consistency(#[source] anyhow::Error),
}

impl CoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, CoreError::Permanent(_))
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, CoreError::Consistency(_))
    }
}

impl From<remote_storage::ProviderError> for CoreError {
    fn from(err: remote_storage::ProviderError) -> Self {
        match err {
            remote_storage::ProviderError::Transient(e) => CoreError::Transient(e),
            remote_storage::ProviderError::NotFound => CoreError::Transient(anyhow::anyhow!("remote object not found")),
            remote_storage::ProviderError::Permanent(e) => CoreError::Permanent(e),
        }
    }
}

impl From<local_store::client::LocalStoreError> for CoreError {
    fn from(err: local_store::client::LocalStoreError) -> Self {
        match err {
            local_store::client::LocalStoreError::Transient(e) => CoreError::Transient(e),
            local_store::client::LocalStoreError::NotFound => CoreError::Transient(anyhow::anyhow!("local object not found")),
            local_store::client::LocalStoreError::Permanent(e) => CoreError::Permanent(e),
        }
    }
}

impl From<local_store::ManifestError> for CoreError {
    fn from(err: local_store::ManifestError) -> Self {
        CoreError::Permanent(anyhow::anyhow!(err))
    }
}

impl From<status_store::StatusStoreError> for CoreError {
    fn from(err: status_store::StatusStoreError) -> Self {
        CoreError::Transient(anyhow::anyhow!(err))
    }
}

impl From<change_stream::ChangeStreamError> for CoreError {
    fn from(err: change_stream::ChangeStreamError) -> Self {
        CoreError::Transient(anyhow::anyhow!(err))
    }
}
