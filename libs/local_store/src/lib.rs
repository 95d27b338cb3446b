//! Client for the native store's own HTTP API, used read-only by the sync
//! worker and read/write by the migrator.

pub mod client;
pub mod fake;
pub mod reader;
pub mod types;

pub use client::{ListingEntry, LocalStoreApi, LocalStoreClient, LocalStoreConfig, LocalStoreError, ObjectBodyStream, ReadOptions};
pub use fake::FakeLocalStore;
pub use reader::{BytesReadCounter, CountingStream};
pub use types::{
    parse_dlo_manifest, validate_slo_manifest, LargeObjectKind, ManifestError, ManifestSegment, ObjectMetadata,
    CONTAINER_MIGRATOR_ORIGIN_HEADER, MANIFEST_HEADER, MAX_CONCATENATED_BYTES, MAX_SEGMENTS, MAX_SEGMENT_BYTES,
    MIGRATOR_MIGRATED_AT_HEADER, MIGRATOR_ORIGIN_HEADER, MIN_SEGMENT_BYTES, SLO_HEADER,
};
