//! Native-store data types: object metadata, Large Object manifests, and the
//! manifest validation rules (§3 `ManifestSegment`, §4.2 "Manifest validation").

use std::collections::HashMap;

use thiserror::Error;

/// 5 MiB: the minimum size for every non-terminal SLO/DLO segment.
pub const MIN_SEGMENT_BYTES: u64 = 5 * 1024 * 1024;
/// 5 GiB: the maximum size for any one segment.
pub const MAX_SEGMENT_BYTES: u64 = 5 * 1024 * 1024 * 1024;
/// 5 TiB: the maximum total size a non-multipart (concatenated) upload may carry.
pub const MAX_CONCATENATED_BYTES: u64 = 5 * 1024 * 1024 * 1024 * 1024;
/// A manifest may not reference more segments than this.
pub const MAX_SEGMENTS: usize = 10_000;

/// Header naming a Dynamic Large Object's segment container+prefix.
pub const MANIFEST_HEADER: &str = "x-object-manifest";
/// Header marking an object's body as a Static Large Object JSON manifest.
pub const SLO_HEADER: &str = "x-static-large-object";
/// Sysmeta marker the migrator stamps on every object it writes locally, used
/// to decide whether a later local-only object is eligible for deletion.
pub const MIGRATOR_ORIGIN_HEADER: &str = "x-object-sysmeta-migrator-origin";
/// Sysmeta marker recording the object's own Last-Modified at the moment the
/// migrator wrote it, so a later pass can tell whether the object has been
/// modified since (§4.3 "Deletion propagation" condition (b)). A plain POST
/// preserves this header; a data-changing PUT replaces all sysmeta and drops
/// it, so its absence also disqualifies deletion.
pub const MIGRATOR_MIGRATED_AT_HEADER: &str = "x-object-sysmeta-migrator-migrated-at";
/// Sysmeta marker distinguishing a container the migrator created/manages
/// from one that predates migration (§4.3 "Container lifecycle").
pub const CONTAINER_MIGRATOR_ORIGIN_HEADER: &str = "x-container-sysmeta-migrator-origin";

/// Metadata returned by a HEAD or GET against the native store, headers
/// already lowercased by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    pub etag: String,
    pub content_length: u64,
    pub last_modified_ns: i128,
    pub headers: HashMap<String, String>,
}

impl ObjectMetadata {
    pub fn is_large_object(&self) -> bool {
        self.is_static_large_object() || self.manifest_location().is_some()
    }

    pub fn is_static_large_object(&self) -> bool {
        self.headers.get(SLO_HEADER).map(String::as_str) == Some("True")
    }

    pub fn manifest_location(&self) -> Option<&str> {
        self.headers.get(MANIFEST_HEADER).map(String::as_str)
    }

    pub fn has_migrator_origin(&self) -> bool {
        self.headers.contains_key(MIGRATOR_ORIGIN_HEADER)
    }

    /// The migration timestamp stamped on this object, if any.
    pub fn migrated_at_secs(&self) -> Option<i64> {
        self.headers.get(MIGRATOR_MIGRATED_AT_HEADER).and_then(|v| v.parse().ok())
    }

    pub fn last_modified_secs(&self) -> i64 {
        (self.last_modified_ns / 1_000_000_000) as i64
    }
}

/// One segment entry as it appears in a Static Large Object JSON manifest.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq, Eq)]
pub struct ManifestSegment {
    pub path: String,
    pub bytes: u64,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

impl ManifestSegment {
    pub fn container_and_name(&self) -> Option<(&str, &str)> {
        let mut parts = self.path.trim_start_matches('/').splitn(2, '/');
        let container = parts.next()?;
        let name = parts.next()?;
        Some((container, name))
    }
}

/// Whether a Large Object is a Static (manifest = JSON body) or Dynamic
/// (manifest = header naming a container+prefix) manifest.
#[derive(Debug, Clone)]
pub enum LargeObjectKind {
    Static(Vec<ManifestSegment>),
    Dynamic { container: String, prefix: String },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest segment {0} is {1} bytes, below the minimum of {MIN_SEGMENT_BYTES}")]
    SegmentTooSmall(usize, u64),
    #[error("manifest segment {0} is {1} bytes, above the maximum of {MAX_SEGMENT_BYTES}")]
    SegmentTooLarge(usize, u64),
    #[error("manifest has {0} segments, above the maximum of {MAX_SEGMENTS}")]
    TooManySegments(usize),
    #[error("manifest segment {0} carries a byte-range, which is not supported")]
    SegmentHasByteRange(usize),
    #[error("manifest segment {0} has an unparseable path {1:?}")]
    BadSegmentPath(usize, String),
    #[error("manifest body is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
}

/// Validates a Static Large Object manifest per §4.2's invariants. Must run
/// before any network work; a failing manifest is a permanent error (§7),
/// never retried.
pub fn validate_slo_manifest(segments: &[ManifestSegment]) -> Result<(), ManifestError> {
    if segments.len() > MAX_SEGMENTS {
        return Err(ManifestError::TooManySegments(segments.len()));
    }
    let last_index = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        if segment.range.is_some() {
            return Err(ManifestError::SegmentHasByteRange(i));
        }
        if segment.bytes > MAX_SEGMENT_BYTES {
            return Err(ManifestError::SegmentTooLarge(i, segment.bytes));
        }
        if i != last_index && segment.bytes < MIN_SEGMENT_BYTES {
            return Err(ManifestError::SegmentTooSmall(i, segment.bytes));
        }
        if segment.container_and_name().is_none() {
            return Err(ManifestError::BadSegmentPath(i, segment.path.clone()));
        }
    }
    Ok(())
}

/// Parses a dynamic manifest's header value (`container/prefix`) into its parts.
pub fn parse_dlo_manifest(header_value: &str) -> Option<LargeObjectKind> {
    let trimmed = header_value.trim_start_matches('/');
    let (container, prefix) = trimmed.split_once('/')?;
    Some(LargeObjectKind::Dynamic {
        container: container.to_string(),
        prefix: prefix.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(bytes: u64) -> ManifestSegment {
        ManifestSegment {
            path: "/segments/seg001".to_string(),
            bytes,
            hash: "abcdef".to_string(),
            range: None,
        }
    }

    #[test]
    fn rejects_undersized_non_terminal_segment() {
        let segments = vec![segment(1024 * 1024), segment(MIN_SEGMENT_BYTES)];
        assert!(matches!(
            validate_slo_manifest(&segments),
            Err(ManifestError::SegmentTooSmall(0, _))
        ));
    }

    #[test]
    fn allows_undersized_terminal_segment() {
        let segments = vec![segment(MIN_SEGMENT_BYTES), segment(1024)];
        assert!(validate_slo_manifest(&segments).is_ok());
    }

    #[test]
    fn rejects_oversized_segment() {
        let segments = vec![segment(MAX_SEGMENT_BYTES + 1)];
        assert!(matches!(
            validate_slo_manifest(&segments),
            Err(ManifestError::SegmentTooLarge(0, _))
        ));
    }

    #[test]
    fn rejects_byte_range_segment() {
        let mut seg = segment(MIN_SEGMENT_BYTES);
        seg.range = Some("0-1023".to_string());
        assert!(matches!(
            validate_slo_manifest(&[seg]),
            Err(ManifestError::SegmentHasByteRange(0))
        ));
    }

    #[test]
    fn rejects_too_many_segments() {
        let segments = vec![segment(MIN_SEGMENT_BYTES); MAX_SEGMENTS + 1];
        assert!(matches!(
            validate_slo_manifest(&segments),
            Err(ManifestError::TooManySegments(_))
        ));
    }

    #[test]
    fn splits_container_and_name() {
        let seg = segment(MIN_SEGMENT_BYTES);
        assert_eq!(seg.container_and_name(), Some(("segments", "seg001")));
    }

    #[test]
    fn detects_slo_and_dlo_headers() {
        let mut slo = ObjectMetadata::default();
        slo.headers.insert(SLO_HEADER.to_string(), "True".to_string());
        assert!(slo.is_large_object());
        assert!(slo.is_static_large_object());

        let mut dlo = ObjectMetadata::default();
        dlo.headers.insert(MANIFEST_HEADER.to_string(), "segments/prefix_".to_string());
        assert!(dlo.is_large_object());
        assert!(!dlo.is_static_large_object());

        assert!(!ObjectMetadata::default().is_large_object());
    }
}
