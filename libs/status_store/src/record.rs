//! On-disk status document shapes (§3 `StatusRecord`).
//!
//! The sync status document is keyed by source-database-id once a mapping
//! has been through at least one save; its first-ever shape (before any
//! database id existed) was a flat `{last_row: N}` object, which must still
//! be accepted on read and is upgraded to the keyed form on the next write.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One (db-id)'s progress against one container's change stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusEntry {
    pub last_row: u64,
    pub aws_bucket: String,
}

/// Full sync-status document for one local container, across every
/// source-database-id that has ever written to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub entries: HashMap<String, SyncStatusEntry>,
}

impl SyncStatus {
    pub fn last_row(&self, db_id: &str, aws_bucket: &str) -> u64 {
        match self.entries.get(db_id) {
            Some(entry) if entry.aws_bucket == aws_bucket => entry.last_row,
            _ => 0,
        }
    }

    pub fn record(&mut self, db_id: &str, row: u64, aws_bucket: &str) {
        self.entries.insert(
            db_id.to_string(),
            SyncStatusEntry {
                last_row: row,
                aws_bucket: aws_bucket.to_string(),
            },
        );
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.entries).expect("HashMap<String, SyncStatusEntry> always serializes")
    }

    /// Parses either the keyed `{db_id: {last_row, aws_bucket}}` form or the
    /// legacy flat `{last_row: N}` form. The legacy form carries no db-id or
    /// bucket, so it is not attributable to any particular (db_id, bucket)
    /// pair; callers that see an empty `entries` with `legacy_last_row`
    /// set should treat every db-id as starting from that row once, then
    /// overwrite it with the keyed form on their next save.
    pub fn from_json(value: &serde_json::Value) -> (Self, Option<u64>) {
        if let Some(last_row) = value.get("last_row").and_then(|v| v.as_u64()) {
            return (Self::default(), Some(last_row));
        }
        let entries: HashMap<String, SyncStatusEntry> = serde_json::from_value(value.clone()).unwrap_or_default();
        (Self { entries }, None)
    }
}

/// Migration cursor document (§3 "For migrations").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// Last-seen remote listing key; `None` means "start of a fresh pass".
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub moved_count: u64,
    #[serde(default)]
    pub scanned_count: u64,
    /// Unix seconds, set when a full pass completes (marker reset to `None`).
    #[serde(default)]
    pub last_finished_at: Option<i64>,
}

impl MigrationStatus {
    /// Advances the cursor after a page; `short_page` means the remote page
    /// returned fewer entries than the requested chunk size, signaling the
    /// end of a pass (§4.3 step 6).
    pub fn advance(&mut self, last_seen_key: Option<String>, moved: u64, scanned: u64, short_page: bool, now_unix_secs: i64) {
        self.moved_count += moved;
        self.scanned_count += scanned;
        if short_page {
            self.marker = None;
            self.last_finished_at = Some(now_unix_secs);
        } else {
            self.marker = last_seen_key;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_legacy_flat_form() {
        let (status, legacy_row) = SyncStatus::from_json(&json!({"last_row": 42}));
        assert!(status.entries.is_empty());
        assert_eq!(legacy_row, Some(42));
    }

    #[test]
    fn reads_keyed_form() {
        let (status, legacy_row) = SyncStatus::from_json(&json!({
            "db-1": {"last_row": 7, "aws_bucket": "bucket-a"}
        }));
        assert_eq!(legacy_row, None);
        assert_eq!(status.last_row("db-1", "bucket-a"), 7);
    }

    #[test]
    fn last_row_is_zero_for_bucket_mismatch() {
        let mut status = SyncStatus::default();
        status.record("db-1", 7, "bucket-a");
        assert_eq!(status.last_row("db-1", "bucket-b"), 0);
    }

    #[test]
    fn migration_status_clears_marker_on_short_page() {
        let mut status = MigrationStatus::default();
        status.advance(Some("last-key".to_string()), 3, 5, false, 1000);
        assert_eq!(status.marker.as_deref(), Some("last-key"));
        assert_eq!(status.moved_count, 3);
        status.advance(None, 1, 1, true, 2000);
        assert!(status.marker.is_none());
        assert_eq!(status.last_finished_at, Some(2000));
        assert_eq!(status.moved_count, 4);
        assert_eq!(status.scanned_count, 6);
    }
}
