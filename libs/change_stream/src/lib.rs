//! Contract for the external collaborator that produces a local container's
//! ordered mutation log (§2 "Change-stream reader", §3 `ChangeRow`).
//!
//! This crate defines the interface the sync worker consumes; it does not
//! implement a concrete reader (the change stream's storage and query layer
//! is out of scope here — only its cursor semantics are part of the core).

use thiserror::Error;

/// One row of a local container's mutation log.
///
/// Invariant: within one source-database-id, rows are strictly increasing by
/// `row_id` and must be applied in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRow {
    pub row_id: u64,
    pub name: Vec<u8>,
    pub storage_policy_index: i64,
    pub deleted: bool,
    /// Nanosecond timestamp the row was appended at.
    pub created_at_ns: i128,
}

impl ChangeRow {
    pub fn object_name(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

#[derive(Debug, Error)]
pub enum ChangeStreamError {
    #[error("change stream read failed: {0}")]
    Transient(#[source] anyhow::Error),
    #[error("change stream for db {0} is unavailable")]
    Unavailable(String),
}

/// Produces ordered batches of [`ChangeRow`]s for one source-database-id,
/// starting strictly after `since_row`. Implementations own their own
/// pagination; callers only need the cursor (`since_row`) and the highest
/// `row_id` they have successfully applied.
#[async_trait::async_trait]
pub trait ChangeStreamReader: Send + Sync {
    async fn next_batch(&self, db_id: &str, since_row: u64, max_rows: usize) -> Result<Vec<ChangeRow>, ChangeStreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReader(Vec<ChangeRow>);

    #[async_trait::async_trait]
    impl ChangeStreamReader for FixedReader {
        async fn next_batch(&self, _db_id: &str, since_row: u64, max_rows: usize) -> Result<Vec<ChangeRow>, ChangeStreamError> {
            Ok(self
                .0
                .iter()
                .filter(|r| r.row_id > since_row)
                .take(max_rows)
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn next_batch_respects_cursor_and_limit() {
        let rows = (1..=5)
            .map(|row_id| ChangeRow {
                row_id,
                name: format!("obj-{row_id}").into_bytes(),
                storage_policy_index: 0,
                deleted: false,
                created_at_ns: row_id as i128,
            })
            .collect();
        let reader = FixedReader(rows);
        let batch = reader.next_batch("db-1", 2, 2).await.unwrap();
        assert_eq!(batch.iter().map(|r| r.row_id).collect::<Vec<_>>(), vec![3, 4]);
    }
}
