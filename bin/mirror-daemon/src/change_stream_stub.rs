//! The change-log backing store itself is an external collaborator (§2): the
//! core only contracts with its cursor semantics, not its storage/query layer.
//! This binary has no concrete implementation to wire up; it reports every
//! container as caught up rather than fabricate a fake mutation log.

use async_trait::async_trait;
use change_stream::{ChangeRow, ChangeStreamError, ChangeStreamReader};

pub struct NoChangeStream;

#[async_trait]
impl ChangeStreamReader for NoChangeStream {
    async fn next_batch(&self, _db_id: &str, _since_row: u64, _max_rows: usize) -> Result<Vec<ChangeRow>, ChangeStreamError> {
        Ok(Vec::new())
    }
}
