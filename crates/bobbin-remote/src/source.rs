use std::sync::Arc;

use async_trait::async_trait;
use bobbin_types::{Record, RecordId, UserId};

use crate::error::RemoteResult;

/// The remote origin of records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch a single record.
    async fn fetch_record(&self, id: &RecordId) -> RemoteResult<Record>;

    /// Fetch up to `limit` of `author`'s records with ids strictly less than
    /// `before`, newest first. Fewer than `limit` is not an error.
    async fn fetch_recent_by_author(
        &self,
        author: &UserId,
        before: &RecordId,
        limit: usize,
    ) -> RemoteResult<Vec<Record>>;
}

#[async_trait]
impl<S: RecordSource + ?Sized> RecordSource for Arc<S> {
    async fn fetch_record(&self, id: &RecordId) -> RemoteResult<Record> {
        (**self).fetch_record(id).await
    }

    async fn fetch_recent_by_author(
        &self,
        author: &UserId,
        before: &RecordId,
        limit: usize,
    ) -> RemoteResult<Vec<Record>> {
        (**self).fetch_recent_by_author(author, before, limit).await
    }
}
