use std::sync::Arc;

use async_trait::async_trait;
use bobbin_tasks::SharedConcurrent;
use bobbin_types::{Record, RecordId, UserId};

use crate::error::RemoteResult;
use crate::source::RecordSource;

type RecentKey = (UserId, RecordId, usize);

/// A source whose concurrent identical calls share one remote request.
///
/// Calls are keyed by their full argument set: `id` for single fetches,
/// `(author, before, limit)` for bulk fetches. Nothing is kept once a call
/// completes.
pub struct SharedSource<S> {
    inner: Arc<S>,
    records: SharedConcurrent<RecordId, RemoteResult<Record>>,
    recent: SharedConcurrent<RecentKey, RemoteResult<Vec<Record>>>,
}

impl<S: RecordSource + 'static> SharedSource<S> {
    pub fn new(inner: S) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    pub fn from_arc(inner: Arc<S>) -> Self {
        Self {
            inner,
            records: SharedConcurrent::new(),
            recent: SharedConcurrent::new(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Distinct calls currently in flight, of both kinds.
    pub fn in_flight(&self) -> usize {
        self.records.in_flight() + self.recent.in_flight()
    }
}

#[async_trait]
impl<S: RecordSource + 'static> RecordSource for SharedSource<S> {
    async fn fetch_record(&self, id: &RecordId) -> RemoteResult<Record> {
        let inner = Arc::clone(&self.inner);
        let key = id.clone();
        self.records
            .try_call(id.clone(), move || async move { inner.fetch_record(&key).await })
            .await
    }

    async fn fetch_recent_by_author(
        &self,
        author: &UserId,
        before: &RecordId,
        limit: usize,
    ) -> RemoteResult<Vec<Record>> {
        let inner = Arc::clone(&self.inner);
        let (author_id, before_id) = (author.clone(), before.clone());
        self.recent
            .try_call((author.clone(), before.clone(), limit), move || async move {
                inner
                    .fetch_recent_by_author(&author_id, &before_id, limit)
                    .await
            })
            .await
    }
}

impl<S> std::fmt::Debug for SharedSource<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSource")
            .field("records", &self.records)
            .field("recent", &self.recent)
            .finish()
    }
}
