use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bobbin_types::{Record, RecordId, UserId};

use crate::error::{RemoteError, RemoteResult};
use crate::source::RecordSource;

/// One call received by an [`InMemorySource`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceCall {
    Record(RecordId),
    RecentByAuthor {
        author: UserId,
        before: RecordId,
        limit: usize,
    },
}

/// A record source served from memory.
///
/// Intended for tests and embedding. Every call is recorded, an optional
/// latency is applied to each call, and a failure can be primed for the
/// next call.
pub struct InMemorySource {
    records: RwLock<BTreeMap<RecordId, Record>>,
    calls: Mutex<Vec<SourceCall>>,
    next_failure: Mutex<Option<RemoteError>>,
    latency: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            next_failure: Mutex::new(None),
            latency: Mutex::new(None),
        }
    }

    /// Create a source serving `records`.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let source = Self::new();
        for record in records {
            source.insert(record);
        }
        source
    }

    /// Add or replace a record.
    pub fn insert(&self, record: Record) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record);
    }

    /// Make the next call, of either kind, fail with `err`.
    pub fn fail_next(&self, err: RemoteError) {
        *lock(&self.next_failure) = Some(err);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<SourceCall> {
        lock(&self.calls).clone()
    }

    /// Number of single-record fetches received.
    pub fn record_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, SourceCall::Record(_)))
            .count()
    }

    /// Number of bulk author fetches received.
    pub fn author_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, SourceCall::RecentByAuthor { .. }))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    async fn receive(&self, call: SourceCall) -> RemoteResult<()> {
        lock(&self.calls).push(call);
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match lock(&self.next_failure).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<RecordId, Record>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySource")
            .field("records", &self.read().len())
            .field("calls", &lock(&self.calls).len())
            .finish()
    }
}

#[async_trait]
impl RecordSource for InMemorySource {
    async fn fetch_record(&self, id: &RecordId) -> RemoteResult<Record> {
        self.receive(SourceCall::Record(id.clone())).await?;
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.clone()))
    }

    async fn fetch_recent_by_author(
        &self,
        author: &UserId,
        before: &RecordId,
        limit: usize,
    ) -> RemoteResult<Vec<Record>> {
        self.receive(SourceCall::RecentByAuthor {
            author: author.clone(),
            before: before.clone(),
            limit,
        })
        .await?;
        Ok(self
            .read()
            .range(..before.clone())
            .rev()
            .map(|(_, record)| record)
            .filter(|record| &record.author.id == author)
            .take(limit)
            .cloned()
            .collect())
    }
}
