use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bobbin_cache::{Cache, Lookup};
use bobbin_remote::RecordSource;
use bobbin_tasks::TaskGroup;
use bobbin_types::{Record, RecordCodec, RecordId};
use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::error::{ThreadError, ThreadResult};

/// How many of an author's recent records one prefetch asks for.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Resolves reply chains through the persistent cache and a remote source.
///
/// Cloning is cheap; clones share the cache, the source, and the codec.
#[derive(Clone)]
pub struct ThreadResolver {
    cache: Arc<dyn Cache>,
    source: Arc<dyn RecordSource>,
    codec: RecordCodec,
    batch_size: usize,
}

impl ThreadResolver {
    pub fn new(cache: Arc<dyn Cache>, source: Arc<dyn RecordSource>, codec: RecordCodec) -> Self {
        Self {
            cache,
            source,
            codec,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the prefetch batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    /// Start a walk from `tail`. Records come out newest first.
    pub fn walk(&self, tail: RecordId, head: Option<RecordId>) -> ThreadWalk<'_> {
        ThreadWalk {
            resolver: self,
            head,
            cursor: Cursor::Next(tail),
            local_store: HashMap::new(),
            visited: HashSet::new(),
            writes: TaskGroup::new(),
        }
    }

    /// Resolve the thread from `head` (or the root) down to `tail`, oldest
    /// first.
    ///
    /// Returns once every background cache write started by the walk has
    /// finished. On error, or if this future is dropped, outstanding writes
    /// are cancelled; writes that already landed stay.
    #[tracing::instrument(name = "get_thread", skip_all, fields(tail = %tail, head = ?head))]
    pub async fn get_thread(
        &self,
        tail: RecordId,
        head: Option<RecordId>,
    ) -> ThreadResult<Vec<Record>> {
        let mut walk = self.walk(tail, head);
        let mut records = Vec::new();
        while let Some(record) = walk.next_record().await? {
            records.push(record);
        }
        walk.finish().await;

        records.reverse();
        debug!(len = records.len(), "resolved thread");
        Ok(records)
    }
}

impl std::fmt::Debug for ThreadResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadResolver")
            .field("cache", &self.cache.name())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

enum Cursor {
    Next(RecordId),
    /// The last emitted record ended the walk with an error, reported by
    /// the following call.
    Failed(ThreadError),
    Done,
}

/// One in-progress walk up a reply chain.
///
/// The walk owns its local store and its background writes. Dropping it
/// cancels any write still in flight.
pub struct ThreadWalk<'a> {
    resolver: &'a ThreadResolver,
    head: Option<RecordId>,
    cursor: Cursor,
    local_store: HashMap<RecordId, Record>,
    visited: HashSet<RecordId>,
    writes: TaskGroup,
}

impl ThreadWalk<'_> {
    /// Resolve and emit the next record, or `None` once the walk is over.
    ///
    /// A record that ends the chain short of the requested head is still
    /// emitted; the mismatch is reported by the following call.
    pub async fn next_record(&mut self) -> ThreadResult<Option<Record>> {
        let id = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Next(id) => id,
            Cursor::Failed(err) => return Err(err),
            Cursor::Done => return Ok(None),
        };
        if !self.visited.insert(id.clone()) {
            return Err(ThreadError::Cycle(id));
        }

        let record = self.resolve(&id).await?;

        self.cursor = match (&self.head, &record.parent_id) {
            (Some(head), _) if *head == id => Cursor::Done,
            (Some(head), None) => Cursor::Failed(ThreadError::MismatchedHead(head.clone())),
            (_, Some(parent)) => Cursor::Next(parent.clone()),
            (None, None) => Cursor::Done,
        };
        Ok(Some(record))
    }

    /// Wait for the walk's background cache writes to land.
    pub async fn finish(self) {
        self.writes.wait(true).await;
    }

    /// Background writes still in flight.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    async fn resolve(&mut self, id: &RecordId) -> ThreadResult<Record> {
        if let Some(record) = self.local_store.remove(id) {
            trace!(%id, "local store hit");
            self.store_in_background(&record);
            return Ok(record);
        }

        if let Lookup::Hit(bytes) = self.resolver.cache.lookup(id.as_str()).await? {
            trace!(%id, "cache hit");
            return Ok(self.resolver.codec.decode(&bytes)?);
        }

        self.load(id).await
    }

    /// Total miss: fetch the record, then prefetch the parent author's recent
    /// history into the local store.
    async fn load(&mut self, id: &RecordId) -> ThreadResult<Record> {
        let source = &self.resolver.source;
        let record = source.fetch_record(id).await?;
        debug!(%id, "fetched record from remote");
        self.store_in_background(&record);

        if let Some(parent_author) = &record.parent_author_id {
            let recent = source
                .fetch_recent_by_author(parent_author, id, self.resolver.batch_size)
                .await?;
            debug!(%id, author = %parent_author, prefetched = recent.len(), "prefetched author history");
            self.local_store
                .extend(recent.into_iter().map(|record| (record.id.clone(), record)));
        }
        Ok(record)
    }

    fn store_in_background(&self, record: &Record) {
        let encoded = match self.resolver.codec.encode(record) {
            Ok(encoded) => Bytes::from(encoded),
            Err(err) => {
                warn!(id = %record.id, %err, "skipping cache write for unencodable record");
                return;
            }
        };
        let cache = Arc::clone(&self.resolver.cache);
        let key = record.id.to_string();
        self.writes.add(async move {
            if let Err(err) = cache.write(&key, encoded).await {
                warn!(key = %key, %err, "background cache write failed");
            }
        });
    }
}
