//! Caches composed of ordered layers.
//!
//! Layer 0 is the fastest and most volatile; the last layer is the slowest
//! and most durable. Reads fall through the layers in order and stop at the
//! first hit. Writes fan out to every layer concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use bobbin_tasks::{TaskError, TaskGroup, TaskGroupHandle};
use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::error::{CacheError, CacheResult};
use crate::traits::{Cache, Lookup};

/// The ordered layers shared by every stacked variant.
#[derive(Clone)]
struct Layers {
    caches: Vec<Arc<dyn Cache>>,
}

/// Where a read was satisfied.
struct Found {
    layer: usize,
    value: Bytes,
}

impl Layers {
    fn new(caches: Vec<Arc<dyn Cache>>) -> Self {
        Self { caches }
    }

    /// Query layers in order, short-circuiting at the first hit.
    async fn find(&self, key: &str) -> CacheResult<Option<Found>> {
        for (layer, cache) in self.caches.iter().enumerate() {
            if let Lookup::Hit(value) = cache.lookup(key).await? {
                trace!(key, layer, cache = cache.name(), "layer hit");
                return Ok(Some(Found { layer, value }));
            }
        }
        Ok(None)
    }

    /// Query layers in order; on a hit, schedule repair writes on `repairs`
    /// for exactly the layers that were tried and missed.
    async fn lookup_repairing(&self, key: &str, repairs: &TaskGroupHandle) -> CacheResult<Lookup> {
        let Some(Found { layer, value }) = self.find(key).await? else {
            return Ok(Lookup::Miss);
        };
        if layer > 0 {
            debug!(key, hit_layer = layer, repairs = layer, "repairing missed layers");
        }
        for cache in &self.caches[..layer] {
            let cache = Arc::clone(cache);
            let key = key.to_owned();
            let value = value.clone();
            repairs.add(async move {
                if let Err(err) = cache.write(&key, value).await {
                    warn!(key = %key, cache = cache.name(), %err, "cache repair write failed");
                }
            });
        }
        Ok(Lookup::Hit(value))
    }

    /// Write to every layer concurrently and surface the first failure.
    async fn write_all(&self, key: &str, value: Bytes) -> CacheResult<()> {
        let writes = TaskGroup::new();
        let handles: Vec<_> = self
            .caches
            .iter()
            .map(|cache| {
                let cache = Arc::clone(cache);
                let key = key.to_owned();
                let value = value.clone();
                writes.add(async move { cache.write(&key, value).await })
            })
            .collect();

        let mut first_error = None;
        for handle in handles {
            let outcome = match handle.await {
                Ok(written) => written,
                Err(joined) => Err(CacheError::from(TaskError::from(joined))),
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Read-through stack without repair: a hit at layer *k* leaves layers
/// `0..k` untouched.
#[derive(Clone)]
pub struct SimpleStackedCache {
    layers: Layers,
}

impl SimpleStackedCache {
    pub fn new(caches: Vec<Arc<dyn Cache>>) -> Self {
        Self {
            layers: Layers::new(caches),
        }
    }
}

#[async_trait]
impl Cache for SimpleStackedCache {
    async fn lookup(&self, key: &str) -> CacheResult<Lookup> {
        Ok(self.layers.find(key).await?.map(|found| found.value).into())
    }

    async fn write(&self, key: &str, value: Bytes) -> CacheResult<()> {
        self.layers.write_all(key, value).await
    }

    fn name(&self) -> &str {
        "simple-stack"
    }
}

/// Read-through stack that repairs missed layers and waits for the repairs
/// to land before returning.
#[derive(Clone)]
pub struct SyncStackedCache {
    layers: Layers,
}

impl SyncStackedCache {
    pub fn new(caches: Vec<Arc<dyn Cache>>) -> Self {
        Self {
            layers: Layers::new(caches),
        }
    }
}

#[async_trait]
impl Cache for SyncStackedCache {
    async fn lookup(&self, key: &str) -> CacheResult<Lookup> {
        let repairs = TaskGroup::new();
        let found = self.layers.lookup_repairing(key, &repairs.handle()).await?;
        repairs.wait(true).await;
        Ok(found)
    }

    async fn write(&self, key: &str, value: Bytes) -> CacheResult<()> {
        self.layers.write_all(key, value).await
    }

    fn name(&self) -> &str {
        "sync-stack"
    }
}

/// Read-through stack that repairs missed layers in the background.
///
/// Repair writes go to a task group owned by someone else; `lookup` returns
/// as soon as the value is known. Once that group is dropped, repairs are
/// cancelled as they are scheduled.
#[derive(Clone)]
pub struct StackedCache {
    layers: Layers,
    repairs: TaskGroupHandle,
}

impl StackedCache {
    pub fn new(caches: Vec<Arc<dyn Cache>>, repairs: TaskGroupHandle) -> Self {
        Self {
            layers: Layers::new(caches),
            repairs,
        }
    }

    /// The group that receives repair writes.
    pub fn repairs(&self) -> &TaskGroupHandle {
        &self.repairs
    }
}

#[async_trait]
impl Cache for StackedCache {
    async fn lookup(&self, key: &str) -> CacheResult<Lookup> {
        self.layers.lookup_repairing(key, &self.repairs).await
    }

    async fn write(&self, key: &str, value: Bytes) -> CacheResult<()> {
        self.layers.write_all(key, value).await
    }

    fn name(&self) -> &str {
        "stack"
    }
}

impl std::fmt::Debug for Layers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.caches.iter().map(|cache| cache.name()))
            .finish()
    }
}

impl std::fmt::Debug for SimpleStackedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleStackedCache")
            .field("layers", &self.layers)
            .finish()
    }
}

impl std::fmt::Debug for SyncStackedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStackedCache")
            .field("layers", &self.layers)
            .finish()
    }
}

impl std::fmt::Debug for StackedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackedCache")
            .field("layers", &self.layers)
            .field("repairs", &self.repairs)
            .finish()
    }
}
