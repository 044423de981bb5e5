//! Layered key-value caching for Bobbin.
//!
//! Reads and writes are atomic, and entries may vanish at any time. A key
//! always maps to the same value, so layers never need update or merge
//! semantics.
//!
//! # Backends
//!
//! All backends implement the [`Cache`] trait:
//!
//! - [`InMemoryCache`]: byte-bounded LRU map, the fast volatile layer
//! - [`DiskCache`]: one file per key, the slow durable layer
//!
//! # Stacking
//!
//! Layers are ordered fastest first. The stacked variants differ only in
//! what happens to the layers that missed:
//!
//! - [`SimpleStackedCache`]: nothing; read-only fall-through
//! - [`SyncStackedCache`]: repair writes, awaited before `lookup` returns
//! - [`StackedCache`]: repair writes, handed to an externally owned task group
//!
//! # Design Rules
//!
//! 1. A miss is a value ([`Lookup::Miss`]), not an error.
//! 2. Repairs go only to layers that were tried and missed.
//! 3. Any other error from a layer propagates unchanged.

pub mod disk;
pub mod error;
pub mod memory;
pub mod stacked;
pub mod traits;

pub use disk::DiskCache;
pub use error::{CacheError, CacheResult};
pub use memory::InMemoryCache;
pub use stacked::{SimpleStackedCache, StackedCache, SyncStackedCache};
pub use traits::{lookup_from, Cache, Lookup, MissingKey};
