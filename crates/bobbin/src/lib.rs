//! Bobbin: reply-thread reconstruction.
//!
//! This crate wires the pieces together:
//!
//! ```text
//!            Bobbin::get_thread(tail, head)
//!                       │
//!                 ThreadGetter ── identical requests share one walk
//!                       │
//!                ThreadResolver
//!                 │           │
//!          StackedCache    SharedSource
//!         memory → disk       │
//!                         LimitedSource
//!                             │
//!                        RecordSource
//! ```
//!
//! Configuration comes from [`BobbinConfig`] (TOML), logging from
//! [`init_logging`].

pub mod config;
pub mod error;
pub mod logging;
pub mod service;

pub use config::{
    format_size, parse_size, BobbinConfig, ByteSize, CacheConfig, RemoteConfig, SizeParseError,
    ThreadConfig,
};
pub use error::{BobbinError, BobbinResult};
pub use logging::init_logging;
pub use service::{Bobbin, Thread};

pub use bobbin_cache as cache;
pub use bobbin_remote as remote;
pub use bobbin_tasks as tasks;
pub use bobbin_thread as thread;
pub use bobbin_types as types;
