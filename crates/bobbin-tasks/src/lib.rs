//! Task coordination primitives for Bobbin.
//!
//! - [`TaskGroup`]: scoped set of background tasks; dropping the group
//!   cancels whatever is still running and releases every waiter.
//! - [`TaskLimiter`]: caps concurrently running work, queueing the excess
//!   in strict arrival order.
//! - [`SharedConcurrent`]: coalesces concurrent calls with equal keys into
//!   one underlying execution.
//!
//! None of these retain results after completion; they coordinate work,
//! they do not cache it.

pub mod error;
pub mod group;
pub mod limiter;
pub mod shared;

pub use error::TaskError;
pub use group::{TaskGroup, TaskGroupHandle};
pub use limiter::{LimitedTask, LimiterPermit, TaskLimiter};
pub use shared::SharedConcurrent;
