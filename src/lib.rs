//! A Tokio-based worker pool for fanning out jobs with bounded or flexible
//! concurrency, immediate retries, error aggregation and idempotent shutdown.
//!
//! [`BoundedPool`] runs a fixed set of workers fed through a bounded queue.
//! [`FlexPool`] spawns one task per job. Both record the final error of
//! failed jobs into caller-owned [`ErrorSlot`] / [`ErrorList`] targets.

mod config;
mod error;
mod error_sink;
mod flex;
mod job;
mod job_manager;
mod lifecycle;
mod pool;

pub use config::{FlexConfig, PoolConfig};
pub use error::{BoxError, JobError};
pub use error_sink::{ErrorList, ErrorSlot};
pub use flex::FlexPool;
pub use pool::BoundedPool;
