use crate::error_sink::{ErrorList, ErrorSlot};

use std::time::Duration;

const DEFAULT_BOUNDED_POOL_NAME: &str = "bworker_pool";
const DEFAULT_FLEX_POOL_NAME: &str = "bworker_flex";

/// Configuration for a [`BoundedPool`](crate::BoundedPool).
///
/// Every option is optional. Values that would be meaningless are normalized
/// when applied: a zero queue capacity means one slot and a zero stagger means
/// all workers start at once.
#[derive(Debug, Clone)]
pub struct PoolConfig {
  pub(crate) name: String,
  pub(crate) queue_capacity: usize,
  pub(crate) startup_stagger: Option<Duration>,
  pub(crate) retry: usize,
  pub(crate) error: Option<ErrorSlot>,
  pub(crate) errors: Option<ErrorList>,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      name: DEFAULT_BOUNDED_POOL_NAME.to_string(),
      queue_capacity: 1,
      startup_stagger: None,
      retry: 0,
      error: None,
      errors: None,
    }
  }
}

impl PoolConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Name used in the pool's tracing spans and log lines.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Number of jobs that may wait in the queue before `submit` starts to
  /// apply backpressure.
  pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
    self.queue_capacity = capacity.max(1);
    self
  }

  /// Spreads worker startup over `stagger`. With `n` workers, each worker
  /// after the first starts `stagger / (n - 1)` after the previous one.
  /// For example 3 workers and 1s start at 0ms, 500ms and 1000ms.
  pub fn with_startup_stagger(mut self, stagger: Duration) -> Self {
    self.startup_stagger = (!stagger.is_zero()).then_some(stagger);
    self
  }

  /// Number of extra attempts for a failing job.
  pub fn with_retry(mut self, retry: usize) -> Self {
    self.retry = retry;
    self
  }

  /// Slot that receives the final error of the most recently failed job.
  pub fn with_error(mut self, slot: ErrorSlot) -> Self {
    self.error = Some(slot);
    self
  }

  /// List that receives the final error of every failed job.
  pub fn with_errors(mut self, list: ErrorList) -> Self {
    self.errors = Some(list);
    self
  }

  pub fn queue_capacity(&self) -> usize {
    self.queue_capacity
  }

  pub fn startup_stagger(&self) -> Option<Duration> {
    self.startup_stagger
  }

  pub fn retry(&self) -> usize {
    self.retry
  }
}

/// Configuration for a [`FlexPool`](crate::FlexPool).
#[derive(Debug, Clone)]
pub struct FlexConfig {
  pub(crate) name: String,
  pub(crate) retry: usize,
  pub(crate) error: Option<ErrorSlot>,
  pub(crate) errors: Option<ErrorList>,
}

impl Default for FlexConfig {
  fn default() -> Self {
    Self {
      name: DEFAULT_FLEX_POOL_NAME.to_string(),
      retry: 0,
      error: None,
      errors: None,
    }
  }
}

impl FlexConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_retry(mut self, retry: usize) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_error(mut self, slot: ErrorSlot) -> Self {
    self.error = Some(slot);
    self
  }

  pub fn with_errors(mut self, list: ErrorList) -> Self {
    self.errors = Some(list);
    self
  }

  pub fn retry(&self) -> usize {
    self.retry
  }
}
