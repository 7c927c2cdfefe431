use crate::config::FlexConfig;
use crate::error::BoxError;
use crate::error_sink::ErrorSink;
use crate::job_manager::{JobManager, PendingJob};
use crate::lifecycle::Lifecycle;

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle as TokioHandle;
use tracing::{debug, info, trace};

/// A pool without persistent workers: every submitted job is spawned as its
/// own task right away, so concurrency is limited only by the caller.
#[derive(Debug)]
pub struct FlexPool {
  pool_name: Arc<String>,
  job_manager: JobManager,
  lifecycle: Lifecycle,
  tokio_handle: TokioHandle,
}

impl FlexPool {
  pub fn new(tokio_handle: TokioHandle, config: FlexConfig) -> Arc<Self> {
    let pool_name = Arc::new(config.name);
    let job_manager = JobManager::new(
      pool_name.clone(),
      config.retry,
      ErrorSink::new(config.error, config.errors),
    );
    info!(pool_name = %pool_name, "Flex pool created.");

    Arc::new(Self {
      pool_name,
      job_manager,
      lifecycle: Lifecycle::new(),
      tokio_handle,
    })
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn in_flight_count(&self) -> usize {
    self.job_manager.in_flight_count()
  }

  /// Spawns a fallible job. Does nothing if the pool is dead.
  pub fn submit<F, Fut, E>(&self, job: F)
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
  {
    if self.lifecycle.is_dead() {
      trace!(pool_name = %self.pool_name, "Submit: pool is dead, job dropped.");
      return;
    }
    self.launch(self.job_manager.wrap(job));
  }

  /// Spawns a job that cannot fail. Does nothing if the pool is dead.
  pub fn submit_simple<F, Fut>(&self, job: F)
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    if self.lifecycle.is_dead() {
      trace!(pool_name = %self.pool_name, "Submit: pool is dead, job dropped.");
      return;
    }
    self.launch(self.job_manager.wrap_simple(job));
  }

  fn launch(&self, pending: PendingJob) {
    debug!(pool_name = %self.pool_name, job_id = pending.id(), "Spawning job.");
    // Detached: completion is tracked by the job manager, not the handle.
    drop(self.tokio_handle.spawn(pending.run()));
  }

  /// Waits until every job spawned so far has finished. Does nothing if the
  /// pool is dead.
  pub async fn wait(&self) {
    if self.lifecycle.is_dead() {
      return;
    }
    self.job_manager.drain().await;
  }

  /// Stops accepting jobs and waits for running ones. Only the first call
  /// does anything.
  pub async fn shutdown(&self) {
    if !self.lifecycle.cancel() {
      info!(pool_name = %self.pool_name, "Shutdown already initiated by another call.");
      return;
    }
    info!(pool_name = %self.pool_name, "Initiating flex pool shutdown.");
    self.job_manager.drain().await;
    info!(pool_name = %self.pool_name, "Flex pool shutdown completed.");
  }

  pub fn is_dead(&self) -> bool {
    self.lifecycle.is_dead()
  }

  pub fn reset_err(&self) {
    if self.lifecycle.is_dead() {
      return;
    }
    self.job_manager.sink().clear_single();
  }

  pub fn reset_errs(&self) {
    if self.lifecycle.is_dead() {
      return;
    }
    self.job_manager.sink().clear_list();
  }
}

impl Drop for FlexPool {
  fn drop(&mut self) {
    if self.lifecycle.cancel() {
      debug!(pool_name = %*self.pool_name, "FlexPool dropped without shutdown. Running jobs continue detached.");
    }
  }
}
