use crate::config::PoolConfig;
use crate::error::BoxError;
use crate::error_sink::ErrorSink;
use crate::job_manager::{JobManager, PendingJob};
use crate::lifecycle::Lifecycle;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

type SharedQueueReceiver = Arc<AsyncMutex<mpsc::Receiver<PendingJob>>>;

/// A pool with a fixed number of workers fed through a bounded queue.
///
/// `submit` waits while the queue is full, which is the pool's backpressure.
/// Callers that cannot afford to wait should size the queue with
/// [`PoolConfig::with_queue_capacity`] or make their jobs cancellable.
#[derive(Debug)]
pub struct BoundedPool {
  pool_name: Arc<String>,
  concurrency: usize,
  job_manager: JobManager,
  lifecycle: Arc<Lifecycle>,
  // `None` once the queue has been closed by shutdown.
  queue_tx: Mutex<Option<mpsc::Sender<PendingJob>>>,
  live_workers: Arc<AtomicUsize>,
  startup_join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BoundedPool {
  /// Creates a pool running `concurrency` workers on `tokio_handle`.
  /// A concurrency of zero is treated as one.
  pub fn new(concurrency: usize, tokio_handle: TokioHandle, config: PoolConfig) -> Arc<Self> {
    let concurrency = concurrency.max(1);
    let pool_name = Arc::new(config.name);
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let lifecycle = Arc::new(Lifecycle::new());
    let live_workers = Arc::new(AtomicUsize::new(0));

    let job_manager = JobManager::new(
      pool_name.clone(),
      config.retry,
      ErrorSink::new(config.error, config.errors),
    );

    let startup_handle = tokio_handle.spawn(
      Self::run_worker_startup(
        pool_name.clone(),
        concurrency,
        config.startup_stagger,
        Arc::new(AsyncMutex::new(rx)),
        live_workers.clone(),
        lifecycle.token(),
        tokio_handle.clone(),
      )
      .instrument(info_span!("bworker_startup", pool_name = %pool_name)),
    );

    info!(pool_name = %pool_name, concurrency, queue_capacity = config.queue_capacity, "Bounded pool created.");

    Arc::new(Self {
      pool_name,
      concurrency,
      job_manager,
      lifecycle,
      queue_tx: Mutex::new(Some(tx)),
      live_workers,
      startup_join_handle: Mutex::new(Some(startup_handle)),
    })
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  /// The configured number of workers.
  pub fn concurrency(&self) -> usize {
    self.concurrency
  }

  /// Number of worker loops currently running. Lower than `concurrency` while a
  /// staggered startup is in progress and after shutdown.
  pub fn worker_count(&self) -> usize {
    self.live_workers.load(AtomicOrdering::Acquire)
  }

  /// Jobs submitted and not yet finished, including queued ones.
  pub fn in_flight_count(&self) -> usize {
    self.job_manager.in_flight_count()
  }

  /// Jobs currently waiting in the queue.
  pub fn queued_job_count(&self) -> usize {
    match self.queue_tx.lock().as_ref() {
      Some(tx) => tx.max_capacity() - tx.capacity(),
      None => 0,
    }
  }

  /// Submits a fallible job. Does nothing if the pool is dead.
  ///
  /// `job` is called once per attempt; with a retry budget of `n` it may be
  /// called up to `n + 1` times.
  pub async fn submit<F, Fut, E>(&self, job: F)
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
  {
    if self.lifecycle.is_dead() {
      trace!(pool_name = %self.pool_name, "Submit: pool is dead, job dropped.");
      return;
    }
    self.enqueue(self.job_manager.wrap(job)).await;
  }

  /// Submits a job that cannot fail. Does nothing if the pool is dead.
  pub async fn submit_simple<F, Fut>(&self, job: F)
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    if self.lifecycle.is_dead() {
      trace!(pool_name = %self.pool_name, "Submit: pool is dead, job dropped.");
      return;
    }
    self.enqueue(self.job_manager.wrap_simple(job)).await;
  }

  async fn enqueue(&self, pending: PendingJob) {
    let job_id = pending.id();
    // Clone the sender so the lock is not held while waiting for queue space.
    let tx = match self.queue_tx.lock().clone() {
      Some(tx) => tx,
      None => {
        debug!(pool_name = %self.pool_name, job_id, "Submit: queue closed by shutdown, job dropped.");
        return;
      }
    };

    debug!(pool_name = %self.pool_name, job_id, "Submitting job to queue.");
    if let Err(send_error) = tx.send(pending).await {
      // Only possible if every worker is gone; the dropped job releases its count.
      warn!(pool_name = %self.pool_name, job_id = send_error.0.id(), "Submit: no worker left to receive job.");
    }
  }

  /// Waits until every job submitted so far has finished, retries included.
  /// Does nothing if the pool is dead.
  pub async fn wait(&self) {
    if self.lifecycle.is_dead() {
      return;
    }
    self.job_manager.drain().await;
  }

  /// Stops accepting jobs, lets queued and running jobs finish and waits for
  /// every worker to exit. Only the first call does anything.
  pub async fn shutdown(&self) {
    if !self.lifecycle.cancel() {
      info!(pool_name = %self.pool_name, "Shutdown already initiated by another call.");
      return;
    }
    info!(pool_name = %self.pool_name, "Initiating pool shutdown.");

    // Dropping the last sender closes the queue; workers exit once it is empty.
    let closed_tx = self.queue_tx.lock().take();
    drop(closed_tx);

    self.job_manager.drain().await;
    debug!(pool_name = %self.pool_name, "All in-flight jobs finished.");

    let handle_to_await = self.startup_join_handle.lock().take();
    if let Some(handle) = handle_to_await {
      if let Err(join_error) = handle.await {
        error!(pool_name = %self.pool_name, "Error joining workers during shutdown: {:?}", join_error);
      }
    }

    info!(pool_name = %self.pool_name, "Pool shutdown completed.");
  }

  pub fn is_dead(&self) -> bool {
    self.lifecycle.is_dead()
  }

  /// Clears the configured error slot. Does nothing if the pool is dead.
  pub fn reset_err(&self) {
    if self.lifecycle.is_dead() {
      return;
    }
    self.job_manager.sink().clear_single();
  }

  /// Clears the configured error list. Does nothing if the pool is dead.
  pub fn reset_errs(&self) {
    if self.lifecycle.is_dead() {
      return;
    }
    self.job_manager.sink().clear_list();
  }

  async fn run_worker_startup(
    pool_name: Arc<String>,
    concurrency: usize,
    stagger: Option<Duration>,
    queue_rx: SharedQueueReceiver,
    live_workers: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
    tokio_handle: TokioHandle,
  ) {
    let delay = stagger
      .filter(|_| concurrency > 1)
      .map(|total| total / u32::try_from(concurrency - 1).unwrap_or(u32::MAX));

    let mut workers = JoinSet::new();
    for worker_index in 0..concurrency {
      if let Some(delay) = delay.filter(|_| worker_index > 0 && !shutdown_token.is_cancelled()) {
        tokio::select! {
          biased;
          _ = shutdown_token.cancelled() => {
            info!(pool_name = %*pool_name, "Shutdown during staggered startup. Starting remaining workers now.");
          }
          _ = tokio::time::sleep(delay) => {}
        }
      }

      live_workers.fetch_add(1, AtomicOrdering::AcqRel);
      workers.spawn_on(
        Self::run_worker_loop(pool_name.clone(), queue_rx.clone(), live_workers.clone())
          .instrument(info_span!("bworker_worker", pool_name = %*pool_name, worker_index)),
        &tokio_handle,
      );
    }

    while let Some(joined) = workers.join_next().await {
      if let Err(join_error) = joined {
        error!(pool_name = %*pool_name, "Worker loop terminated abnormally: {:?}", join_error);
      }
    }
    debug!(pool_name = %*pool_name, "All workers stopped.");
  }

  async fn run_worker_loop(pool_name: Arc<String>, queue_rx: SharedQueueReceiver, live_workers: Arc<AtomicUsize>) {
    debug!(pool_name = %*pool_name, "Worker loop started.");

    loop {
      // Only the receive holds the lock; the job itself runs unlocked.
      let next = queue_rx.lock().await.recv().await;
      match next {
        Some(pending) => {
          trace!(pool_name = %*pool_name, job_id = pending.id(), "Dequeued job.");
          pending.run().await;
        }
        None => break,
      }
    }

    live_workers.fetch_sub(1, AtomicOrdering::AcqRel);
    debug!(pool_name = %*pool_name, "Queue closed and empty. Worker loop stopped.");
  }
}

impl Drop for BoundedPool {
  fn drop(&mut self) {
    if self.lifecycle.cancel() {
      info!(
        pool_name = %*self.pool_name,
        "BoundedPool dropped without shutdown. Closing queue; workers will exit once it is empty."
      );
      self.queue_tx.get_mut().take();
    } else {
      trace!(pool_name = %*self.pool_name, "Drop: shutdown already initiated.");
    }
  }
}
