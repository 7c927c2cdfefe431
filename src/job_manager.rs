use crate::error::{BoxError, JobError};
use crate::error_sink::ErrorSink;
use crate::job::{self, BoxedJob};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info_span, trace, warn, Instrument};

/// Wraps submitted jobs into retrying units and tracks how many are in flight.
#[derive(Debug)]
pub(crate) struct JobManager {
  pool_name: Arc<String>,
  retry: usize,
  sink: Arc<ErrorSink>,
  in_flight: Arc<watch::Sender<usize>>,
  next_job_id: AtomicU64,
}

impl JobManager {
  pub(crate) fn new(pool_name: Arc<String>, retry: usize, sink: ErrorSink) -> Self {
    let (in_flight, _) = watch::channel(0usize);
    Self {
      pool_name,
      retry,
      sink: Arc::new(sink),
      in_flight: Arc::new(in_flight),
      next_job_id: AtomicU64::new(0),
    }
  }

  pub(crate) fn sink(&self) -> &ErrorSink {
    &self.sink
  }

  pub(crate) fn in_flight_count(&self) -> usize {
    *self.in_flight.borrow()
  }

  pub(crate) fn wrap<F, Fut, E>(&self, job: F) -> PendingJob
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
  {
    self.wrap_boxed(job::boxed(job))
  }

  pub(crate) fn wrap_simple<F, Fut>(&self, job: F) -> PendingJob
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.wrap_boxed(job::boxed_simple(job))
  }

  fn wrap_boxed(&self, job: BoxedJob) -> PendingJob {
    // Counted before the caller enqueues or spawns, so a later `drain` sees it.
    self.in_flight.send_modify(|count| *count += 1);
    let job_id = self.next_job_id.fetch_add(1, AtomicOrdering::Relaxed);
    debug!(pool_name = %self.pool_name, job_id, "Wrapped job.");

    PendingJob {
      job_id,
      job,
      attempts: self.retry.saturating_add(1),
      sink: self.sink.clone(),
      pool_name: self.pool_name.clone(),
      guard: InFlightGuard {
        in_flight: self.in_flight.clone(),
      },
    }
  }

  /// Waits until every wrapped job has finished or been dropped.
  pub(crate) async fn drain(&self) {
    let mut rx = self.in_flight.subscribe();
    // The sender lives in `self`, so this can only return once the count is zero.
    let _ = rx.wait_for(|count| *count == 0).await;
  }
}

/// Decrements the in-flight count when dropped.
#[derive(Debug)]
struct InFlightGuard {
  in_flight: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    self.in_flight.send_modify(|count| *count = count.saturating_sub(1));
  }
}

/// A job bound to its retry budget and completion bookkeeping.
///
/// Dropping it without calling `run` still releases its in-flight slot.
pub(crate) struct PendingJob {
  job_id: u64,
  job: BoxedJob,
  attempts: usize,
  sink: Arc<ErrorSink>,
  pool_name: Arc<String>,
  guard: InFlightGuard,
}

impl std::fmt::Debug for PendingJob {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PendingJob")
      .field("job_id", &self.job_id)
      .field("attempts", &self.attempts)
      .finish_non_exhaustive()
  }
}

impl PendingJob {
  pub(crate) fn id(&self) -> u64 {
    self.job_id
  }

  /// Runs the job until it succeeds or its attempts are used up. Only the
  /// error of the last attempt is recorded.
  pub(crate) fn run(self) -> impl Future<Output = ()> + Send + 'static {
    let span = info_span!("pending_job", pool_name = %self.pool_name, job_id = self.job_id);
    let PendingJob {
      job_id,
      mut job,
      attempts,
      sink,
      pool_name,
      guard,
    } = self;

    async move {
      for attempt in 1..=attempts {
        let outcome = AssertUnwindSafe(async { job().await }).catch_unwind().await;
        let err = match outcome {
          Ok(Ok(())) => {
            trace!(attempt, "Job succeeded.");
            break;
          }
          Ok(Err(e)) => JobError::failed(e),
          Err(payload) => JobError::from_panic(payload),
        };

        if attempt < attempts {
          trace!(attempt, attempts, error = %err, "Job attempt failed, retrying.");
          continue;
        }

        warn!(pool_name = %pool_name, job_id, attempts, error = %err, "Job failed on its final attempt.");
        sink.record(err);
      }
      drop(guard);
    }
    .instrument(span)
  }
}
