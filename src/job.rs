use crate::error::BoxError;

use std::future::Future;
use std::pin::Pin;

/// The future produced by a single attempt of a job.
pub(crate) type JobFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'static>>;

/// Internal, type-erased job: a factory that yields a fresh attempt each call.
pub(crate) type BoxedJob = Box<dyn FnMut() -> JobFuture + Send + 'static>;

/// Erases a fallible job factory into the pool's single job representation.
pub(crate) fn boxed<F, Fut, E>(mut job: F) -> BoxedJob
where
  F: FnMut() -> Fut + Send + 'static,
  Fut: Future<Output = Result<(), E>> + Send + 'static,
  E: Into<BoxError>,
{
  Box::new(move || {
    let attempt = job();
    Box::pin(async move { attempt.await.map_err(Into::into) }) as JobFuture
  })
}

/// Lifts a job without a result into a fallible job that always succeeds.
pub(crate) fn boxed_simple<F, Fut>(mut job: F) -> BoxedJob
where
  F: FnMut() -> Fut + Send + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  boxed(move || {
    let attempt = job();
    async move {
      attempt.await;
      Ok::<(), BoxError>(())
    }
  })
}
