use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error type that fallible jobs convert their errors into.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// An error recorded by the pool after a job exhausted all of its attempts.
#[derive(Error, Debug, Clone)]
pub enum JobError {
  #[error("job failed: {0}")]
  Failed(Arc<dyn StdError + Send + Sync + 'static>),

  #[error("job panicked: {0}")]
  Panicked(String),
}

impl JobError {
  pub(crate) fn failed(err: BoxError) -> Self {
    JobError::Failed(Arc::from(err))
  }

  /// Builds a `Panicked` error from a `catch_unwind` payload.
  pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
      (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "non-string panic payload".to_string()
    };
    JobError::Panicked(message)
  }

  pub fn is_panic(&self) -> bool {
    matches!(self, JobError::Panicked(_))
  }

  /// Returns the job's own error, if this is not a panic.
  pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
    match self {
      JobError::Failed(e) => Some(e.as_ref()),
      JobError::Panicked(_) => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn failed_error_displays_inner_message() {
    let err = JobError::failed("connection refused".into());
    assert_eq!(err.to_string(), "job failed: connection refused");
    assert!(!err.is_panic());
    assert_eq!(err.source_error().map(|e| e.to_string()), Some("connection refused".to_string()));
  }

  #[test]
  fn panic_payloads_are_extracted() {
    let from_str = JobError::from_panic(Box::new("boom"));
    assert_eq!(from_str.to_string(), "job panicked: boom");

    let from_string = JobError::from_panic(Box::new(format!("bad index {}", 7)));
    assert_eq!(from_string.to_string(), "job panicked: bad index 7");

    let opaque = JobError::from_panic(Box::new(42u32));
    assert!(opaque.is_panic());
    assert!(opaque.source_error().is_none());
  }
}
