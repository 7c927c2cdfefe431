use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use tokio_util::sync::CancellationToken;

/// One-way liveness switch shared by a pool and its background tasks.
///
/// `cancel` flips the pool to dead exactly once; the token lets background
/// tasks await that moment.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
  dead: AtomicBool,
  token: CancellationToken,
}

impl Lifecycle {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Marks the lifecycle dead. Returns `true` only for the call that
  /// performed the transition.
  pub(crate) fn cancel(&self) -> bool {
    let first = self
      .dead
      .compare_exchange(false, true, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
      .is_ok();
    if first {
      self.token.cancel();
    }
    first
  }

  pub(crate) fn is_dead(&self) -> bool {
    self.dead.load(AtomicOrdering::Acquire)
  }

  /// A token that is cancelled once the lifecycle is dead.
  pub(crate) fn token(&self) -> CancellationToken {
    self.token.clone()
  }
}
