use crate::error::JobError;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A caller-owned slot that receives the error of the most recently failed job.
///
/// Clones share the same slot, so the caller keeps one handle and gives another
/// to the pool configuration.
#[derive(Clone, Default)]
pub struct ErrorSlot {
  inner: Arc<Mutex<Option<JobError>>>,
}

impl ErrorSlot {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns a clone of the currently stored error.
  pub fn get(&self) -> Option<JobError> {
    self.inner.lock().clone()
  }

  /// Removes and returns the currently stored error.
  pub fn take(&self) -> Option<JobError> {
    self.inner.lock().take()
  }

  pub fn is_set(&self) -> bool {
    self.inner.lock().is_some()
  }
}

impl fmt::Debug for ErrorSlot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ErrorSlot").field("error", &*self.inner.lock()).finish()
  }
}

/// A caller-owned list that accumulates the errors of every failed job, in
/// completion order.
#[derive(Clone, Default)]
pub struct ErrorList {
  inner: Arc<Mutex<Vec<JobError>>>,
}

impl ErrorList {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns a copy of the accumulated errors.
  pub fn snapshot(&self) -> Vec<JobError> {
    self.inner.lock().clone()
  }

  /// Removes and returns all accumulated errors.
  pub fn take(&self) -> Vec<JobError> {
    std::mem::take(&mut *self.inner.lock())
  }

  pub fn len(&self) -> usize {
    self.inner.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.lock().is_empty()
  }
}

impl fmt::Debug for ErrorList {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ErrorList").field("len", &self.len()).finish()
  }
}

/// Serializes all pool-side writes into the configured error targets.
///
/// Either target may be absent, in which case operations on it do nothing.
pub(crate) struct ErrorSink {
  // Held across both target writes so the slot always equals the last list
  // entry. The targets' own locks only guard caller reads.
  write_lock: Mutex<()>,
  slot: Option<ErrorSlot>,
  list: Option<ErrorList>,
}

impl ErrorSink {
  pub(crate) fn new(slot: Option<ErrorSlot>, list: Option<ErrorList>) -> Self {
    Self {
      write_lock: Mutex::new(()),
      slot,
      list,
    }
  }

  pub(crate) fn is_configured(&self) -> bool {
    self.slot.is_some() || self.list.is_some()
  }

  /// Overwrites the slot and appends to the list, each only if configured.
  /// Both writes happen under one acquisition of the write lock, so the slot
  /// always mirrors the last element of the list.
  pub(crate) fn record(&self, err: JobError) {
    if !self.is_configured() {
      return;
    }
    let _guard = self.write_lock.lock();
    if let Some(slot) = &self.slot {
      *slot.inner.lock() = Some(err.clone());
    }
    if let Some(list) = &self.list {
      list.inner.lock().push(err);
    }
  }

  pub(crate) fn clear_single(&self) {
    if let Some(slot) = &self.slot {
      let _guard = self.write_lock.lock();
      *slot.inner.lock() = None;
    }
  }

  pub(crate) fn clear_list(&self) {
    if let Some(list) = &self.list {
      let _guard = self.write_lock.lock();
      list.inner.lock().clear();
    }
  }
}

impl fmt::Debug for ErrorSink {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ErrorSink")
      .field("has_slot", &self.slot.is_some())
      .field("has_list", &self.list.is_some())
      .finish()
  }
}
