// sagaflow/src/hooks.rs

//! Lifecycle notifications.
//!
//! Implement [`EventHooks`] to observe a flow. Every method has a no-op default,
//! so implementors only override the transitions they care about. Hooks are
//! called synchronously at the moment of the transition, possibly from the task
//! running a step, and must not block.

use std::sync::Arc;

use crate::core::outcome::Failure;
use crate::error::FlowError;

pub trait EventHooks: Send + Sync {
  /// A step passed the failure and key checks and is about to resolve its inputs.
  ///
  /// Followed by exactly one of `on_step_success`, `on_step_failure`,
  /// `on_exception` or `on_step_short_circuited`, except for a step served from
  /// the output cache, which gets no further event.
  fn on_step_start(&self, _key: &str) {}

  fn on_step_success(&self, _key: &str) {}

  fn on_step_failure(&self, _key: &str, _failure: &Failure) {}

  /// A started step found the flow failed while waiting for an input. It leaves
  /// no ledger entry; the failure it waited on is already recorded.
  fn on_step_short_circuited(&self, _key: &str) {}

  /// A step function (or a compensation) panicked.
  fn on_exception(&self, _key: &str, _error: &FlowError) {}

  fn on_compensation_start(&self, _step_key: &str, _compensation_key: &str) {}

  fn on_compensation_success(&self, _step_key: &str, _compensation_key: &str) {}

  fn on_compensation_failure(&self, _step_key: &str, _compensation_key: &str, _failure: &Failure) {}
}

/// Optional hooks, cheap to clone into step tasks.
#[derive(Clone, Default)]
pub(crate) struct Notifier(Option<Arc<dyn EventHooks>>);

impl Notifier {
  pub(crate) fn new(hooks: Arc<dyn EventHooks>) -> Self {
    Notifier(Some(hooks))
  }

  pub(crate) fn step_start(&self, key: &str) {
    if let Some(h) = &self.0 {
      h.on_step_start(key);
    }
  }

  pub(crate) fn step_success(&self, key: &str) {
    if let Some(h) = &self.0 {
      h.on_step_success(key);
    }
  }

  pub(crate) fn step_failure(&self, key: &str, failure: &Failure) {
    if let Some(h) = &self.0 {
      h.on_step_failure(key, failure);
    }
  }

  pub(crate) fn step_short_circuited(&self, key: &str) {
    if let Some(h) = &self.0 {
      h.on_step_short_circuited(key);
    }
  }

  pub(crate) fn exception(&self, key: &str, error: &FlowError) {
    if let Some(h) = &self.0 {
      h.on_exception(key, error);
    }
  }

  pub(crate) fn compensation_start(&self, step_key: &str, compensation_key: &str) {
    if let Some(h) = &self.0 {
      h.on_compensation_start(step_key, compensation_key);
    }
  }

  pub(crate) fn compensation_success(&self, step_key: &str, compensation_key: &str) {
    if let Some(h) = &self.0 {
      h.on_compensation_success(step_key, compensation_key);
    }
  }

  pub(crate) fn compensation_failure(&self, step_key: &str, compensation_key: &str, failure: &Failure) {
    if let Some(h) = &self.0 {
      h.on_compensation_failure(step_key, compensation_key, failure);
    }
  }
}
