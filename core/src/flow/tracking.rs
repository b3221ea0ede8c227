// sagaflow/src/flow/tracking.rs

//! Installing step outcomes into the store and the ledger.
//!
//! Every spawned computation settles in the same order: the ledger status is
//! written, hooks fire, and only then does the slot become readable. A reader
//! that has awaited a slot can therefore rely on the ledger reflecting it.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::{event, info_span, Instrument, Level};

use crate::core::ledger::{StepRecord, StepStatus};
use crate::core::outcome::Outcome;
use crate::core::slot::{Settlement, Slot, SlotValue};
use crate::error::{FlowError, FlowResult};
use crate::flow::Flow;
use crate::hooks::Notifier;

/// Spawns `computation` on the current tokio runtime and returns the slot it settles.
///
/// Panics inside the computation are caught and settle the slot with
/// [`FlowError::StepPanicked`]. When `status` is given it is updated before the
/// slot resolves, unless something else already moved it off `Pending`.
pub(crate) fn spawn_settlement<T: SlotValue>(
  key: &str,
  computation: BoxFuture<'static, Settlement<T>>,
  notifier: Notifier,
  status: Option<Arc<Mutex<StepStatus>>>,
) -> Slot<T> {
  let cell: Arc<OnceLock<Settlement<T>>> = Arc::new(OnceLock::new());
  let task_cell = Arc::clone(&cell);
  let task_key = key.to_string();

  let handle = tokio::spawn(
    async move {
      let settlement = match AssertUnwindSafe(computation).catch_unwind().await {
        Ok(settlement) => settlement,
        Err(payload) => Err(FlowError::panicked(&task_key, payload.as_ref())),
      };
      settle(&task_key, &settlement, &notifier, status.as_deref());
      let _ = task_cell.set(settlement.clone());
      settlement
    }
    .instrument(info_span!("flow_step", step_key = %key)),
  );

  let waiter_key = key.to_string();
  let waiter = async move {
    match handle.await {
      Ok(settlement) => settlement,
      Err(join_error) => Err(FlowError::TaskAborted {
        key: waiter_key,
        message: join_error.to_string(),
      }),
    }
  }
  .boxed();

  Slot::from_parts(cell, waiter)
}

fn settle<T>(key: &str, settlement: &Settlement<T>, notifier: &Notifier, status: Option<&Mutex<StepStatus>>) {
  let next = match settlement {
    Ok(Ok(_)) => {
      event!(Level::DEBUG, step_key = %key, "Step succeeded.");
      StepStatus::Succeeded
    }
    Ok(Err(failure)) => {
      event!(Level::WARN, step_key = %key, error = %failure, "Step failed.");
      StepStatus::Failed(failure.clone())
    }
    Err(error) => {
      event!(Level::ERROR, step_key = %key, error = %error, "Step faulted.");
      StepStatus::Faulted(error.to_string())
    }
  };

  if let Some(status) = status {
    let mut current = status.lock();
    if *current == StepStatus::Pending {
      *current = next;
    }
  }

  match settlement {
    Ok(Ok(_)) => notifier.step_success(key),
    Ok(Err(failure)) => notifier.step_failure(key, failure),
    Err(error) => notifier.exception(key, error),
  }
}

impl Flow {
  /// Rejects keys that cannot name a new ledger entry: the empty key, which is
  /// the unkeyed slot of every type, and keys already recorded.
  pub(crate) fn ensure_key_available(&self, key: &str) -> FlowResult<()> {
    if key.is_empty() {
      event!(Level::ERROR, "Empty step key rejected.");
      return Err(FlowError::EmptyStepKey);
    }
    if self.ledger.contains(key) {
      event!(Level::ERROR, step_key = %key, "Duplicate step key rejected.");
      return Err(FlowError::DuplicateStepKey { key: key.to_string() });
    }
    Ok(())
  }

  /// Records an outcome that is already known. Hooks fire when `notify` is set.
  pub(crate) fn record_settled<T: SlotValue>(&mut self, record: StepRecord, outcome: Outcome<T>, notify: bool) {
    let key = record.key().to_string();
    let status = match &outcome {
      Ok(_) => StepStatus::Succeeded,
      Err(failure) => StepStatus::Failed(failure.clone()),
    };
    if notify {
      match &outcome {
        Ok(_) => self.notifier.step_success(&key),
        Err(failure) => {
          event!(Level::WARN, step_key = %key, error = %failure, "Step failed.");
          self.notifier.step_failure(&key, failure)
        }
      }
    }
    self.ledger.push(record.with_status(status));
    self.store.set_slot(&key, Slot::settled(outcome));
  }

  /// Spawns `computation` and records it as pending. Step hooks fire when it settles.
  pub(crate) fn record_pending<T: SlotValue>(&mut self, record: StepRecord, computation: BoxFuture<'static, Settlement<T>>) {
    let notifier = self.notifier.clone();
    self.record_spawned(record, computation, notifier);
  }

  /// Like `record_pending`, without step hooks.
  pub(crate) fn record_silent<T: SlotValue>(&mut self, record: StepRecord, computation: BoxFuture<'static, Settlement<T>>) {
    self.record_spawned(record, computation, Notifier::default());
  }

  fn record_spawned<T: SlotValue>(
    &mut self,
    record: StepRecord,
    computation: BoxFuture<'static, Settlement<T>>,
    notifier: Notifier,
  ) {
    let key = record.key().to_string();
    let slot = spawn_settlement(&key, computation, notifier, Some(record.status_handle()));
    self.ledger.push(record.with_completion(Arc::new(slot.clone())));
    self.store.set_slot(&key, slot);
  }
}
