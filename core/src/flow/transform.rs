// sagaflow/src/flow/transform.rs

//! `map` and `map_async`: deriving one slot from another.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures_util::FutureExt;
use tracing::{event, instrument, Level};

use crate::core::ledger::{EntryKind, StepRecord, StepStatus};
use crate::core::outcome::{Failure, Reason};
use crate::core::slot::SlotValue;
use crate::error::{panic_message, FlowResult};
use crate::flow::Flow;

fn mapping_failure(source: &str, target: &str, payload: &(dyn std::any::Any + Send)) -> Failure {
  Reason::mapping(format!("mapping '{}' to '{}' failed: {}", source, target, panic_message(payload)))
    .with_metadata("source", source)
    .with_metadata("target", target)
    .into()
}

impl Flow {
  /// Transforms the value of `(source, In)` into an `Out` stored under
  /// `target` (the source name when `None`).
  ///
  /// A failed source propagates its failure unchanged and leaves a `Bypassed`
  /// entry. A panic in `map_fn` becomes a `Mapping` failure. Unlike `then`,
  /// `map` still runs after the flow has failed.
  ///
  /// # Errors
  /// [`FlowError::SlotNotFound`](crate::FlowError::SlotNotFound) if the source slot does not exist.
  #[instrument(name = "Flow::map", skip_all, fields(source = %source, target = ?target), err(Display))]
  pub fn map<In, Out, F>(&mut self, source: &str, map_fn: F, target: Option<&str>) -> FlowResult<&mut Self>
  where
    In: SlotValue,
    Out: SlotValue,
    F: FnOnce(In) -> Out + Send + 'static,
  {
    let source_slot = self.store.get::<In>(source)?;
    let source_name = source.to_string();
    let target_name = target.unwrap_or(source).to_string();

    let record = StepRecord::new(&target_name, format!("map {} -> {}", source, target_name), EntryKind::Map, None);
    let status = record.status_handle();
    let task_target = target_name.clone();

    let computation = async move {
      let value = match source_slot.resolve().await {
        Ok(Ok(value)) => value,
        Ok(Err(failure)) => {
          *status.lock() = StepStatus::Bypassed;
          return Ok(Err(failure));
        }
        Err(fatal) => return Err(fatal),
      };
      match catch_unwind(AssertUnwindSafe(|| map_fn(value))) {
        Ok(mapped) => Ok(Ok(mapped)),
        Err(payload) => Ok(Err(mapping_failure(&source_name, &task_target, payload.as_ref()))),
      }
    }
    .boxed();

    self.record_silent(record, computation);
    event!(Level::DEBUG, "Map registered.");
    Ok(self)
  }

  /// `map` with an asynchronous transformation.
  #[instrument(name = "Flow::map_async", skip_all, fields(source = %source, target = ?target), err(Display))]
  pub fn map_async<In, Out, F, Fut>(&mut self, source: &str, map_fn: F, target: Option<&str>) -> FlowResult<&mut Self>
  where
    In: SlotValue,
    Out: SlotValue,
    F: FnOnce(In) -> Fut + Send + 'static,
    Fut: Future<Output = Out> + Send + 'static,
  {
    let source_slot = self.store.get::<In>(source)?;
    let source_name = source.to_string();
    let target_name = target.unwrap_or(source).to_string();

    let record = StepRecord::new(&target_name, format!("map {} -> {}", source, target_name), EntryKind::Map, None);
    let status = record.status_handle();
    let task_target = target_name.clone();

    let computation = async move {
      let value = match source_slot.resolve().await {
        Ok(Ok(value)) => value,
        Ok(Err(failure)) => {
          *status.lock() = StepStatus::Bypassed;
          return Ok(Err(failure));
        }
        Err(fatal) => return Err(fatal),
      };
      let mapped = match catch_unwind(AssertUnwindSafe(|| map_fn(value))) {
        Ok(pending) => AssertUnwindSafe(pending).catch_unwind().await,
        Err(payload) => Err(payload),
      };
      match mapped {
        Ok(mapped) => Ok(Ok(mapped)),
        Err(payload) => Ok(Err(mapping_failure(&source_name, &task_target, payload.as_ref()))),
      }
    }
    .boxed();

    self.record_silent(record, computation);
    event!(Level::DEBUG, "Async map registered.");
    Ok(self)
  }
}
