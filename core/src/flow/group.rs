// sagaflow/src/flow/group.rs

//! Grouped sub-flows with their own failure boundary.

use std::any::type_name;
use std::future::Future;

use tracing::{event, instrument, Level};

use crate::core::ledger::{EntryKind, StepRecord};
use crate::core::outcome::{Failure, Outcome};
use crate::error::{FlowError, FlowResult};
use crate::flow::Flow;

impl Flow {
  /// Runs `sub` against a child flow sharing this flow's store.
  ///
  /// The child's entries are appended to this ledger tagged with `group_key`.
  /// A failure inside the group does not fail this flow. Does nothing if this
  /// flow has already failed.
  ///
  /// # Errors
  /// [`FlowError::EmptyStepKey`] if `group_key` is empty, or the first fatal
  /// error raised inside the group.
  pub async fn group<F, Fut>(&mut self, group_key: &str, sub: F) -> FlowResult<&mut Self>
  where
    F: FnOnce(Flow) -> Fut,
    Fut: Future<Output = FlowResult<Flow>>,
  {
    if self.has_failed() {
      event!(Level::DEBUG, group_key = %group_key, "Flow already failed; group skipped.");
      return Ok(self);
    }
    self.run_group(group_key, sub).await?;
    Ok(self)
  }

  /// `group`, calling `on_failure` with the child flow if any of its steps failed.
  ///
  /// If `on_failure` itself returns a failure, it is recorded in this flow's
  /// ledger under `group_key`, which fails this flow.
  pub async fn group_on_failure<F, Fut, H, HFut>(
    &mut self,
    group_key: &str,
    sub: F,
    on_failure: H,
  ) -> FlowResult<&mut Self>
  where
    F: FnOnce(Flow) -> Fut,
    Fut: Future<Output = FlowResult<Flow>>,
    H: FnOnce(Flow) -> HFut,
    HFut: Future<Output = Outcome<()>>,
  {
    if self.has_failed() {
      event!(Level::DEBUG, group_key = %group_key, "Flow already failed; group skipped.");
      return Ok(self);
    }
    if let Some((child, failure)) = self.run_group(group_key, sub).await? {
      event!(Level::INFO, group_key = %group_key, error = %failure, "Running group failure handler.");
      if let Err(escalated) = on_failure(child).await {
        self.ensure_key_available(group_key)?;
        event!(Level::WARN, group_key = %group_key, error = %escalated, "Group failure escalated.");
        let record = StepRecord::new(group_key, type_name::<H>(), EntryKind::Group, None);
        self.record_settled::<()>(record, Err(escalated), true);
      }
    }
    Ok(self)
  }

  /// Returns the child flow and its aggregate failure when the group failed.
  #[instrument(name = "Flow::group", skip_all, fields(group_key = %group_key), err(Display))]
  async fn run_group<F, Fut>(&mut self, group_key: &str, sub: F) -> FlowResult<Option<(Flow, Failure)>>
  where
    F: FnOnce(Flow) -> Fut,
    Fut: Future<Output = FlowResult<Flow>>,
  {
    if group_key.is_empty() {
      return Err(FlowError::EmptyStepKey);
    }
    event!(Level::DEBUG, "Group starting.");
    let child = sub(self.child()).await?;
    child.wait_all().await?;
    self.ledger.splice(&child.ledger, group_key);

    match child.ledger.aggregate() {
      Ok(()) => {
        event!(Level::DEBUG, steps = child.ledger.records().len(), "Group completed.");
        Ok(None)
      }
      Err(failure) => {
        event!(Level::WARN, error = %failure, "Group completed with failures.");
        Ok(Some((child, failure)))
      }
    }
  }
}
