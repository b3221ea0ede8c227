// sagaflow/src/flow/execution.rs

//! Waiting for a flow and reading its result.

use std::future::Future;

use futures_util::future::join_all;
use tracing::{event, instrument, Level};

use crate::core::outcome::Outcome;
use crate::core::slot::SlotValue;
use crate::core::store::ContextStore;
use crate::error::FlowResult;
use crate::flow::Flow;

impl Flow {
  /// Waits until every slot in the store, and every step this flow recorded,
  /// has settled.
  ///
  /// # Errors
  /// The first fatal error among them, e.g. [`FlowError::StepPanicked`](crate::FlowError::StepPanicked).
  #[instrument(name = "Flow::finish_all", skip_all, fields(steps = self.ledger.records().len()), err(Display))]
  pub async fn finish_all(&mut self) -> FlowResult<&mut Self> {
    self.wait_all().await?;
    Ok(self)
  }

  pub(crate) async fn wait_all(&self) -> FlowResult<()> {
    let mut pending = self.store.all_pending();
    pending.extend(self.ledger.pending());
    event!(Level::TRACE, count = pending.len(), "Waiting for pending computations.");

    // join_all drives every future to completion before the first error is reported.
    join_all(pending).await.into_iter().collect::<FlowResult<Vec<()>>>()?;
    Ok(())
  }

  /// Waits for the flow and returns every recorded failure, concatenated in
  /// ledger order, or success. Failures inside groups are not included.
  #[instrument(name = "Flow::get_result", skip_all, err(Display))]
  pub async fn get_result(&self) -> FlowResult<Outcome<()>> {
    self.wait_all().await?;
    let outcome = self.ledger.aggregate();
    if let Err(failure) = &outcome {
      event!(Level::INFO, error = %failure, "Flow finished with failures.");
    }
    Ok(outcome)
  }

  /// `get_result`, returning the value stored under `(key, T)` on success.
  ///
  /// # Errors
  /// [`FlowError::SlotNotFound`](crate::FlowError::SlotNotFound) if the flow succeeded but no such slot exists.
  #[instrument(name = "Flow::get_result_of", skip_all, fields(key = %key), err(Display))]
  pub async fn get_result_of<T: SlotValue>(&self, key: &str) -> FlowResult<Outcome<T>> {
    if let Err(failure) = self.get_result().await? {
      return Ok(Err(failure));
    }
    self.store.get::<T>(key)?.resolve().await
  }

  /// Runs `handler` with the shared store if the flow has failed at this point.
  ///
  /// Only settled entries count; call `finish_all` first for a definitive answer.
  pub async fn on_failure<F, Fut>(&mut self, handler: F) -> &mut Self
  where
    F: FnOnce(ContextStore) -> Fut,
    Fut: Future<Output = ()>,
  {
    if self.has_failed() {
      event!(Level::INFO, "Running flow failure handler.");
      handler(self.store.clone()).await;
    }
    self
  }
}
