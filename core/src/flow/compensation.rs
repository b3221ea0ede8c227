// sagaflow/src/flow/compensation.rs

//! Reverse-order rollback of successful steps.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{event, instrument, Level};

use crate::core::ledger::{Compensation, StepStatus};
use crate::error::FlowError;
use crate::flow::Flow;

impl Flow {
  /// Runs the compensation of every succeeded step, last registered first.
  ///
  /// Steps that failed, are still pending, or carry no compensation are
  /// skipped. A compensation that fails or panics is reported through the
  /// hooks and does not stop the walk; nothing here changes `get_result`.
  #[instrument(name = "Flow::compensate_all", skip_all, fields(steps = self.ledger.records().len()))]
  pub async fn compensate_all(&mut self) -> &mut Self {
    let due: Vec<(String, Compensation)> = self
      .ledger
      .records()
      .iter()
      .rev()
      .filter(|record| record.status() == StepStatus::Succeeded)
      .filter_map(|record| record.compensation().map(|c| (record.key().to_string(), c.clone())))
      .collect();
    event!(Level::INFO, count = due.len(), "Compensating succeeded steps.");

    for (step_key, compensation) in due {
      let compensation_key = compensation.key();
      self.notifier.compensation_start(&step_key, compensation_key);

      let run = AssertUnwindSafe(async { compensation.invoke(self.store.clone()).await });
      match run.catch_unwind().await {
        Ok(Ok(())) => {
          event!(Level::DEBUG, %step_key, %compensation_key, "Compensation succeeded.");
          self.notifier.compensation_success(&step_key, compensation_key);
        }
        Ok(Err(failure)) => {
          event!(Level::WARN, %step_key, %compensation_key, error = %failure, "Compensation failed.");
          self.notifier.compensation_failure(&step_key, compensation_key, &failure);
        }
        Err(payload) => {
          let error = FlowError::panicked(compensation_key, payload.as_ref());
          event!(Level::ERROR, %step_key, %compensation_key, error = %error, "Compensation panicked.");
          self.notifier.exception(compensation_key, &error);
        }
      }
    }
    self
  }
}
