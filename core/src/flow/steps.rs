// sagaflow/src/flow/steps.rs

//! Registering steps: `then` and its variants.

use std::any::type_name;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

use crate::core::input::{Inputs, Rejection, ResolveContext};
use crate::core::ledger::{Compensation, EntryKind, StepRecord};
use crate::core::outcome::Outcome;
use crate::core::slot::{Settlement, SlotValue};
use crate::core::store::ContextStore;
use crate::error::{FlowError, FlowResult};
use crate::flow::Flow;
use crate::policy::{AnyValue, Attempt, ResiliencePolicy};

/// Per-call overrides for a single step.
#[derive(Clone, Default)]
pub struct StepOptions {
  policy: Option<Arc<dyn ResiliencePolicy>>,
  cancel: Option<CancellationToken>,
  compensation: Option<Compensation>,
}

impl StepOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Used instead of the flow-wide policy for this step.
  pub fn with_policy(mut self, policy: Arc<dyn ResiliencePolicy>) -> Self {
    self.policy = Some(policy);
    self
  }

  /// Passed to the step function instead of the flow's token.
  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancel = Some(token);
    self
  }

  /// Rollback action run by `compensate_all` if this step succeeded.
  pub fn with_compensation<F, Fut>(mut self, key: impl Into<String>, action: F) -> Self
  where
    F: Fn(ContextStore) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<()>> + Send + 'static,
  {
    self.compensation = Some(Compensation::new(key, action));
    self
  }
}

impl std::fmt::Debug for StepOptions {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepOptions")
      .field("has_policy", &self.policy.is_some())
      .field("has_cancellation", &self.cancel.is_some())
      .field("compensation", &self.compensation)
      .finish()
  }
}

impl Flow {
  /// Registers a step that reads `inputs`, runs `step_fn` and stores its output
  /// under `(key, Out)`.
  ///
  /// Returns as soon as the step is spawned; it does not wait for the step to
  /// finish. Does nothing if the flow has already failed.
  ///
  /// # Errors
  /// - [`FlowError::EmptyStepKey`] if `key` is empty.
  /// - [`FlowError::DuplicateStepKey`] if `key` is already in the ledger.
  /// - [`FlowError::SlotNotFound`] / [`FlowError::TypeMismatch`] if an input is missing.
  /// - [`FlowError::StepPanicked`] if `step_fn` panics before returning its future.
  pub async fn then<I, F, Fut, Out>(&mut self, key: &str, inputs: I, step_fn: F) -> FlowResult<&mut Self>
  where
    I: Inputs,
    F: Fn(I::Values, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<Out>> + Send + 'static,
    Out: SlotValue,
  {
    self.register(key, EntryKind::Step, inputs, step_fn, StepOptions::default()).await
  }

  /// `then` with a per-call policy, cancellation token or compensation.
  pub async fn then_with<I, F, Fut, Out>(
    &mut self,
    key: &str,
    inputs: I,
    step_fn: F,
    options: StepOptions,
  ) -> FlowResult<&mut Self>
  where
    I: Inputs,
    F: Fn(I::Values, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<Out>> + Send + 'static,
    Out: SlotValue,
  {
    self.register(key, EntryKind::Step, inputs, step_fn, options).await
  }

  /// `then` with a compensating action keyed `compensation_key`.
  pub async fn then_with_compensation<I, F, Fut, Out, C, CFut>(
    &mut self,
    key: &str,
    inputs: I,
    step_fn: F,
    compensation_key: &str,
    compensation: C,
  ) -> FlowResult<&mut Self>
  where
    I: Inputs,
    F: Fn(I::Values, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<Out>> + Send + 'static,
    Out: SlotValue,
    C: Fn(ContextStore) -> CFut + Send + Sync + 'static,
    CFut: Future<Output = Outcome<()>> + Send + 'static,
  {
    let options = StepOptions::default().with_compensation(compensation_key, compensation);
    self.register(key, EntryKind::Step, inputs, step_fn, options).await
  }

  /// A step producing no value. Its outputs are never cached.
  pub async fn then_do<I, F, Fut>(&mut self, key: &str, inputs: I, step_fn: F) -> FlowResult<&mut Self>
  where
    I: Inputs,
    F: Fn(I::Values, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<()>> + Send + 'static,
  {
    self.register(key, EntryKind::Action, inputs, step_fn, StepOptions::default()).await
  }

  /// `then_do` with per-call options.
  pub async fn then_do_with<I, F, Fut>(
    &mut self,
    key: &str,
    inputs: I,
    step_fn: F,
    options: StepOptions,
  ) -> FlowResult<&mut Self>
  where
    I: Inputs,
    F: Fn(I::Values, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<()>> + Send + 'static,
  {
    self.register(key, EntryKind::Action, inputs, step_fn, options).await
  }

  /// Registers the step only if `run_if` holds and `skip_if` does not.
  ///
  /// Both predicates see the store as it is now; they do not wait for pending
  /// slots. A skipped step leaves no ledger entry.
  pub async fn then_if<I, F, Fut, Out, P, S>(
    &mut self,
    key: &str,
    run_if: P,
    skip_if: S,
    inputs: I,
    step_fn: F,
  ) -> FlowResult<&mut Self>
  where
    I: Inputs,
    F: Fn(I::Values, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<Out>> + Send + 'static,
    Out: SlotValue,
    P: FnOnce(&ContextStore, &CancellationToken) -> bool,
    S: FnOnce(&ContextStore, &CancellationToken) -> bool,
  {
    if self.has_failed() {
      event!(Level::DEBUG, step_key = %key, "Flow already failed; conditional step not registered.");
      return Ok(self);
    }
    if !run_if(&self.store, &self.cancel) || skip_if(&self.store, &self.cancel) {
      event!(Level::INFO, step_key = %key, "Step skipped by its condition.");
      return Ok(self);
    }
    self.register(key, EntryKind::Step, inputs, step_fn, StepOptions::default()).await
  }

  #[instrument(
    name = "Flow::register",
    skip_all,
    fields(
      step_key = %key,
      step_kind = ?kind,
      output_type = %type_name::<Out>(),
    ),
    err(Display)
  )]
  async fn register<I, F, Fut, Out>(
    &mut self,
    key: &str,
    kind: EntryKind,
    inputs: I,
    step_fn: F,
    options: StepOptions,
  ) -> FlowResult<&mut Self>
  where
    I: Inputs,
    F: Fn(I::Values, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<Out>> + Send + 'static,
    Out: SlotValue,
  {
    if self.has_failed() {
      event!(Level::DEBUG, "Flow already failed; step short-circuited.");
      return Ok(self);
    }
    self.ensure_key_available(key)?;
    self.notifier.step_start(key);
    let origin = type_name::<F>();

    if self.caching_enabled && kind == EntryKind::Step {
      if let Some(cached) = self.cache.try_get::<Out>(key) {
        event!(Level::DEBUG, "Output cache hit; step function not invoked.");
        let record = StepRecord::new(key, origin, EntryKind::Cached, None);
        self.record_settled(record, Ok(cached), false);
        return Ok(self);
      }
    }

    let resolution = {
      let cx = ResolveContext::new(&self.store, &self.validators);
      inputs.resolve(&cx).await
    };
    let values = match resolution {
      Ok(Ok(values)) => values,
      Ok(Err(rejection)) => {
        // An input failing after the flag was set is the earlier failure showing
        // through; the ledger already holds it.
        if matches!(rejection, Rejection::Dependency { .. }) && self.has_failed() {
          event!(Level::DEBUG, "Input failed after the flow failed; step short-circuited.");
          self.notifier.step_short_circuited(key);
          return Ok(self);
        }
        let record = StepRecord::new(key, origin, kind, None);
        self.record_settled::<Out>(record, Err(rejection.into_failure()), true);
        return Ok(self);
      }
      Err(fatal) => {
        event!(Level::ERROR, error = %fatal, "Input resolution failed.");
        self.notifier.exception(key, &fatal);
        return Err(fatal);
      }
    };

    let cancel = options.cancel.unwrap_or_else(|| self.cancel.clone());
    let computation = match options.policy.or_else(|| self.policy.clone()) {
      Some(policy) => with_policy(key, policy, step_fn, values, cancel),
      None => match catch_unwind(AssertUnwindSafe(|| step_fn(values, cancel))) {
        Ok(pending) => pending.map(Ok).boxed(),
        Err(payload) => {
          let error = FlowError::panicked(key, payload.as_ref());
          event!(Level::ERROR, error = %error, "Step function panicked while starting.");
          self.notifier.exception(key, &error);
          return Err(error);
        }
      },
    };

    let record = StepRecord::new(key, origin, kind, options.compensation);
    self.record_pending(record, computation);
    event!(Level::DEBUG, "Step spawned.");
    Ok(self)
  }
}

/// Runs `step_fn` through `policy`. A panic in the step surfaces when the
/// spawned computation is polled.
fn with_policy<V, F, Fut, Out>(
  key: &str,
  policy: Arc<dyn ResiliencePolicy>,
  step_fn: F,
  values: V,
  cancel: CancellationToken,
) -> BoxFuture<'static, Settlement<Out>>
where
  V: Clone + Send + Sync + 'static,
  F: Fn(V, CancellationToken) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Outcome<Out>> + Send + 'static,
  Out: SlotValue,
{
  let step_fn = Arc::new(step_fn);
  let attempt = Attempt::new(move || {
    let step_fn = Arc::clone(&step_fn);
    let values = values.clone();
    let cancel = cancel.clone();
    async move { step_fn(values, cancel).await.map(|out| Box::new(out) as AnyValue) }
  });

  let key = key.to_string();
  async move {
    match policy.execute(&key, attempt).await {
      Ok(value) => match value.downcast::<Out>() {
        Ok(out) => Ok(Ok(*out)),
        Err(_) => Err(FlowError::TypeMismatch {
          name: key,
          expected_type: type_name::<Out>(),
        }),
      },
      Err(failure) => Ok(Err(failure)),
    }
  }
  .boxed()
}
