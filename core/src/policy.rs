// sagaflow/src/policy.rs

//! Resilience policies (retry, backoff, circuit breaking) wrap a step's call.
//!
//! The flow treats a policy as opaque: it hands over an [`Attempt`] and takes
//! whatever outcome comes back. The policy decides how many times to run the
//! attempt and what to do between runs.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::core::outcome::Outcome;

/// A type-erased step output, as seen by a policy.
pub type AnyValue = Box<dyn Any + Send>;

/// One invocation of a step function. Calling [`Attempt::run`] again starts a
/// fresh call with the same inputs.
#[derive(Clone)]
pub struct Attempt {
  call: Arc<dyn Fn() -> BoxFuture<'static, Outcome<AnyValue>> + Send + Sync>,
}

impl Attempt {
  pub(crate) fn new<F, Fut>(call: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<AnyValue>> + Send + 'static,
  {
    Attempt {
      call: Arc::new(move || call().boxed()),
    }
  }

  pub fn run(&self) -> BoxFuture<'static, Outcome<AnyValue>> {
    (self.call)()
  }
}

#[async_trait]
pub trait ResiliencePolicy: Send + Sync {
  /// Runs `attempt` one or more times and returns the outcome to record for `step_key`.
  async fn execute(&self, step_key: &str, attempt: Attempt) -> Outcome<AnyValue>;
}
