// sagaflow/src/core/slot.rs

//! A single pending-or-settled computation stored in the context.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use futures_util::future::{self, BoxFuture, FutureExt, Shared};

use crate::core::outcome::Outcome;
use crate::error::FlowResult;

/// Bound shared by every value that can live in a slot.
///
/// Slots are awaited by any number of readers, so values are cloned out.
/// Wrap large values in an `Arc` if cloning them is expensive.
pub trait SlotValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> SlotValue for T {}

/// What a slot eventually yields. The outer `Err` is reserved for fatal errors
/// (the producing step panicked); step failures are the inner `Outcome`.
pub(crate) type Settlement<T> = FlowResult<Outcome<T>>;

/// A cloneable handle to a computation producing `Outcome<T>`.
///
/// Cloning a `Slot` does not re-run anything: all clones observe the same
/// settlement.
pub struct Slot<T: SlotValue> {
  // Written once by whoever settles the slot; lets `peek` work without polling.
  cell: Arc<OnceLock<Settlement<T>>>,
  waiter: Shared<BoxFuture<'static, Settlement<T>>>,
}

impl<T: SlotValue> Clone for Slot<T> {
  fn clone(&self) -> Self {
    Slot {
      cell: Arc::clone(&self.cell),
      waiter: self.waiter.clone(),
    }
  }
}

impl<T: SlotValue> Slot<T> {
  /// A slot that is already settled.
  pub fn settled(outcome: Outcome<T>) -> Self {
    let cell = Arc::new(OnceLock::new());
    let _ = cell.set(Ok(outcome.clone()));
    Slot {
      cell,
      waiter: future::ready(Ok(outcome)).boxed().shared(),
    }
  }

  /// Wraps a computation that writes its own settlement into `cell` before it
  /// resolves. Used by the flow for spawned step tasks.
  pub(crate) fn from_parts(
    cell: Arc<OnceLock<Settlement<T>>>,
    waiter: BoxFuture<'static, Settlement<T>>,
  ) -> Self {
    Slot {
      cell,
      waiter: waiter.shared(),
    }
  }

  /// Waits for the computation and returns its outcome.
  ///
  /// Returns `Err` only if the producing step panicked or its task was lost.
  pub async fn resolve(&self) -> FlowResult<Outcome<T>> {
    if let Some(settled) = self.cell.get() {
      return settled.clone();
    }
    self.waiter.clone().await
  }

  /// The outcome, if the slot has already settled normally.
  pub fn peek(&self) -> Option<Outcome<T>> {
    match self.cell.get() {
      Some(Ok(outcome)) => Some(outcome.clone()),
      _ => None,
    }
  }

  pub fn is_settled(&self) -> bool {
    self.cell.get().is_some()
  }
}

/// Type-erased view over `Slot<T>` so slots of any type can share one map.
pub(crate) trait ErasedSlot: Send + Sync {
  fn as_any(&self) -> &dyn Any;

  /// Resolves once the slot settles, reporting fatal errors only.
  fn settled(&self) -> BoxFuture<'static, FlowResult<()>>;
}

impl<T: SlotValue> ErasedSlot for Slot<T> {
  fn as_any(&self) -> &dyn Any {
    self
  }

  fn settled(&self) -> BoxFuture<'static, FlowResult<()>> {
    let slot = self.clone();
    async move { slot.resolve().await.map(|_| ()) }.boxed()
  }
}
