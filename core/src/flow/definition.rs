// sagaflow/src/flow/definition.rs

//! The `Flow` struct, its seed constructors and its configuration methods.

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{event, Level};

use crate::core::cache::OutputCache;
use crate::core::ledger::{EntryKind, Ledger, StepRecord};
use crate::core::outcome::Outcome;
use crate::core::slot::SlotValue;
use crate::core::store::{ContextStore, CURRENT_SLOT};
use crate::flow::tracking::spawn_settlement;
use crate::hooks::{EventHooks, Notifier};
use crate::policy::ResiliencePolicy;
use crate::validation::{Validator, Validators};

/// A typed, keyed pipeline of asynchronous steps.
///
/// A `Flow` is created by one of the `start_with*` constructors and grown with
/// `then`, `then_do`, `then_if`, `map` and `group`. Each step reads its inputs
/// from the shared [`ContextStore`], runs as its own task, and writes its
/// outcome back under its key. The first recorded failure stops every later
/// step from running.
///
/// A `Flow` has a single owner; registration methods take `&mut self`.
pub struct Flow {
  pub(crate) store: ContextStore,
  pub(crate) cache: OutputCache,
  pub(crate) validators: Validators,
  pub(crate) ledger: Ledger,
  pub(crate) notifier: Notifier,
  pub(crate) policy: Option<Arc<dyn ResiliencePolicy>>,
  pub(crate) cancel: CancellationToken,
  pub(crate) caching_enabled: bool,
}

impl Flow {
  fn empty() -> Self {
    Flow {
      store: ContextStore::new(),
      cache: OutputCache::new(),
      validators: Validators::default(),
      ledger: Ledger::default(),
      notifier: Notifier::default(),
      policy: None,
      cancel: CancellationToken::new(),
      caching_enabled: false,
    }
  }

  /// A flow sharing this one's store, cache, validators and settings, with an
  /// empty ledger of its own.
  pub(crate) fn child(&self) -> Self {
    Flow {
      store: self.store.clone(),
      cache: self.cache.clone(),
      validators: self.validators.clone(),
      ledger: Ledger::default(),
      notifier: self.notifier.clone(),
      policy: self.policy.clone(),
      cancel: self.cancel.clone(),
      caching_enabled: self.caching_enabled,
    }
  }

  // --- Seeding ---

  /// Starts a flow whose first step is the successful value `value` under `key`.
  ///
  /// See [`Flow::start_with_outcome`] for how an empty key is treated.
  pub fn start_with<T: SlotValue>(key: &str, value: T) -> Self {
    Self::start_with_outcome(key, Ok(value))
  }

  /// Starts a flow from an already-known outcome. A failed seed leaves the flow failed.
  ///
  /// Seed keys should be non-empty like any step key. An empty key seeds the
  /// unkeyed slot of `T`, the value read by [`current`](crate::current).
  pub fn start_with_outcome<T: SlotValue>(key: &str, outcome: Outcome<T>) -> Self {
    let mut flow = Self::empty();
    let record = StepRecord::new(key, "start_with", EntryKind::Seed, None);
    flow.record_settled(record, outcome, false);
    event!(Level::DEBUG, step_key = %key, value_type = %type_name::<T>(), "Flow seeded.");
    flow
  }

  /// Starts a flow from a computation that is still running.
  ///
  /// The computation is spawned on the current tokio runtime. An empty key is
  /// treated as in [`Flow::start_with_outcome`].
  pub fn start_with_future<T, Fut>(key: &str, computation: Fut) -> Self
  where
    T: SlotValue,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
  {
    let mut flow = Self::empty();
    let record = StepRecord::new(key, type_name::<Fut>(), EntryKind::Seed, None);
    flow.record_pending(record, computation.map(Ok).boxed());
    event!(Level::DEBUG, step_key = %key, value_type = %type_name::<T>(), "Flow seeded with pending computation.");
    flow
  }

  // --- Keyed variables ---

  /// Adds `value` under `(key, T)` without creating a ledger entry.
  ///
  /// Skipped when the flow has already failed.
  pub fn add_keyed_variable<T: SlotValue>(&mut self, key: &str, value: T) -> &mut Self {
    self.add_keyed_outcome(key, Ok(value))
  }

  pub fn add_keyed_outcome<T: SlotValue>(&mut self, key: &str, outcome: Outcome<T>) -> &mut Self {
    if self.has_failed() {
      event!(Level::DEBUG, variable_key = %key, "Flow already failed; keyed variable skipped.");
      return self;
    }
    self.store.set_outcome(key, outcome);
    self
  }

  /// Adds a pending computation under `(key, T)`. It is spawned on the current
  /// tokio runtime and is awaited by `finish_all` like any step.
  pub fn add_keyed_future<T, Fut>(&mut self, key: &str, computation: Fut) -> &mut Self
  where
    T: SlotValue,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
  {
    if self.has_failed() {
      event!(Level::DEBUG, variable_key = %key, "Flow already failed; keyed variable skipped.");
      return self;
    }
    let slot = spawn_settlement(key, computation.map(Ok).boxed(), Notifier::default(), None);
    self.store.set_slot(key, slot);
    self
  }

  /// Sets the unkeyed ("current") value of type `T`, read by inputs bound with
  /// [`current`](crate::current) or [`Input::or_current`](crate::Input::or_current).
  pub fn add_variable<T: SlotValue>(&mut self, value: T) -> &mut Self {
    self.add_keyed_outcome(CURRENT_SLOT, Ok(value))
  }

  // --- Configuration ---

  pub fn with_hooks(mut self, hooks: Arc<dyn EventHooks>) -> Self {
    self.notifier = Notifier::new(hooks);
    self
  }

  /// Policy wrapping every step call that has no per-call policy.
  pub fn with_policy(mut self, policy: Arc<dyn ResiliencePolicy>) -> Self {
    self.policy = Some(policy);
    self
  }

  /// Registers the validator run on every resolved input of type `T`.
  /// Replaces any validator previously registered for `T`.
  pub fn with_validator<T, V>(self, validator: V) -> Self
  where
    T: SlotValue,
    V: Validator<T> + 'static,
  {
    self.validators.insert::<T>(Arc::new(validator));
    self
  }

  /// Token passed to every step that has no per-call token.
  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancel = token;
    self
  }

  /// Uses `cache` instead of this flow's private cache, so outputs can be
  /// shared between flows.
  pub fn with_output_cache(mut self, cache: OutputCache) -> Self {
    self.cache = cache;
    self
  }

  /// Makes `then` consult the output cache before running a step.
  pub fn enable_output_caching(&mut self) -> &mut Self {
    self.caching_enabled = true;
    self
  }

  pub fn set_cache_item<T: SlotValue>(&mut self, name: &str, value: T) -> &mut Self {
    self.cache.set(name, value);
    self
  }

  pub fn try_get_cache_item<T: SlotValue>(&self, name: &str) -> Option<T> {
    self.cache.try_get(name)
  }

  // --- Inspection ---

  /// Read-only view of the ledger, in registration order.
  pub fn steps(&self) -> &[StepRecord] {
    self.ledger.records()
  }

  /// True once any settled step of this flow has failed. Never resets.
  pub fn has_failed(&self) -> bool {
    self.ledger.has_failed()
  }

  pub fn store(&self) -> &ContextStore {
    &self.store
  }

  pub fn output_cache(&self) -> &OutputCache {
    &self.cache
  }

  pub fn cancellation_token(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn is_output_caching_enabled(&self) -> bool {
    self.caching_enabled
  }
}

impl std::fmt::Debug for Flow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Flow")
      .field("steps", &self.ledger.records())
      .field("store", &self.store)
      .field("caching_enabled", &self.caching_enabled)
      .field("has_policy", &self.policy.is_some())
      .finish()
  }
}
