// sagaflow/src/core/ledger.rs

//! The step ledger: an ordered record of every step a flow registered.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;

use crate::core::outcome::{Failure, Outcome};
use crate::core::slot::ErasedSlot;
use crate::core::store::ContextStore;
use crate::error::FlowResult;

/// Settlement state of a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
  /// The computation has not settled yet.
  Pending,
  Succeeded,
  Failed(Failure),
  /// A `map` whose source had failed; it produced no outcome of its own.
  Bypassed,
  /// The computation panicked.
  Faulted(String),
}

/// How an entry got into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
  /// Created by `start_with`.
  Seed,
  /// `then` and its variants.
  Step,
  /// `then_do`.
  Action,
  /// Synthesized from the output cache; the step function never ran.
  Cached,
  /// `map` / `map_async`.
  Map,
  /// A group failure escalated by its failure handler.
  Group,
}

pub(crate) type CompensationFn = Arc<dyn Fn(ContextStore) -> BoxFuture<'static, Outcome<()>> + Send + Sync>;

/// A rollback action attached to a step.
#[derive(Clone)]
pub struct Compensation {
  key: String,
  action: CompensationFn,
}

impl Compensation {
  pub fn new<F, Fut>(key: impl Into<String>, action: F) -> Self
  where
    F: Fn(ContextStore) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<()>> + Send + 'static,
  {
    Compensation {
      key: key.into(),
      action: Arc::new(move |store| action(store).boxed()),
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub(crate) fn invoke(&self, store: ContextStore) -> BoxFuture<'static, Outcome<()>> {
    (self.action)(store)
  }
}

impl std::fmt::Debug for Compensation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Compensation").field("key", &self.key).finish()
  }
}

/// One ledger entry.
///
/// The status is shared with the task computing the step, which writes it
/// exactly once when it settles.
#[derive(Clone)]
pub struct StepRecord {
  key: String,
  origin: String,
  kind: EntryKind,
  group: Option<String>,
  status: Arc<Mutex<StepStatus>>,
  compensation: Option<Compensation>,
  // The slot this entry settles, kept even if the store entry is overwritten.
  completion: Option<Arc<dyn ErasedSlot>>,
}

impl StepRecord {
  pub(crate) fn new(key: &str, origin: impl Into<String>, kind: EntryKind, compensation: Option<Compensation>) -> Self {
    StepRecord {
      key: key.to_string(),
      origin: origin.into(),
      kind,
      group: None,
      status: Arc::new(Mutex::new(StepStatus::Pending)),
      compensation,
      completion: None,
    }
  }

  pub(crate) fn with_status(self, status: StepStatus) -> Self {
    *self.status.lock() = status;
    self
  }

  pub(crate) fn with_completion(mut self, slot: Arc<dyn ErasedSlot>) -> Self {
    self.completion = Some(slot);
    self
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  /// Identity of the function that produced this entry, for diagnostics.
  pub fn origin(&self) -> &str {
    &self.origin
  }

  pub fn kind(&self) -> EntryKind {
    self.kind
  }

  /// The group this entry was spliced from, if any.
  pub fn group(&self) -> Option<&str> {
    self.group.as_deref()
  }

  /// Snapshot of the current status.
  pub fn status(&self) -> StepStatus {
    self.status.lock().clone()
  }

  pub fn is_settled(&self) -> bool {
    !matches!(*self.status.lock(), StepStatus::Pending)
  }

  pub fn is_success(&self) -> bool {
    matches!(*self.status.lock(), StepStatus::Succeeded)
  }

  /// The errors this entry settled with, if it failed.
  pub fn errors(&self) -> Option<Failure> {
    match &*self.status.lock() {
      StepStatus::Failed(failure) => Some(failure.clone()),
      _ => None,
    }
  }

  pub fn compensation_key(&self) -> Option<&str> {
    self.compensation.as_ref().map(Compensation::key)
  }

  pub(crate) fn compensation(&self) -> Option<&Compensation> {
    self.compensation.as_ref()
  }

  pub(crate) fn status_handle(&self) -> Arc<Mutex<StepStatus>> {
    Arc::clone(&self.status)
  }

  /// Resolves once this entry's computation has settled.
  pub(crate) fn completion(&self) -> Option<BoxFuture<'static, FlowResult<()>>> {
    self.completion.as_ref().map(|slot| slot.settled())
  }
}

impl std::fmt::Debug for StepRecord {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepRecord")
      .field("key", &self.key)
      .field("origin", &self.origin)
      .field("kind", &self.kind)
      .field("group", &self.group)
      .field("status", &self.status())
      .field("compensation_key", &self.compensation_key())
      .finish()
  }
}

/// Append-only list of step records in registration order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Ledger {
  records: Vec<StepRecord>,
}

impl Ledger {
  pub(crate) fn records(&self) -> &[StepRecord] {
    &self.records
  }

  pub(crate) fn contains(&self, key: &str) -> bool {
    self.records.iter().any(|r| r.key == key)
  }

  pub(crate) fn push(&mut self, record: StepRecord) {
    self.records.push(record);
  }

  pub(crate) fn pending(&self) -> Vec<BoxFuture<'static, FlowResult<()>>> {
    self
      .records
      .iter()
      .filter(|r| !r.is_settled())
      .filter_map(StepRecord::completion)
      .collect()
  }

  /// Entries that count towards this flow's own failure state.
  fn own(&self) -> impl Iterator<Item = &StepRecord> {
    self.records.iter().filter(|r| r.group.is_none())
  }

  pub(crate) fn has_failed(&self) -> bool {
    self.own().any(|r| r.errors().is_some())
  }

  /// All errors of failed entries, concatenated in ledger order.
  pub(crate) fn aggregate(&self) -> Outcome<()> {
    let mut combined: Option<Failure> = None;
    for failure in self.own().filter_map(StepRecord::errors) {
      match combined.as_mut() {
        Some(all) => all.extend(failure),
        None => combined = Some(failure),
      }
    }
    combined.map_or(Ok(()), Err)
  }

  /// Appends `child`'s entries, tagging untagged ones with `group`.
  pub(crate) fn splice(&mut self, child: &Ledger, group: &str) {
    for record in &child.records {
      let mut spliced = record.clone();
      if spliced.group.is_none() {
        spliced.group = Some(group.to_string());
      }
      self.records.push(spliced);
    }
  }
}
