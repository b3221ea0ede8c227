// sagaflow/src/core/store.rs

//! The typed context store shared by a flow, its groups and its compensations.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;

use crate::core::outcome::Outcome;
use crate::core::slot::{ErasedSlot, Slot, SlotValue};
use crate::error::{FlowError, FlowResult};

/// Name of the unkeyed slot of a type: "the current value of type T".
pub const CURRENT_SLOT: &str = "";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
  name: String,
  type_id: TypeId,
}

impl SlotKey {
  fn of<T: 'static>(name: &str) -> Self {
    SlotKey {
      name: name.to_string(),
      type_id: TypeId::of::<T>(),
    }
  }
}

/// An addressable map from `(name, type)` to a [`Slot`].
///
/// `ContextStore` is a cheap handle: clones share the same slots. Lock guards
/// are internal and never held across an `.await`.
#[derive(Clone, Default)]
pub struct ContextStore(Arc<RwLock<HashMap<SlotKey, Box<dyn ErasedSlot>>>>);

impl ContextStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Installs or overwrites the slot `(name, T)`.
  pub fn set_slot<T: SlotValue>(&self, name: &str, slot: Slot<T>) {
    self.0.write().insert(SlotKey::of::<T>(name), Box::new(slot));
  }

  pub fn set_value<T: SlotValue>(&self, name: &str, value: T) {
    self.set_slot(name, Slot::settled(Ok(value)));
  }

  pub fn set_outcome<T: SlotValue>(&self, name: &str, outcome: Outcome<T>) {
    self.set_slot(name, Slot::settled(outcome));
  }

  /// Returns a handle to the slot `(name, T)`.
  pub fn get<T: SlotValue>(&self, name: &str) -> FlowResult<Slot<T>> {
    let guard = self.0.read();
    let erased = guard.get(&SlotKey::of::<T>(name)).ok_or_else(|| FlowError::SlotNotFound {
      name: name.to_string(),
      type_name: type_name::<T>(),
    })?;
    // The key carries T's TypeId, so the downcast only fails on a broken invariant.
    erased
      .as_any()
      .downcast_ref::<Slot<T>>()
      .cloned()
      .ok_or_else(|| FlowError::TypeMismatch {
        name: name.to_string(),
        expected_type: type_name::<T>(),
      })
  }

  /// The settled outcome of `(name, T)`, without waiting.
  ///
  /// `None` if the slot is missing, still pending, or its step panicked.
  pub fn peek<T: SlotValue>(&self, name: &str) -> Option<Outcome<T>> {
    self.get::<T>(name).ok().and_then(|slot| slot.peek())
  }

  /// Shorthand for a settled, successful value.
  pub fn peek_value<T: SlotValue>(&self, name: &str) -> Option<T> {
    self.peek::<T>(name).and_then(Result::ok)
  }

  pub fn contains<T: SlotValue>(&self, name: &str) -> bool {
    self.0.read().contains_key(&SlotKey::of::<T>(name))
  }

  pub fn len(&self) -> usize {
    self.0.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.read().is_empty()
  }

  /// One settlement future per slot currently in the store.
  ///
  /// Slots installed after this call are not included.
  pub fn all_pending(&self) -> Vec<BoxFuture<'static, FlowResult<()>>> {
    self.0.read().values().map(|slot| slot.settled()).collect()
  }
}

impl std::fmt::Debug for ContextStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ContextStore").field("slots", &self.len()).finish()
  }
}
