// sagaflow/src/core/cache.rs

//! Output cache, independent from the context store.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::slot::SlotValue;

/// Previously produced step outputs, keyed by `(name, type)`.
///
/// Handles are shared: the same cache can back several flows.
#[derive(Clone, Default)]
pub struct OutputCache(Arc<RwLock<HashMap<(String, TypeId), Box<dyn Any + Send + Sync>>>>);

impl OutputCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set<T: SlotValue>(&self, name: &str, value: T) {
    self
      .0
      .write()
      .insert((name.to_string(), TypeId::of::<T>()), Box::new(value));
  }

  pub fn try_get<T: SlotValue>(&self, name: &str) -> Option<T> {
    self
      .0
      .read()
      .get(&(name.to_string(), TypeId::of::<T>()))
      .and_then(|item| item.downcast_ref::<T>())
      .cloned()
  }

  pub fn remove<T: SlotValue>(&self, name: &str) -> Option<T> {
    self
      .0
      .write()
      .remove(&(name.to_string(), TypeId::of::<T>()))
      .and_then(|item| item.downcast::<T>().ok())
      .map(|boxed| *boxed)
  }

  pub fn len(&self) -> usize {
    self.0.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.read().is_empty()
  }
}

impl std::fmt::Debug for OutputCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OutputCache").field("items", &self.len()).finish()
  }
}
