// sagaflow/src/validation.rs

//! Per-type validators applied to resolved step inputs.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::outcome::Reason;
use crate::core::slot::SlotValue;

/// A single rule violation reported by a [`Validator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
  pub field: Option<String>,
  pub message: String,
}

impl Violation {
  pub fn new(message: impl Into<String>) -> Self {
    Violation {
      field: None,
      message: message.into(),
    }
  }

  pub fn at(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }

  pub(crate) fn into_reason(self) -> Reason {
    let reason = Reason::validation(self.message);
    match self.field {
      Some(field) => reason.with_metadata("field", field),
      None => reason,
    }
  }
}

impl fmt::Display for Violation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.field {
      Some(field) => write!(f, "{}: {}", field, self.message),
      None => f.write_str(&self.message),
    }
  }
}

/// Structural validation of values of type `T`.
///
/// An empty list means the value is valid.
#[async_trait]
pub trait Validator<T>: Send + Sync
where
  T: Send + Sync + 'static,
{
  async fn validate(&self, value: &T) -> Vec<Violation>;
}

/// Validators registered on a flow, at most one per type.
#[derive(Clone, Default)]
pub(crate) struct Validators(Arc<RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>>);

impl Validators {
  pub(crate) fn insert<T: SlotValue>(&self, validator: Arc<dyn Validator<T>>) {
    self.0.write().insert(TypeId::of::<T>(), Box::new(validator));
  }

  pub(crate) fn get<T: SlotValue>(&self) -> Option<Arc<dyn Validator<T>>> {
    self
      .0
      .read()
      .get(&TypeId::of::<T>())
      .and_then(|v| v.downcast_ref::<Arc<dyn Validator<T>>>())
      .cloned()
  }
}
