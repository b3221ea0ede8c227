// sagaflow/src/error.rs

//! Fatal flow errors.
//!
//! `FlowError` is for conditions the caller must handle immediately (programming
//! mistakes such as duplicate keys, or a step that panicked). Recoverable step
//! failures are `Failure` values and live in the ledger instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
  #[error("Step key '{key}' is already used in this flow. All step keys must be unique.")]
  DuplicateStepKey { key: String },

  #[error("Step key cannot be empty. The empty name is reserved for unkeyed values.")]
  EmptyStepKey,

  #[error("Slot not found: no value of type {type_name} under name '{name}'")]
  SlotNotFound { name: String, type_name: &'static str },

  #[error("Step '{key}' panicked: {message}")]
  StepPanicked { key: String, message: String },

  #[error("Type mismatch for slot '{name}' (expected {expected_type})")]
  TypeMismatch { name: String, expected_type: &'static str },

  #[error("Task for step '{key}' was aborted by the runtime: {message}")]
  TaskAborted { key: String, message: String },
}

impl FlowError {
  pub(crate) fn panicked(key: &str, payload: &(dyn std::any::Any + Send)) -> Self {
    FlowError::StepPanicked {
      key: key.to_string(),
      message: panic_message(payload),
    }
  }
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&'static str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

pub type FlowResult<T, E = FlowError> = std::result::Result<T, E>;
