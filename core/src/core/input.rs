// sagaflow/src/core/input.rs

//! Explicit, typed input bindings for steps.
//!
//! A step declares where each of its inputs comes from with [`input`] (a named
//! slot) or [`current`] (the unkeyed slot of the type). Inputs are grouped in a
//! tuple, resolved in declaration order, and handed to the step function as a
//! tuple of values:
//!
//! ```ignore
//! flow
//!   .then("total", (input::<u32>("qty"), input::<u32>("price")), |(qty, price), _cancel| async move {
//!     Ok(qty * price)
//!   })
//!   .await?;
//! ```

use std::any::type_name;
use std::marker::PhantomData;

use futures_util::future::BoxFuture;

use crate::core::outcome::{Failure, Reason};
use crate::core::slot::{Slot, SlotValue};
use crate::core::store::{ContextStore, CURRENT_SLOT};
use crate::error::{FlowError, FlowResult};
use crate::validation::{Validators, Violation};

/// Binding of one step input to a slot of type `T`.
pub struct Input<T> {
  name: String,
  fallback_to_current: bool,
  _marker: PhantomData<fn() -> T>,
}

/// Binds to the slot `(name, T)`.
pub fn input<T: SlotValue>(name: impl Into<String>) -> Input<T> {
  Input {
    name: name.into(),
    fallback_to_current: false,
    _marker: PhantomData,
  }
}

/// Binds to the unkeyed slot of `T` (see `Flow::add_variable`).
pub fn current<T: SlotValue>() -> Input<T> {
  input(CURRENT_SLOT)
}

impl<T: SlotValue> Input<T> {
  /// Falls back to the unkeyed slot of `T` when `(name, T)` does not exist.
  pub fn or_current(mut self) -> Self {
    self.fallback_to_current = true;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  fn label(&self) -> String {
    if self.name == CURRENT_SLOT {
      format!("<current {}>", type_name::<T>())
    } else {
      self.name.clone()
    }
  }

  fn locate(&self, store: &ContextStore) -> FlowResult<Slot<T>> {
    match store.get::<T>(&self.name) {
      Err(FlowError::SlotNotFound { .. }) if self.fallback_to_current => {
        // Report the declared name, not the fallback, when both are missing.
        store.get::<T>(CURRENT_SLOT).map_err(|_| FlowError::SlotNotFound {
          name: self.name.clone(),
          type_name: type_name::<T>(),
        })
      }
      other => other,
    }
  }

  async fn resolve(&self, cx: &ResolveContext<'_>) -> FlowResult<Result<T, Rejection>> {
    let slot = self.locate(cx.store)?;
    let value = match slot.resolve().await? {
      Ok(value) => value,
      Err(failure) => {
        return Ok(Err(Rejection::Dependency {
          input: self.label(),
          failure,
        }))
      }
    };

    if let Some(validator) = cx.validators.get::<T>() {
      let violations = validator.validate(&value).await;
      if !violations.is_empty() {
        return Ok(Err(Rejection::Invalid {
          input: self.label(),
          violations,
        }));
      }
    }
    Ok(Ok(value))
  }
}

/// Where inputs are resolved from.
pub struct ResolveContext<'a> {
  store: &'a ContextStore,
  validators: &'a Validators,
}

impl<'a> ResolveContext<'a> {
  pub(crate) fn new(store: &'a ContextStore, validators: &'a Validators) -> Self {
    ResolveContext { store, validators }
  }
}

/// Why a step's inputs could not be handed to it.
#[derive(Debug, Clone)]
pub enum Rejection {
  /// An input resolved to a failure.
  Dependency { input: String, failure: Failure },
  /// A validator rejected an input.
  Invalid { input: String, violations: Vec<Violation> },
}

impl Rejection {
  /// The failure recorded for the rejected step.
  pub(crate) fn into_failure(self) -> Failure {
    match self {
      Rejection::Dependency { input, failure } => {
        Reason::dependency(format!("input '{}' failed", input))
          .with_metadata("input", &input)
          .caused_by_all(failure.into_reasons())
          .into()
      }
      Rejection::Invalid { input, violations } => {
        Reason::validation(format!("{} validation error(s) for input '{}'", violations.len(), input))
          .with_metadata("input", &input)
          .caused_by_all(violations.into_iter().map(Violation::into_reason))
          .into()
      }
    }
  }
}

/// A tuple of [`Input`] bindings.
///
/// Implemented for `()` and tuples of up to six inputs. `Values` is the tuple
/// of resolved values passed to the step function.
pub trait Inputs: Send + Sync + 'static {
  type Values: Clone + Send + Sync + 'static;

  #[doc(hidden)]
  fn resolve<'a>(&'a self, cx: &'a ResolveContext<'a>) -> BoxFuture<'a, FlowResult<Result<Self::Values, Rejection>>>;
}

impl Inputs for () {
  type Values = ();

  fn resolve<'a>(&'a self, _cx: &'a ResolveContext<'a>) -> BoxFuture<'a, FlowResult<Result<(), Rejection>>> {
    Box::pin(async { Ok(Ok(())) })
  }
}

macro_rules! impl_inputs {
  ($($T:ident $v:ident),+) => {
    impl<$($T: SlotValue),+> Inputs for ($(Input<$T>,)+) {
      type Values = ($($T,)+);

      fn resolve<'a>(&'a self, cx: &'a ResolveContext<'a>) -> BoxFuture<'a, FlowResult<Result<Self::Values, Rejection>>> {
        let ($($v,)+) = self;
        Box::pin(async move {
          $(
            let $v = match $v.resolve(cx).await {
              Ok(Ok(value)) => value,
              Ok(Err(rejection)) => return Ok(Err(rejection)),
              Err(fatal) => return Err(fatal),
            };
          )+
          Ok(Ok(($($v,)+)))
        })
      }
    }
  };
}

impl_inputs!(A a);
impl_inputs!(A a, B b);
impl_inputs!(A a, B b, C c);
impl_inputs!(A a, B b, C c, D d);
impl_inputs!(A a, B b, C c, D d, E e);
impl_inputs!(A a, B b, C c, D d, E e, F f);
