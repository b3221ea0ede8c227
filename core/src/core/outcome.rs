// sagaflow/src/core/outcome.rs

//! The success/failure value every step produces.
//!
//! A step yields `Outcome<T>`, which is a plain `Result<T, Failure>`. A `Failure`
//! carries an ordered, non-empty list of `Reason`s; each reason has a message,
//! string metadata and nested causes.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Result of a single step.
pub type Outcome<T = ()> = Result<T, Failure>;

/// Where a reason originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonKind {
  /// Returned by a step's own computation.
  Step,
  /// A validator rejected a resolved input.
  Validation,
  /// A `map`/`map_async` transform panicked.
  Mapping,
  /// An input of the step resolved to a failure.
  Dependency,
}

/// One structured error reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reason {
  kind: ReasonKind,
  message: String,
  metadata: BTreeMap<String, String>,
  causes: Vec<Reason>,
}

impl Reason {
  pub fn new(message: impl Into<String>) -> Self {
    Self::of_kind(ReasonKind::Step, message)
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::of_kind(ReasonKind::Validation, message)
  }

  pub fn mapping(message: impl Into<String>) -> Self {
    Self::of_kind(ReasonKind::Mapping, message)
  }

  pub fn dependency(message: impl Into<String>) -> Self {
    Self::of_kind(ReasonKind::Dependency, message)
  }

  fn of_kind(kind: ReasonKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      metadata: BTreeMap::new(),
      causes: Vec::new(),
    }
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self.metadata.insert(key.into(), value.to_string());
    self
  }

  pub fn caused_by(mut self, cause: Reason) -> Self {
    self.causes.push(cause);
    self
  }

  pub fn caused_by_all(mut self, causes: impl IntoIterator<Item = Reason>) -> Self {
    self.causes.extend(causes);
    self
  }

  pub fn kind(&self) -> ReasonKind {
    self.kind
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn metadata(&self) -> &BTreeMap<String, String> {
    &self.metadata
  }

  pub fn causes(&self) -> &[Reason] {
    &self.causes
  }
}

impl fmt::Display for Reason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)?;
    if !self.causes.is_empty() {
      let causes: Vec<String> = self.causes.iter().map(ToString::to_string).collect();
      write!(f, " (caused by: {})", causes.join(", "))?;
    }
    Ok(())
  }
}

/// The failed side of an `Outcome`: one or more reasons, in order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", display_reasons(.0))]
pub struct Failure(Vec<Reason>);

fn display_reasons(reasons: &[Reason]) -> String {
  let parts: Vec<String> = reasons.iter().map(ToString::to_string).collect();
  parts.join("; ")
}

impl Failure {
  /// Shorthand for a failure with a single step-defined reason.
  pub fn msg(message: impl Into<String>) -> Self {
    Failure(vec![Reason::new(message)])
  }

  /// Builds a failure from a list of reasons.
  ///
  /// An empty list still produces a failure, carrying a generic reason, so that
  /// a `Failure` is never mistaken for success.
  pub fn from_reasons(reasons: Vec<Reason>) -> Self {
    if reasons.is_empty() {
      return Failure::msg("step failed without a reason");
    }
    Failure(reasons)
  }

  pub fn reasons(&self) -> &[Reason] {
    &self.0
  }

  pub fn into_reasons(self) -> Vec<Reason> {
    self.0
  }

  pub(crate) fn extend(&mut self, other: Failure) {
    self.0.extend(other.0);
  }
}

impl From<Reason> for Failure {
  fn from(reason: Reason) -> Self {
    Failure(vec![reason])
  }
}

impl From<Vec<Reason>> for Failure {
  fn from(reasons: Vec<Reason>) -> Self {
    Failure::from_reasons(reasons)
  }
}

// Lets step bodies use `?` on anything anyhow can hold. The outermost context
// becomes the reason message and the rest of the chain its nested causes.
impl From<anyhow::Error> for Failure {
  fn from(err: anyhow::Error) -> Self {
    let mut chain = err.chain();
    let head = chain
      .next()
      .map(ToString::to_string)
      .unwrap_or_else(|| "unknown error".to_string());
    let reason = Reason::new(head).caused_by_all(chain.map(|cause| Reason::new(cause.to_string())));
    Failure(vec![reason])
  }
}
