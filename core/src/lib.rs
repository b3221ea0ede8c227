// src/lib.rs

//! Sagaflow: an async, type-safe step orchestrator with saga-style compensation.
//!
//! A [`Flow`] chains named asynchronous steps. Each step:
//!  - declares its inputs as typed bindings to named slots of a shared context,
//!  - runs as its own tokio task, so independent steps overlap,
//!  - records its outcome in an ordered ledger under its key.
//!
//! The first failure stops later steps from starting. Successful steps that
//! registered a compensation can be rolled back in reverse order with
//! [`Flow::compensate_all`]. Steps can be grouped into sub-flows whose failures
//! stay local unless explicitly escalated.
//!
//! Failures come in two kinds. Recoverable step failures are [`Failure`] values
//! carried in an [`Outcome`] and collected by [`Flow::get_result`]. Fatal
//! conditions (duplicate keys, missing inputs, panics) are [`FlowError`]s returned
//! directly from the call that hit them.

pub mod core;
pub mod error;
pub mod flow;
pub mod hooks;
pub mod policy;
pub mod validation;

// --- Re-exports for the Public API ---

// The orchestrator and per-call options
pub use crate::flow::{Flow, StepOptions};

// Input bindings
pub use crate::core::input::{current, input, Input, Inputs};

// Outcome model
pub use crate::core::outcome::{Failure, Outcome, Reason, ReasonKind};

// Context, cache and ledger
pub use crate::core::cache::OutputCache;
pub use crate::core::ledger::{Compensation, EntryKind, StepRecord, StepStatus};
pub use crate::core::slot::{Slot, SlotValue};
pub use crate::core::store::ContextStore;

// Extension points
pub use crate::hooks::EventHooks;
pub use crate::policy::{AnyValue, Attempt, ResiliencePolicy};
pub use crate::validation::{Validator, Violation};

pub use crate::error::{FlowError, FlowResult};

// Step functions receive this token; re-exported so callers need not depend on tokio-util.
pub use tokio_util::sync::CancellationToken;
