// sagaflow/src/core/mod.rs

pub mod cache;
pub mod input;
pub mod ledger;
pub mod outcome;
pub mod slot;
pub mod store;

// Re-export key types for easier access from the flow module and lib.rs
pub use cache::OutputCache;
pub use input::{current, input, Input, Inputs, Rejection, ResolveContext};
pub use ledger::{Compensation, EntryKind, StepRecord, StepStatus};
pub use outcome::{Failure, Outcome, Reason, ReasonKind};
pub use slot::{Slot, SlotValue};
pub use store::{ContextStore, CURRENT_SLOT};
