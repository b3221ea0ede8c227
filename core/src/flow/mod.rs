// sagaflow/src/flow/mod.rs

pub mod compensation;
pub mod definition;
pub mod execution;
pub mod group;
pub mod steps;
pub mod transform;
pub(crate) mod tracking;

pub use definition::Flow;
pub use steps::StepOptions;
