//! Resource quota admission engine.
//!
//! Admission checks for quota-governed kinds are grouped per namespace, drained
//! by a fixed pool of workers, checked against each namespace's quota records
//! and committed with optimistic concurrency.

pub mod accessor;
pub mod admission;
pub mod cache;
pub mod coordinator;
pub mod error;
pub mod evaluator;
pub mod evaluators;
pub mod metrics;
pub mod queue;
pub mod scope;

#[cfg(test)]
mod testing;

pub use accessor::{AccessorConfig, QuotaAccessor};
pub use admission::QuotaAdmission;
pub use coordinator::{Attributes, CoordinatorConfig, QuotaCoordinator};
pub use error::QuotaError;
pub use evaluator::{Evaluator, Registry};
