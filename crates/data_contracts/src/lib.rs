//! Shared data contracts for per-field batching policies.

pub mod policy;

pub use policy::{BatchMode, BatchPolicy, FieldPolicies, ValidationError};
