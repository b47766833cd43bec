//! Batch collation for detection training on Burn.
//!
//! This crate provides:
//! - A closed per-sample record tree (`Value`) with runtime-ranked tensors
//! - `DataContainer`, a payload tagged with its batching policy
//! - Recursive collation with per-device grouping and pad-and-stack for images
//! - A format bundle that wraps sample fields from a policy table
//! - A shuffling batch loader and TOML/env configuration

pub mod bundle;
pub mod collate;
pub mod config;
pub mod container;
pub mod loader;
pub mod pad;
pub mod types;
pub mod value;

pub use bundle::FormatBundle;
pub use collate::{collate, collate_samples, default_collate};
pub use config::CollateConfig;
pub use container::DataContainer;
pub use data_contracts::{BatchMode, BatchPolicy, FieldPolicies};
pub use loader::{CollateLoader, SampleSource};
pub use pad::{pad_chw, stack_padded};
pub use types::*;
pub use value::{TensorValue, Value};

/// Default CPU backend for collation and tests.
pub type CollateBackend = burn_ndarray::NdArray<f32>;
