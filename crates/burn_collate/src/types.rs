//! Error definitions and small shared types for burn_collate.

use std::path::PathBuf;
use thiserror::Error;

pub type CollateResult<T> = Result<T, CollateError>;

#[derive(Debug, Error)]
pub enum CollateError {
    #[error("batch must be a sequence of samples, got {kind}")]
    UnsupportedBatch { kind: &'static str },
    #[error("cannot collate empty batch")]
    EmptyBatch,
    #[error("samples_per_gpu must be at least 1")]
    ZeroGroupSize,
    #[error("batch of {len} samples is not divisible into groups of {samples_per_gpu}")]
    IndivisibleGroups { len: usize, samples_per_gpu: usize },
    #[error("sample {index} is a {kind} where a data container was expected")]
    NotAContainer { index: usize, kind: &'static str },
    #[error("sample {index} holds a {kind} payload; stacking requires a tensor")]
    NotATensor { index: usize, kind: &'static str },
    #[error("sample {index} has rank {actual}; stacking requires rank {expected}")]
    RankMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("sample {index} has {actual} channels, group expects {expected}")]
    ChannelMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("sample {index} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("stacking a rank-{rank} {kind} tensor exceeds the supported rank")]
    RankOverflow { kind: &'static str, rank: usize },
    #[error("sample {index} is a {actual}, batch started with {expected}")]
    KindMismatch {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("sample {index} has {actual} fields, expected {expected}")]
    RaggedSequence {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("sample {index} is missing key {key:?}")]
    MissingKey { index: usize, key: String },
    #[error("{kind} values cannot be merged by default collation")]
    UnsupportedLeaf { kind: &'static str },
    #[error("sample index {index} out of range for source of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("tensor data readback failed: {0}")]
    TensorData(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("toml parse error at {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Config(String),
    #[error(transparent)]
    Policy(#[from] data_contracts::ValidationError),
}
