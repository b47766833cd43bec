//! Recursive collation of per-sample records into one batched record.

use burn::tensor::{backend::Backend, Bool, Int, Tensor, TensorData};
use data_contracts::BatchMode;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::container::DataContainer;
use crate::pad::stack_padded;
use crate::types::{CollateError, CollateResult};
use crate::value::{TensorValue, Value};

/// Collates a batch (a `Value::Seq` of samples) into one record of the same shape.
///
/// Data containers are grouped into `samples_per_gpu`-sized sub-batches,
/// sequences are transposed and mappings merged per key; any other leaf goes
/// through [`default_collate`].
pub fn collate<B: Backend>(batch: Value<B>, samples_per_gpu: usize) -> CollateResult<Value<B>> {
    match batch {
        Value::Seq(samples) => collate_samples(samples, samples_per_gpu),
        other => Err(CollateError::UnsupportedBatch { kind: other.kind() }),
    }
}

/// [`collate`] over an already unwrapped list of samples.
pub fn collate_samples<B: Backend>(
    samples: Vec<Value<B>>,
    samples_per_gpu: usize,
) -> CollateResult<Value<B>> {
    if samples_per_gpu == 0 {
        return Err(CollateError::ZeroGroupSize);
    }
    let Some(first) = samples.first() else {
        return Err(CollateError::EmptyBatch);
    };
    match first {
        Value::Container(_) => collate_containers(samples, samples_per_gpu).map(Value::Container),
        Value::Seq(_) => {
            let columns = transpose_sequences(samples)?;
            let merged = columns
                .into_iter()
                .map(|column| collate_samples(column, samples_per_gpu))
                .collect::<CollateResult<Vec<_>>>()?;
            Ok(Value::Seq(merged))
        }
        Value::Map(_) => {
            let columns = transpose_mappings(samples)?;
            let merged = columns
                .into_iter()
                .map(|(key, column)| collate_samples(column, samples_per_gpu).map(|v| (key, v)))
                .collect::<CollateResult<IndexMap<_, _>>>()?;
            Ok(Value::Map(merged))
        }
        _ => default_collate(samples),
    }
}

fn collate_containers<B: Backend>(
    samples: Vec<Value<B>>,
    samples_per_gpu: usize,
) -> CollateResult<DataContainer<B>> {
    let len = samples.len();
    if len % samples_per_gpu != 0 {
        return Err(CollateError::IndivisibleGroups {
            len,
            samples_per_gpu,
        });
    }
    let containers = expect_all(samples, "data container", |v| match v {
        Value::Container(c) => Ok(c),
        other => Err(other),
    })
    .map_err(|e| match e {
        CollateError::KindMismatch { index, actual, .. } => CollateError::NotAContainer {
            index,
            kind: actual,
        },
        e => e,
    })?;

    // Flags come from the first sample.
    let policy = containers[0].policy();
    let mode = policy.mode();
    if let Some(index) = containers.iter().position(|c| c.mode() != mode) {
        warn!(
            index,
            expected = mode.as_str(),
            actual = containers[index].mode().as_str(),
            "data container flags differ within batch; using the first sample's"
        );
    }

    let groups = match mode {
        BatchMode::HostOnly | BatchMode::List => group_payloads(containers, samples_per_gpu),
        BatchMode::Stack => stack_groups(containers, samples_per_gpu)?,
    };
    debug!(
        mode = mode.as_str(),
        samples = len,
        groups = groups.len(),
        "collated data container"
    );
    Ok(DataContainer::new(Value::Seq(groups), policy))
}

fn group_payloads<B: Backend>(
    containers: Vec<DataContainer<B>>,
    samples_per_gpu: usize,
) -> Vec<Value<B>> {
    let mut groups = Vec::with_capacity(containers.len() / samples_per_gpu);
    let mut payloads = containers.into_iter().map(DataContainer::into_data);
    loop {
        let group: Vec<_> = payloads.by_ref().take(samples_per_gpu).collect();
        if group.is_empty() {
            break;
        }
        groups.push(Value::Seq(group));
    }
    groups
}

fn stack_groups<B: Backend>(
    containers: Vec<DataContainer<B>>,
    samples_per_gpu: usize,
) -> CollateResult<Vec<Value<B>>> {
    let group_count = containers.len() / samples_per_gpu;
    let mut groups = Vec::with_capacity(group_count);
    let mut samples = containers.into_iter().enumerate();
    // Channels are fixed by the first sample of the whole batch.
    let mut channels = None;
    for group in 0..group_count {
        let mut items = Vec::with_capacity(samples_per_gpu);
        for (index, container) in samples.by_ref().take(samples_per_gpu) {
            let padding_value = container.padding_value();
            match container.into_data() {
                Value::Tensor(TensorValue::Float3(t)) => {
                    let [c, _, _] = t.dims();
                    channels = channels.or(Some(c));
                    items.push((t, padding_value));
                }
                Value::Tensor(t) => {
                    return Err(CollateError::RankMismatch {
                        index,
                        expected: 3,
                        actual: t.rank(),
                    })
                }
                other => {
                    return Err(CollateError::NotATensor {
                        index,
                        kind: other.kind(),
                    })
                }
            }
        }
        let Some(expected) = channels else {
            return Err(CollateError::EmptyBatch);
        };
        let stacked = stack_padded(items, expected, group * samples_per_gpu)?;
        groups.push(Value::Tensor(TensorValue::Float4(stacked)));
    }
    Ok(groups)
}

/// Generic merge for values without a batching policy.
///
/// Tensors of one shape are stacked on a new leading axis, scalars become a
/// rank-1 tensor, strings stay a list, and sequences and mappings recurse.
pub fn default_collate<B: Backend>(samples: Vec<Value<B>>) -> CollateResult<Value<B>> {
    let Some(first) = samples.first() else {
        return Err(CollateError::EmptyBatch);
    };
    let device = &B::Device::default();
    let len = samples.len();
    match first {
        Value::Tensor(_) => {
            let tensors = expect_all(samples, "tensor", |v| match v {
                Value::Tensor(t) => Ok(t),
                other => Err(other),
            })?;
            TensorValue::stack(tensors).map(Value::Tensor)
        }
        Value::Float(_) => {
            // Ints after a leading float are widened.
            let values = expect_all(samples, "float", |v| match v {
                Value::Float(x) => Ok(x as f32),
                Value::Int(x) => Ok(x as f32),
                other => Err(other),
            })?;
            let t = Tensor::<B, 1>::from_data(TensorData::new(values, [len]), device);
            Ok(t.into())
        }
        Value::Int(_) => {
            let values = expect_all(samples, "int", |v| match v {
                Value::Int(x) => Ok(x),
                other => Err(other),
            })?;
            let t = Tensor::<B, 1, Int>::from_data(TensorData::new(values, [len]), device);
            Ok(t.into())
        }
        Value::Bool(_) => {
            let values = expect_all(samples, "bool", |v| match v {
                Value::Bool(x) => Ok(x),
                other => Err(other),
            })?;
            let t = Tensor::<B, 1, Bool>::from_data(TensorData::new(values, [len]), device);
            Ok(t.into())
        }
        Value::Str(_) => {
            let values = expect_all(samples, "string", |v| match v {
                s @ Value::Str(_) => Ok(s),
                other => Err(other),
            })?;
            Ok(Value::Seq(values))
        }
        Value::Seq(_) => {
            let merged = transpose_sequences(samples)?
                .into_iter()
                .map(default_collate)
                .collect::<CollateResult<Vec<_>>>()?;
            Ok(Value::Seq(merged))
        }
        Value::Map(_) => {
            let merged = transpose_mappings(samples)?
                .into_iter()
                .map(|(key, column)| default_collate(column).map(|v| (key, v)))
                .collect::<CollateResult<IndexMap<_, _>>>()?;
            Ok(Value::Map(merged))
        }
        Value::Container(_) => Err(CollateError::UnsupportedLeaf {
            kind: "data container",
        }),
    }
}

fn expect_all<B: Backend, T>(
    samples: Vec<Value<B>>,
    expected: &'static str,
    extract: impl Fn(Value<B>) -> Result<T, Value<B>>,
) -> CollateResult<Vec<T>> {
    samples
        .into_iter()
        .enumerate()
        .map(|(index, v)| {
            extract(v).map_err(|other| CollateError::KindMismatch {
                index,
                expected,
                actual: other.kind(),
            })
        })
        .collect()
}

/// Sample-major sequences to field-major columns. All samples must have the
/// first sample's length.
fn transpose_sequences<B: Backend>(samples: Vec<Value<B>>) -> CollateResult<Vec<Vec<Value<B>>>> {
    let batch = samples.len();
    let rows = expect_all(samples, "sequence", |v| match v {
        Value::Seq(fields) => Ok(fields),
        other => Err(other),
    })?;
    let mut rows = rows.into_iter().enumerate();
    let Some((_, first)) = rows.next() else {
        return Err(CollateError::EmptyBatch);
    };
    let width = first.len();
    let mut columns: Vec<Vec<Value<B>>> = first
        .into_iter()
        .map(|field| {
            let mut column = Vec::with_capacity(batch);
            column.push(field);
            column
        })
        .collect();
    for (index, fields) in rows {
        if fields.len() != width {
            return Err(CollateError::RaggedSequence {
                index,
                expected: width,
                actual: fields.len(),
            });
        }
        for (column, field) in columns.iter_mut().zip(fields) {
            column.push(field);
        }
    }
    Ok(columns)
}

/// Per-key columns in the first sample's key order. Keys only present in later
/// samples are ignored.
fn transpose_mappings<B: Backend>(
    samples: Vec<Value<B>>,
) -> CollateResult<IndexMap<String, Vec<Value<B>>>> {
    let batch = samples.len();
    let maps = expect_all(samples, "mapping", |v| match v {
        Value::Map(map) => Ok(map),
        other => Err(other),
    })?;
    let mut maps = maps.into_iter().enumerate();
    let Some((_, first)) = maps.next() else {
        return Err(CollateError::EmptyBatch);
    };
    let mut columns: IndexMap<String, Vec<Value<B>>> = first
        .into_iter()
        .map(|(key, value)| {
            let mut column = Vec::with_capacity(batch);
            column.push(value);
            (key, column)
        })
        .collect();
    for (index, mut map) in maps {
        for (key, column) in columns.iter_mut() {
            let value = map.swap_remove(key).ok_or_else(|| CollateError::MissingKey {
                index,
                key: key.clone(),
            })?;
            column.push(value);
        }
    }
    Ok(columns)
}
