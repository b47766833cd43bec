//! Per-sample record tree and runtime-ranked tensors.

use burn::tensor::{backend::Backend, Bool, Int, Tensor, TensorData};
use indexmap::IndexMap;

use crate::container::DataContainer;
use crate::types::{CollateError, CollateResult};

/// A burn tensor whose rank and element kind are only known at runtime.
#[derive(Debug, Clone)]
pub enum TensorValue<B: Backend> {
    Float1(Tensor<B, 1>),
    Float2(Tensor<B, 2>),
    Float3(Tensor<B, 3>),
    Float4(Tensor<B, 4>),
    Float5(Tensor<B, 5>),
    Int1(Tensor<B, 1, Int>),
    Int2(Tensor<B, 2, Int>),
    Bool1(Tensor<B, 1, Bool>),
    Bool2(Tensor<B, 2, Bool>),
}

macro_rules! each_tensor {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            TensorValue::Float1($t) => $body,
            TensorValue::Float2($t) => $body,
            TensorValue::Float3($t) => $body,
            TensorValue::Float4($t) => $body,
            TensorValue::Float5($t) => $body,
            TensorValue::Int1($t) => $body,
            TensorValue::Int2($t) => $body,
            TensorValue::Bool1($t) => $body,
            TensorValue::Bool2($t) => $body,
        }
    };
}

macro_rules! rewrap_tensor {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            TensorValue::Float1($t) => TensorValue::Float1($body),
            TensorValue::Float2($t) => TensorValue::Float2($body),
            TensorValue::Float3($t) => TensorValue::Float3($body),
            TensorValue::Float4($t) => TensorValue::Float4($body),
            TensorValue::Float5($t) => TensorValue::Float5($body),
            TensorValue::Int1($t) => TensorValue::Int1($body),
            TensorValue::Int2($t) => TensorValue::Int2($body),
            TensorValue::Bool1($t) => TensorValue::Bool1($body),
            TensorValue::Bool2($t) => TensorValue::Bool2($body),
        }
    };
}

// Only called after every item has been checked against the first variant.
macro_rules! unwrap_all {
    ($items:expr, $variant:ident) => {
        $items
            .into_iter()
            .filter_map(|t| match t {
                TensorValue::$variant(t) => Some(t),
                _ => None,
            })
            .collect::<Vec<_>>()
    };
}

macro_rules! impl_from_tensor {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl<B: Backend> From<$ty> for TensorValue<B> {
                fn from(t: $ty) -> Self {
                    TensorValue::$variant(t)
                }
            }

            impl<B: Backend> From<$ty> for Value<B> {
                fn from(t: $ty) -> Self {
                    Value::Tensor(TensorValue::$variant(t))
                }
            }
        )*
    };
}

impl_from_tensor!(
    Float1 => Tensor<B, 1>,
    Float2 => Tensor<B, 2>,
    Float3 => Tensor<B, 3>,
    Float4 => Tensor<B, 4>,
    Float5 => Tensor<B, 5>,
    Int1 => Tensor<B, 1, Int>,
    Int2 => Tensor<B, 2, Int>,
    Bool1 => Tensor<B, 1, Bool>,
    Bool2 => Tensor<B, 2, Bool>,
);

impl<B: Backend> TensorValue<B> {
    /// Element kind: "float", "int" or "bool".
    pub fn kind(&self) -> &'static str {
        match self {
            TensorValue::Float1(_)
            | TensorValue::Float2(_)
            | TensorValue::Float3(_)
            | TensorValue::Float4(_)
            | TensorValue::Float5(_) => "float",
            TensorValue::Int1(_) | TensorValue::Int2(_) => "int",
            TensorValue::Bool1(_) | TensorValue::Bool2(_) => "bool",
        }
    }

    pub fn rank(&self) -> usize {
        each_tensor!(self, t => t.dims().len())
    }

    pub fn dims(&self) -> Vec<usize> {
        each_tensor!(self, t => t.dims().to_vec())
    }

    pub fn device(&self) -> B::Device {
        each_tensor!(self, t => t.device())
    }

    pub fn to_device(self, device: &B::Device) -> Self {
        rewrap_tensor!(self, t => t.to_device(device))
    }

    pub fn into_data(self) -> TensorData {
        each_tensor!(self, t => t.into_data())
    }

    pub fn into_f32_vec(self) -> CollateResult<Vec<f32>> {
        self.into_data()
            .to_vec::<f32>()
            .map_err(|e| CollateError::TensorData(format!("{e:?}")))
    }

    pub fn into_i64_vec(self) -> CollateResult<Vec<i64>> {
        self.into_data()
            .to_vec::<i64>()
            .map_err(|e| CollateError::TensorData(format!("{e:?}")))
    }

    /// Stacks same-kind, same-shape tensors along a new leading axis.
    pub fn stack(items: Vec<Self>) -> CollateResult<Self> {
        let Some(first) = items.first() else {
            return Err(CollateError::EmptyBatch);
        };
        let kind = first.kind();
        let expected = first.dims();
        for (index, item) in items.iter().enumerate().skip(1) {
            if item.kind() != kind {
                return Err(CollateError::KindMismatch {
                    index,
                    expected: kind,
                    actual: item.kind(),
                });
            }
            let actual = item.dims();
            if actual != expected {
                return Err(CollateError::ShapeMismatch {
                    index,
                    expected,
                    actual,
                });
            }
        }

        let rank = expected.len();
        let stacked = match (kind, rank) {
            ("float", 1) => TensorValue::Float2(Tensor::stack(unwrap_all!(items, Float1), 0)),
            ("float", 2) => TensorValue::Float3(Tensor::stack(unwrap_all!(items, Float2), 0)),
            ("float", 3) => TensorValue::Float4(Tensor::stack(unwrap_all!(items, Float3), 0)),
            ("float", 4) => TensorValue::Float5(Tensor::stack(unwrap_all!(items, Float4), 0)),
            ("int", 1) => TensorValue::Int2(Tensor::stack(unwrap_all!(items, Int1), 0)),
            ("bool", 1) => TensorValue::Bool2(Tensor::stack(unwrap_all!(items, Bool1), 0)),
            _ => return Err(CollateError::RankOverflow { kind, rank }),
        };
        Ok(stacked)
    }
}

/// One node of a per-sample (or batched) record.
#[derive(Debug, Clone)]
pub enum Value<B: Backend> {
    Tensor(TensorValue<B>),
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
    Seq(Vec<Value<B>>),
    Map(IndexMap<String, Value<B>>),
    Container(DataContainer<B>),
}

impl<B: Backend> Value<B> {
    pub fn seq(items: impl IntoIterator<Item = Value<B>>) -> Self {
        Value::Seq(items.into_iter().collect())
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value<B>)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Tensor(_) => "tensor",
            Value::Float(_) => "float",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
            Value::Container(_) => "data container",
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value<B>> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorValue<B>> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value<B>]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value<B>>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&DataContainer<B>> {
        match self {
            Value::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_tensor(self) -> Option<TensorValue<B>> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_seq(self) -> Option<Vec<Value<B>>> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_container(self) -> Option<DataContainer<B>> {
        match self {
            Value::Container(c) => Some(c),
            _ => None,
        }
    }

    /// Moves every tensor to `device`, leaving host-only container payloads in place.
    pub fn to_device(self, device: &B::Device) -> Self {
        match self {
            Value::Tensor(t) => Value::Tensor(t.to_device(device)),
            Value::Seq(items) => {
                Value::Seq(items.into_iter().map(|v| v.to_device(device)).collect())
            }
            Value::Map(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, v.to_device(device)))
                    .collect(),
            ),
            Value::Container(c) => Value::Container(c.to_device(device)),
            scalar => scalar,
        }
    }
}

impl<B: Backend> From<TensorValue<B>> for Value<B> {
    fn from(t: TensorValue<B>) -> Self {
        Value::Tensor(t)
    }
}

impl<B: Backend> From<DataContainer<B>> for Value<B> {
    fn from(c: DataContainer<B>) -> Self {
        Value::Container(c)
    }
}

impl<B: Backend> From<f64> for Value<B> {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl<B: Backend> From<i64> for Value<B> {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl<B: Backend> From<bool> for Value<B> {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<B: Backend> From<String> for Value<B> {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<B: Backend> From<&str> for Value<B> {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl<B: Backend> From<Vec<Value<B>>> for Value<B> {
    fn from(items: Vec<Value<B>>) -> Self {
        Value::Seq(items)
    }
}
