//! Tagged payload carrying its own batching policy.

use burn::tensor::backend::Backend;
use data_contracts::{BatchMode, BatchPolicy};

use crate::value::{TensorValue, Value};

/// A sample field wrapped with the flags that tell the collator how to merge it.
///
/// Before collation the payload is one sample's value. After collation it is a
/// `Value::Seq` with one entry per device group: a stacked rank-4 tensor for
/// stackable fields, a `Value::Seq` of the group's payloads otherwise.
#[derive(Debug, Clone)]
pub struct DataContainer<B: Backend> {
    data: Box<Value<B>>,
    policy: BatchPolicy,
}

impl<B: Backend> DataContainer<B> {
    pub fn new(data: impl Into<Value<B>>, policy: BatchPolicy) -> Self {
        Self {
            data: Box::new(data.into()),
            policy,
        }
    }

    /// Image-like payload padded with `padding_value` and stacked per group.
    pub fn stacked(data: impl Into<Value<B>>, padding_value: f64) -> Self {
        Self::new(data, BatchPolicy::stacked(padding_value))
    }

    /// Payload kept on the host and grouped into lists, e.g. image metadata.
    pub fn host_only(data: impl Into<Value<B>>) -> Self {
        Self::new(data, BatchPolicy::host_only())
    }

    /// Payload grouped into lists, e.g. variable-length box tensors.
    pub fn listed(data: impl Into<Value<B>>) -> Self {
        Self::new(data, BatchPolicy::listed())
    }

    pub fn data(&self) -> &Value<B> {
        &self.data
    }

    pub fn into_data(self) -> Value<B> {
        *self.data
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    pub fn mode(&self) -> BatchMode {
        self.policy.mode()
    }

    pub fn cpu_only(&self) -> bool {
        self.policy.cpu_only
    }

    pub fn stack(&self) -> bool {
        self.policy.stack
    }

    pub fn padding_value(&self) -> f64 {
        self.policy.padding_value
    }

    /// Tensor payload, if any.
    pub fn tensor(&self) -> Option<&TensorValue<B>> {
        self.data.as_tensor()
    }

    /// Shape of a tensor payload.
    pub fn dims(&self) -> Option<Vec<usize>> {
        self.tensor().map(TensorValue::dims)
    }

    /// Per-group entries of a collated container.
    pub fn groups(&self) -> Option<&[Value<B>]> {
        self.data.as_seq()
    }

    /// Host-only payloads are left where they are.
    pub fn to_device(self, device: &B::Device) -> Self {
        if self.policy.cpu_only {
            return self;
        }
        Self {
            data: Box::new((*self.data).to_device(device)),
            policy: self.policy,
        }
    }
}
