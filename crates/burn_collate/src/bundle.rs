//! Wraps raw sample fields in data containers according to a policy table.

use burn::tensor::backend::Backend;
use data_contracts::{BatchMode, FieldPolicies};
use indexmap::IndexMap;

use crate::container::DataContainer;
use crate::types::{CollateError, CollateResult};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct FormatBundle {
    policies: FieldPolicies,
}

impl Default for FormatBundle {
    fn default() -> Self {
        Self::new(FieldPolicies::detection_defaults())
    }
}

impl FormatBundle {
    pub fn new(policies: FieldPolicies) -> Self {
        Self { policies }
    }

    pub fn policies(&self) -> &FieldPolicies {
        &self.policies
    }

    /// Wraps every field with a policy; fields without one, and fields that
    /// are already containers, pass through unchanged.
    pub fn apply<B: Backend>(&self, sample: Value<B>) -> CollateResult<Value<B>> {
        let fields = match sample {
            Value::Map(fields) => fields,
            other => {
                return Err(CollateError::KindMismatch {
                    index: 0,
                    expected: "mapping",
                    actual: other.kind(),
                })
            }
        };
        let wrapped = fields
            .into_iter()
            .map(|(key, value)| {
                let Some(policy) = self.policies.get(&key) else {
                    return Ok((key, value));
                };
                if matches!(value, Value::Container(_)) {
                    return Ok((key, value));
                }
                if policy.mode() == BatchMode::Stack && !matches!(value, Value::Tensor(_)) {
                    return Err(CollateError::NotATensor {
                        index: 0,
                        kind: value.kind(),
                    });
                }
                let container = DataContainer::new(value, *policy);
                Ok((key, Value::Container(container)))
            })
            .collect::<CollateResult<IndexMap<_, _>>>()?;
        Ok(Value::Map(wrapped))
    }
}
