use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Batching policy attached to one sample field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchPolicy {
    /// Keep the payload on the host; it is never moved to a device.
    pub cpu_only: bool,
    /// Pad and stack same-rank payloads into one tensor per group.
    pub stack: bool,
    /// Fill value for the padded region when stacking.
    pub padding_value: f64,
}

/// How a collator merges the values of one field, after flag precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Grouped into per-device lists and kept on the host.
    HostOnly,
    /// Padded to the group's max height/width and stacked.
    Stack,
    /// Grouped into per-device lists.
    List,
}

impl BatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchMode::HostOnly => "host_only",
            BatchMode::Stack => "stack",
            BatchMode::List => "list",
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("padding value must be finite, got {0}")]
    NonFinitePadding(f64),
    #[error("field {field}: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<ValidationError>,
    },
    #[error("field name must not be empty")]
    EmptyFieldName,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            cpu_only: false,
            stack: false,
            padding_value: 0.0,
        }
    }
}

impl BatchPolicy {
    pub fn new(stack: bool, padding_value: f64, cpu_only: bool) -> Self {
        Self {
            cpu_only,
            stack,
            padding_value,
        }
    }

    /// Pad-and-stack policy, e.g. images.
    pub fn stacked(padding_value: f64) -> Self {
        Self::new(true, padding_value, false)
    }

    /// Per-device lists kept on the host, e.g. image metadata.
    pub fn host_only() -> Self {
        Self::new(false, 0.0, true)
    }

    /// Per-device lists, e.g. ground-truth boxes with varying counts.
    pub fn listed() -> Self {
        Self::default()
    }

    /// Host-only wins over stack.
    pub fn mode(&self) -> BatchMode {
        if self.cpu_only {
            BatchMode::HostOnly
        } else if self.stack {
            BatchMode::Stack
        } else {
            BatchMode::List
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.padding_value.is_finite() {
            return Err(ValidationError::NonFinitePadding(self.padding_value));
        }
        Ok(())
    }
}

/// Field name to batching policy table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPolicies {
    fields: BTreeMap<String, BatchPolicy>,
}

impl FieldPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Usual layout of a detection sample: stacked image, per-device box and
    /// label lists, host-only metadata.
    pub fn detection_defaults() -> Self {
        Self::new()
            .with("img", BatchPolicy::stacked(0.0))
            .with("gt_bboxes", BatchPolicy::listed())
            .with("gt_labels", BatchPolicy::listed())
            .with("gt_masks", BatchPolicy::listed())
            .with("img_meta", BatchPolicy::host_only())
    }

    pub fn with(mut self, field: impl Into<String>, policy: BatchPolicy) -> Self {
        self.insert(field, policy);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, policy: BatchPolicy) -> Option<BatchPolicy> {
        self.fields.insert(field.into(), policy)
    }

    pub fn get(&self, field: &str) -> Option<&BatchPolicy> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BatchPolicy)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, policy) in &self.fields {
            if field.trim().is_empty() {
                return Err(ValidationError::EmptyFieldName);
            }
            policy.validate().map_err(|e| ValidationError::Field {
                field: field.clone(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_only_takes_precedence_over_stack() {
        let policy = BatchPolicy::new(true, 0.0, true);
        assert_eq!(policy.mode(), BatchMode::HostOnly);
        assert_eq!(BatchPolicy::stacked(1.0).mode(), BatchMode::Stack);
        assert_eq!(BatchPolicy::listed().mode(), BatchMode::List);
    }

    #[test]
    fn missing_keys_use_defaults() {
        let policy: BatchPolicy = toml::from_str("stack = true").unwrap();
        assert!(policy.stack);
        assert!(!policy.cpu_only);
        assert_eq!(policy.padding_value, 0.0);
    }
}
