// ABOUTME: Tool type definitions
// ABOUTME: Named capabilities with parameter values and per-parameter metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type ParameterMap = BTreeMap<String, Value>;

/// Describes one tool parameter; unknown keys are kept verbatim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterMetadata {
    #[serde(default)]
    pub mandatory: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters: ParameterMap,
    pub parameters_metadata: BTreeMap<String, ParameterMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    /// Mandatory parameters that have no usable value
    pub fn missing_mandatory_parameters(&self) -> Vec<&str> {
        self.parameters_metadata
            .iter()
            .filter(|(_, meta)| meta.mandatory)
            .filter(|(name, _)| match self.parameters.get(*name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCreateInput {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<ParameterMap>,
    pub parameters_metadata: Option<BTreeMap<String, ParameterMetadata>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolUpdateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parameters: Option<ParameterMap>,
    pub parameters_metadata: Option<BTreeMap<String, ParameterMetadata>>,
}
