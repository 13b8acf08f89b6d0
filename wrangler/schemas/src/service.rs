//! Messages exchanged with the external reasoning service.

use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::serde_helpers::deserialize_lenient_stages;
use crate::stages::ParsedStage;

/// One column of the current table schema, as described by the analytic engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub struct ColumnSchema {
    #[serde(alias = "name")]
    pub column_name: String,

    #[serde(default)]
    #[builder(default)]
    pub column_type: String,

    /// Any further describe columns (nullability, keys, defaults, ...) passed through untouched
    #[serde(flatten)]
    #[builder(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Body of a transformation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    pub schema: Vec<ColumnSchema>,
    pub user_prompt: String,
    pub api_key: String,
}

/// Chart the reasoning service suggests for the query result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub chart_type: String,
    pub x_axis: String,
    pub y_axis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_axis: Option<String>,
}

/// Successful response of a transformation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    pub sql: String,

    #[serde(default)]
    pub chart_type: String,

    #[serde(default)]
    pub x_axis: String,

    #[serde(default)]
    pub y_axis: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_axis: Option<String>,

    #[serde(default)]
    pub explanation: String,

    /// Structured stages, when the service chose to provide them and all of them decode
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_stages",
        skip_serializing_if = "Option::is_none"
    )]
    #[cfg_attr(feature = "schema_gen", schemars(with = "Option<Vec<ParsedStage>>"))]
    pub transformation_stages: Option<Vec<ParsedStage>>,
}

impl TransformResponse {
    pub fn chart(&self) -> ChartConfig {
        ChartConfig {
            chart_type: self.chart_type.clone(),
            x_axis: self.x_axis.clone(),
            y_axis: self.y_axis.clone(),
            z_axis: self.z_axis.clone(),
        }
    }
}

/// Error body returned by the service on non-2xx responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
