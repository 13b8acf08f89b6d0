//! Type-specific stage payloads.
//!
//! Every field is optional at the type level. Whether a payload is complete enough to be
//! described or compiled is decided by the stage validator in `wrangler-core`, never by
//! deserialization.

use bon::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::serde_helpers::deserialize_from_literal;

/// Kind of join performed by a JOIN stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub enum JoinType {
    #[default]
    #[serde(rename = "INNER")]
    Inner,
    #[serde(rename = "LEFT")]
    Left,
    #[serde(rename = "RIGHT")]
    Right,
    #[serde(rename = "FULL OUTER")]
    FullOuter,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Right => write!(f, "RIGHT"),
            JoinType::FullOuter => write!(f, "FULL OUTER"),
        }
    }
}

impl FromStr for JoinType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");

        match normalized.to_ascii_uppercase().as_str() {
            "INNER" => Ok(JoinType::Inner),
            "LEFT" | "LEFT OUTER" => Ok(JoinType::Left),
            "RIGHT" | "RIGHT OUTER" => Ok(JoinType::Right),
            "FULL" | "FULL OUTER" => Ok(JoinType::FullOuter),
            _ => Err(format!("unknown join type '{s}'")),
        }
    }
}

/// Whether a UNION stage keeps duplicate rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub enum UnionType {
    #[default]
    #[serde(rename = "UNION")]
    Union,
    #[serde(rename = "UNION ALL")]
    UnionAll,
}

impl fmt::Display for UnionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnionType::Union => write!(f, "UNION"),
            UnionType::UnionAll => write!(f, "UNION ALL"),
        }
    }
}

impl FromStr for UnionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");

        match normalized.to_ascii_uppercase().as_str() {
            "UNION" => Ok(UnionType::Union),
            "UNION ALL" => Ok(UnionType::UnionAll),
            _ => Err(format!("unknown union type '{s}'")),
        }
    }
}

/// Comparison operator of a FILTER stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let literal = match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::GtEq => ">=",
            FilterOperator::LtEq => "<=",
            FilterOperator::Like => "LIKE",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT IN",
        };
        write!(f, "{literal}")
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");

        match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(FilterOperator::Eq),
            "!=" | "<>" => Ok(FilterOperator::NotEq),
            ">" => Ok(FilterOperator::Gt),
            "<" => Ok(FilterOperator::Lt),
            ">=" => Ok(FilterOperator::GtEq),
            "<=" => Ok(FilterOperator::LtEq),
            "LIKE" => Ok(FilterOperator::Like),
            "IN" => Ok(FilterOperator::In),
            "NOT IN" => Ok(FilterOperator::NotIn),
            _ => Err(format!("unknown filter operator '{s}'")),
        }
    }
}

/// How a filter condition combines with the previous one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    And,
    Or,
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logic::And => write!(f, "AND"),
            Logic::Or => write!(f, "OR"),
        }
    }
}

impl FromStr for Logic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Logic::And),
            "OR" => Ok(Logic::Or),
            _ => Err(format!("unknown filter logic '{s}'")),
        }
    }
}

/// Sort direction of a single ORDER BY key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(format!("unknown sort direction '{s}'")),
        }
    }
}

deserialize_from_literal!(JoinType, UnionType, FilterOperator, Logic, SortDirection);

/// Payload of a LOAD stage: a table registered from an uploaded file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct LoadStage {
    /// Name the loaded table is registered under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    /// Name of the file the table was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Payload of a JOIN stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct JoinStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_type: Option<JoinType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_key: Option<String>,

    /// Free-form extra join condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Payload of a UNION stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct UnionStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union_type: Option<UnionType>,

    /// Tables combined by the union, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub tables: Vec<String>,
}

/// An additional condition of a multi-condition FILTER stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    pub column: String,
    pub operator: FilterOperator,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<Logic>,
}

/// Payload of a FILTER stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct FilterStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<FilterOperator>,

    /// Comparison value. Strings, numbers, booleans and lists are all accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub conditions: Vec<FilterCondition>,
}

/// A single aggregate call of a GROUP stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub struct Aggregation {
    /// Aggregate function name, e.g. `SUM`
    pub function: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Payload of a GROUP stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct GroupStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub group_by: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub aggregations: Vec<Aggregation>,
}

/// Payload of a SELECT stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SelectStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub columns: Vec<String>,
}

/// A single ORDER BY key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    #[builder(default)]
    pub direction: SortDirection,
}

/// Payload of a SORT stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SortStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub order_by: Vec<OrderBy>,
}

/// Payload of a CUSTOM stage: raw SQL handed through untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub struct CustomStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}
