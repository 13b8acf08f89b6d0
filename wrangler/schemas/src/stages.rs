//! Stage types.
//!
//! A stage is one declarative operation in a pipeline. Its `type` decides which payload lives
//! under `data`; both are carried by [`StageKind`]. On the wire a stage is a flat object:
//!
//! ```json
//! {
//!   "id": "stage_6f1c...",
//!   "type": "FILTER",
//!   "description": "Large orders only",
//!   "createdAt": "2024-05-01T10:00:00Z",
//!   "data": { "table": "orders", "column": "amount", "operator": ">", "value": 500 }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::payloads::{
    CustomStage, FilterStage, GroupStage, JoinStage, LoadStage, SelectStage, SortStage, UnionStage,
};
use crate::serde_helpers::deserialize_from_literal;

/// The variant tag of a stage, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageType {
    Load,
    Join,
    Union,
    Filter,
    Group,
    Select,
    Sort,
    Aggregate,
    Custom,
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageType::Load => "LOAD",
            StageType::Join => "JOIN",
            StageType::Union => "UNION",
            StageType::Filter => "FILTER",
            StageType::Group => "GROUP",
            StageType::Select => "SELECT",
            StageType::Sort => "SORT",
            StageType::Aggregate => "AGGREGATE",
            StageType::Custom => "CUSTOM",
        };
        write!(f, "{name}")
    }
}

impl FromStr for StageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOAD" => Ok(StageType::Load),
            "JOIN" => Ok(StageType::Join),
            "UNION" => Ok(StageType::Union),
            "FILTER" => Ok(StageType::Filter),
            "GROUP" => Ok(StageType::Group),
            "SELECT" => Ok(StageType::Select),
            "SORT" => Ok(StageType::Sort),
            "AGGREGATE" => Ok(StageType::Aggregate),
            "CUSTOM" => Ok(StageType::Custom),
            _ => Err(format!("unknown stage type '{s}'")),
        }
    }
}

deserialize_from_literal!(StageType);

/// Stage variant together with its type-specific payload
///
/// Serialized as `{ "type": ..., "data": ... }`. A missing `data` object deserializes to an
/// empty payload so that incomplete stages survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStageKind", into = "RawStageKind")]
pub enum StageKind {
    Load(LoadStage),
    Join(JoinStage),
    Union(UnionStage),
    Filter(FilterStage),
    Group(GroupStage),
    Select(SelectStage),
    Sort(SortStage),
    Aggregate,
    Custom(CustomStage),
}

impl StageKind {
    /// Empty payload for the given stage type
    pub fn empty(stage_type: StageType) -> Self {
        match stage_type {
            StageType::Load => StageKind::Load(LoadStage::default()),
            StageType::Join => StageKind::Join(JoinStage::default()),
            StageType::Union => StageKind::Union(UnionStage::default()),
            StageType::Filter => StageKind::Filter(FilterStage::default()),
            StageType::Group => StageKind::Group(GroupStage::default()),
            StageType::Select => StageKind::Select(SelectStage::default()),
            StageType::Sort => StageKind::Sort(SortStage::default()),
            StageType::Aggregate => StageKind::Aggregate,
            StageType::Custom => StageKind::Custom(CustomStage::default()),
        }
    }

    pub fn stage_type(&self) -> StageType {
        match self {
            StageKind::Load(_) => StageType::Load,
            StageKind::Join(_) => StageType::Join,
            StageKind::Union(_) => StageType::Union,
            StageKind::Filter(_) => StageType::Filter,
            StageKind::Group(_) => StageType::Group,
            StageKind::Select(_) => StageType::Select,
            StageKind::Sort(_) => StageType::Sort,
            StageKind::Aggregate => StageType::Aggregate,
            StageKind::Custom(_) => StageType::Custom,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
struct RawStageKind {
    #[serde(rename = "type")]
    stage_type: StageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

fn payload<T>(data: Option<serde_json::Value>) -> Result<T, String>
where
    T: Default + serde::de::DeserializeOwned,
{
    match data {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| e.to_string()),
    }
}

impl TryFrom<RawStageKind> for StageKind {
    type Error = String;

    fn try_from(raw: RawStageKind) -> Result<Self, Self::Error> {
        let kind = match raw.stage_type {
            StageType::Load => StageKind::Load(payload(raw.data)?),
            StageType::Join => StageKind::Join(payload(raw.data)?),
            StageType::Union => StageKind::Union(payload(raw.data)?),
            StageType::Filter => StageKind::Filter(payload(raw.data)?),
            StageType::Group => StageKind::Group(payload(raw.data)?),
            StageType::Select => StageKind::Select(payload(raw.data)?),
            StageType::Sort => StageKind::Sort(payload(raw.data)?),
            StageType::Aggregate => StageKind::Aggregate,
            StageType::Custom => StageKind::Custom(payload(raw.data)?),
        };

        Ok(kind)
    }
}

impl From<StageKind> for RawStageKind {
    fn from(kind: StageKind) -> Self {
        let stage_type = kind.stage_type();
        let data = match kind {
            StageKind::Load(data) => serde_json::to_value(data).ok(),
            StageKind::Join(data) => serde_json::to_value(data).ok(),
            StageKind::Union(data) => serde_json::to_value(data).ok(),
            StageKind::Filter(data) => serde_json::to_value(data).ok(),
            StageKind::Group(data) => serde_json::to_value(data).ok(),
            StageKind::Select(data) => serde_json::to_value(data).ok(),
            StageKind::Sort(data) => serde_json::to_value(data).ok(),
            StageKind::Aggregate => None,
            StageKind::Custom(data) => serde_json::to_value(data).ok(),
        };

        RawStageKind { stage_type, data }
    }
}

/// A stage of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Unique id of the stage, stable across edits
    pub id: String,

    /// Free-form user description, never required
    #[serde(default)]
    pub description: String,

    /// Time the stage was first created
    #[serde(default = "Utc::now", alias = "timestamp")]
    pub created_at: DateTime<Utc>,

    /// Explicit name of the table this stage produces.
    /// When set, later stages can reference the result by this name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produces_table: Option<String>,

    #[serde(flatten)]
    #[cfg_attr(feature = "schema_gen", schemars(with = "RawStageKind"))]
    pub kind: StageKind,
}

impl Stage {
    /// Create a brand-new stage with a fresh id and the current time
    pub fn new(kind: StageKind, description: impl Into<String>) -> Self {
        Self {
            id: Self::generate_id(),
            description: description.into(),
            created_at: Utc::now(),
            produces_table: None,
            kind,
        }
    }

    /// Name the output table of this stage
    pub fn with_produces_table(mut self, table: impl Into<String>) -> Self {
        self.produces_table = Some(table.into());
        self
    }

    /// Generate a new unique stage id
    pub fn generate_id() -> String {
        format!("stage_{}", Uuid::new_v4().simple())
    }

    pub fn stage_type(&self) -> StageType {
        self.kind.stage_type()
    }
}

/// A stage without identity, as produced by SQL extraction or returned by the reasoning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub struct ParsedStage {
    #[serde(default)]
    pub description: String,

    #[serde(flatten)]
    #[cfg_attr(feature = "schema_gen", schemars(with = "RawStageKind"))]
    pub kind: StageKind,
}

impl ParsedStage {
    pub fn new(kind: StageKind, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            kind,
        }
    }

    pub fn stage_type(&self) -> StageType {
        self.kind.stage_type()
    }

    /// Turn into a pipeline stage with a freshly generated id and timestamp
    pub fn into_stage(self) -> Stage {
        Stage::new(self.kind, self.description)
    }
}

impl From<Stage> for ParsedStage {
    fn from(stage: Stage) -> Self {
        Self {
            description: stage.description,
            kind: stage.kind,
        }
    }
}
