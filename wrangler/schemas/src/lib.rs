//! # Wrangler Schemas
//!
//! Data definitions shared by every wrangler crate: the stage model, the pipeline container
//! and the messages exchanged with the reasoning service. This crate holds no behaviour
//! beyond (de)serialization; validation, prompt synthesis, dependency analysis and SQL
//! extraction live in `wrangler-core`.

use bon::Builder;
use serde::{Deserialize, Serialize};

mod serde_helpers;

pub mod payloads;
pub mod service;
pub mod stages;

// Re-export the main types for convenience
pub use payloads::{
    Aggregation, CustomStage, FilterCondition, FilterOperator, FilterStage, GroupStage, JoinStage,
    JoinType, LoadStage, Logic, OrderBy, SelectStage, SortDirection, SortStage, UnionStage,
    UnionType,
};
pub use payloads::{
    AggregationBuilder, CustomStageBuilder, FilterConditionBuilder, FilterStageBuilder,
    GroupStageBuilder, JoinStageBuilder, LoadStageBuilder, OrderByBuilder, SelectStageBuilder,
    SortStageBuilder, UnionStageBuilder,
};
pub use service::{ChartConfig, ColumnSchema, ErrorBody, TransformRequest, TransformResponse};
pub use stages::{ParsedStage, Stage, StageKind, StageType};

fn current_version() -> String {
    "v1".to_string()
}

/// An ordered list of stages.
///
/// Insertion order is significant: it is the only total order between stages that have no
/// table-name dependency on each other.
///
/// # Examples
///
/// ```
/// use wrangler_schemas::{LoadStage, Pipeline, Stage, StageKind};
///
/// let pipeline = Pipeline::builder()
///     .stages(vec![Stage::new(
///         StageKind::Load(LoadStage::builder().table_name("orders".to_string()).build()),
///         "Orders export",
///     )])
///     .build();
///
/// assert_eq!(pipeline.version, "v1");
/// assert_eq!(pipeline.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub struct Pipeline {
    /// Schema version for migration compatibility
    #[serde(default = "current_version")]
    #[builder(default = current_version())]
    pub version: String,

    /// Stages in pipeline order
    #[serde(default)]
    #[builder(default)]
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            version: current_version(),
            stages,
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stage> {
        self.stages.iter()
    }

    /// Look up a stage by id
    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.id == id)
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Self::new(stages)
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a Stage;
    type IntoIter = std::slice::Iter<'a, Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.iter()
    }
}
