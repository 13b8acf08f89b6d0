//! Common test utilities for wrangler core testing.
//!
//! Sample pipelines, pipeline definition files and a scripted reasoning service.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use wrangler_core::reasoning::{ReasoningError, ReasoningService};
use wrangler_schemas::*;

/// Orders joined with customers, filtered, grouped and sorted
pub fn sample_stages() -> Vec<Stage> {
    vec![
        Stage::new(
            StageKind::Load(
                LoadStage::builder()
                    .table_name("orders".to_string())
                    .file_name("orders.csv".to_string())
                    .build(),
            ),
            "Orders export",
        ),
        Stage::new(
            StageKind::Load(
                LoadStage::builder()
                    .table_name("customers".to_string())
                    .build(),
            ),
            "Customer master data",
        ),
        Stage::new(
            StageKind::Join(
                JoinStage::builder()
                    .join_type(JoinType::Left)
                    .left_table("orders".to_string())
                    .right_table("customers".to_string())
                    .left_key("cust_id".to_string())
                    .right_key("id".to_string())
                    .build(),
            ),
            "",
        ),
        Stage::new(
            StageKind::Filter(
                FilterStage::builder()
                    .table("joined_orders_customers".to_string())
                    .column("amount".to_string())
                    .operator(FilterOperator::Gt)
                    .value(serde_json::json!(500))
                    .build(),
            ),
            "",
        ),
        Stage::new(
            StageKind::Group(
                GroupStage::builder()
                    .group_by(vec!["region".to_string()])
                    .aggregations(vec![Aggregation::builder()
                        .function("SUM".to_string())
                        .column("amount".to_string())
                        .alias("total".to_string())
                        .build()])
                    .build(),
            ),
            "",
        ),
        Stage::new(
            StageKind::Sort(
                SortStage::builder()
                    .order_by(vec![OrderBy::builder()
                        .column("total".to_string())
                        .direction(SortDirection::Desc)
                        .build()])
                    .build(),
            ),
            "",
        ),
    ]
}

pub fn sample_schema() -> Vec<ColumnSchema> {
    ["region", "amount", "cust_id", "total"]
        .into_iter()
        .map(|name| {
            ColumnSchema::builder()
                .column_name(name.to_string())
                .column_type("VARCHAR".to_string())
                .build()
        })
        .collect()
}

/// Writes pipeline definitions into a temporary directory
pub struct DefinitionDir {
    dir: TempDir,
}

impl DefinitionDir {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Answers requests from a queue of canned results, optionally after a delay
pub struct ScriptedService {
    responses: Mutex<VecDeque<Result<TransformResponse, ReasoningError>>>,
    requests: Mutex<Vec<TransformRequest>>,
    delay: Duration,
}

impl ScriptedService {
    pub fn new(responses: Vec<Result<TransformResponse, ReasoningError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(vec![]),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<TransformRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for ScriptedService {
    async fn transform(
        &self,
        request: &TransformRequest,
    ) -> Result<TransformResponse, ReasoningError> {
        self.requests.lock().unwrap().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ReasoningError::Service {
                    status: 500,
                    message: "no scripted response left".to_string(),
                })
            })
    }
}

pub fn sql_response(sql: &str, explanation: &str) -> TransformResponse {
    TransformResponse {
        sql: sql.to_string(),
        chart_type: "bar".to_string(),
        x_axis: "region".to_string(),
        y_axis: "total".to_string(),
        z_axis: None,
        explanation: explanation.to_string(),
        transformation_stages: None,
    }
}
