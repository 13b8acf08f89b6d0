//! Integration tests for wrangler core.
//!
//! These tests run whole pipelines through prompt synthesis, graph building, definition loading
//! and the session controller.

mod common;

use common::*;
use std::collections::HashMap;
use std::time::Duration;
use wrangler_core::prelude::*;

#[test]
fn test_sample_pipeline_prompt() {
    let stages = sample_stages();

    assert_eq!(
        describe_pipeline(&stages),
        "Orders export. Customer master data. \
         Perform a LEFT JOIN between orders and customers on orders.cust_id = customers.id. \
         Filter joined_orders_customers where amount > 500. \
         Group by region with SUM(amount) as total. \
         Sort by total DESC."
    );
}

#[test]
fn test_sample_pipeline_graph() {
    let stages = sample_stages();
    let graph = build_graph(&stages);

    let levels = graph
        .levels()
        .into_iter()
        .map(|(level, ids)| (level, ids.len()))
        .collect::<Vec<_>>();
    // GROUP and SORT name no table and sit at level 0 next to the loads
    assert_eq!(levels, vec![(0, 4), (1, 1), (2, 1)]);

    let filter = graph.node(&stages[3].id).unwrap();
    assert_eq!(filter.inputs, vec![stages[2].id.clone()]);
    assert_eq!(filter.level, 2);

    let implicit = graph
        .render_edges()
        .into_iter()
        .filter(|edge| edge.implicit)
        .map(|edge| (edge.from, edge.to))
        .collect::<Vec<_>>();
    assert_eq!(
        implicit,
        vec![
            (stages[3].id.clone(), stages[4].id.clone()),
            (stages[4].id.clone(), stages[5].id.clone()),
        ]
    );
}

#[test]
fn test_load_definition_from_file() {
    let dir = DefinitionDir::new().unwrap();
    let path = dir
        .write(
            "pipeline.yaml",
            r#"
stages:
  - id: load_sales
    type: LOAD
    description: Monthly sales
    data:
      tableName: ${table}
  - id: keep_large
    type: FILTER
    data:
      table: ${table}
      column: amount
      operator: ">="
      value: ${threshold}
  - id: rollup
    type: CUSTOM
    data:
      sql: SELECT region, SUM(amount) AS total FROM ${table} GROUP BY region
"#,
        )
        .unwrap();

    let params = HashMap::from([
        ("table".to_string(), "sales".to_string()),
        ("threshold".to_string(), "100".to_string()),
    ]);
    let pipeline = Pipeline::from_file(&path, format_from_path(&path), params).unwrap();

    assert_eq!(
        describe_pipeline(&pipeline.stages),
        "Monthly sales. Filter sales where amount >= 100. \
         Execute custom SQL: SELECT region, SUM(amount) AS total FROM sales GROUP BY region."
    );

    let graph = build_graph(&pipeline.stages);
    assert_eq!(graph.node("keep_large").unwrap().inputs, vec!["load_sales"]);
}

#[test]
fn test_missing_definition_file() {
    let result = Pipeline::from_file("does/not/exist.yaml", TemplateFormat::Yaml, HashMap::new());
    assert!(matches!(result, Err(TemplateError::NotFound { .. })));
}

#[tokio::test]
async fn test_transform_applies_extracted_stages() {
    let service = ScriptedService::new(vec![Ok(sql_response(
        "SELECT region, SUM(amount) AS total FROM orders WHERE amount > 500 GROUP BY region ORDER BY total DESC",
        "Large orders per region",
    ))]);

    let mut session = Session::with_stages(sample_stages());
    session.set_schema(sample_schema());
    let prompt = session.prompt();

    let applied = session.transform(&service, &prompt, "secret").await.unwrap();
    assert_eq!(
        applied,
        Applied::Applied {
            generation: 1,
            extracted: true
        }
    );

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].user_prompt, prompt);
    assert_eq!(requests[0].api_key, "secret");
    assert_eq!(requests[0].schema.len(), 4);

    let types = session
        .stages()
        .iter()
        .map(Stage::stage_type)
        .collect::<Vec<_>>();
    assert_eq!(
        types,
        vec![StageType::Group, StageType::Sort, StageType::Filter]
    );

    let outcome = session.outcome().unwrap();
    assert_eq!(outcome.chart.x_axis, "region");
    assert_eq!(outcome.explanation, "Large orders per region");
}

#[tokio::test]
async fn test_undecodable_service_stages_fall_back_to_extraction() {
    let response: TransformResponse = serde_json::from_str(
        r#"{
            "sql": "SELECT * FROM orders ORDER BY amount DESC",
            "chartType": "bar",
            "xAxis": "region",
            "yAxis": "amount",
            "explanation": "Biggest orders first",
            "transformationStages": [
                {"type": "SORT", "data": {"orderBy": [{"column": "amount", "direction": "Desc"}]}},
                {"type": "WINDOW", "data": {"partitionBy": ["region"]}}
            ]
        }"#,
    )
    .unwrap();
    let service = ScriptedService::new(vec![Ok(response)]);

    let mut session = Session::with_stages(sample_stages());
    let applied = session
        .transform(&service, "Sort orders by amount", "secret")
        .await
        .unwrap();

    assert_eq!(
        applied,
        Applied::Applied {
            generation: 1,
            extracted: true
        }
    );
    assert_eq!(session.stages().len(), 1);
    assert_eq!(session.prompt(), "Sort by amount DESC.");
    assert_eq!(
        session.outcome().unwrap().sql,
        "SELECT * FROM orders ORDER BY amount DESC"
    );
}

#[tokio::test]
async fn test_transform_without_key_sends_nothing() {
    let service = ScriptedService::new(vec![]);
    let mut session = Session::with_stages(sample_stages());

    let prompt = session.prompt();
    let result = session.transform(&service, &prompt, "").await;

    assert!(matches!(result, Err(SessionError::MissingApiKey)));
    assert!(service.requests().is_empty());
}

#[tokio::test]
async fn test_service_failure_keeps_previous_result() {
    let service = ScriptedService::new(vec![
        Ok(sql_response("SELECT * FROM orders", "")),
        Err(ReasoningError::Service {
            status: 401,
            message: "Invalid API key".to_string(),
        }),
    ]);
    let mut session = Session::new();

    session.transform(&service, "first", "key").await.unwrap();
    let result = session.transform(&service, "second", "key").await;

    assert!(matches!(
        result,
        Err(SessionError::Reasoning(ReasoningError::Service { status: 401, .. }))
    ));
    assert_eq!(session.outcome().unwrap().sql, "SELECT * FROM orders");
    assert_eq!(session.stages().len(), 1);
    assert!(session.last_error().unwrap().contains("Invalid API key"));
}

#[tokio::test]
async fn test_overlapping_submissions_apply_only_latest() {
    let slow = ScriptedService::new(vec![Ok(sql_response(
        "SELECT a, b FROM t ORDER BY a DESC",
        "",
    ))])
    .with_delay(Duration::from_millis(50));
    let fast = ScriptedService::new(vec![Ok(sql_response("SELECT * FROM t LIMIT 5", "Preview"))]);

    let mut session = Session::new();
    let first = session.begin_submission("first", "key").unwrap();
    let second = session.begin_submission("second", "key").unwrap();

    let (slow_response, fast_response) = tokio::join!(
        slow.transform(&first.request),
        fast.transform(&second.request)
    );

    let applied = session.apply_response(second.generation, fast_response.unwrap());
    assert!(matches!(applied, Applied::Applied { generation: 2, .. }));

    let discarded = session.apply_response(first.generation, slow_response.unwrap());
    assert_eq!(
        discarded,
        Applied::Discarded {
            generation: 1,
            latest: 2
        }
    );

    assert_eq!(session.stages().len(), 1);
    assert_eq!(session.stages()[0].description, "Preview");
}

#[test]
fn test_extracted_stages_feed_the_graph() {
    let sql = "SELECT o.id, c.name FROM orders o JOIN customers c ON o.cust_id = c.id";
    let stages = extract_stages(sql, "")
        .into_iter()
        .map(ParsedStage::into_stage)
        .collect::<Vec<_>>();

    assert_eq!(
        describe_pipeline(&stages),
        "Perform a INNER JOIN between orders and customers on orders.cust_id = customers.id. \
         Select columns: o.id, c.name."
    );

    let graph = build_graph(&stages);
    assert!(graph.nodes().iter().all(|node| node.level == 0));
    assert!(graph.node(&stages[1].id).unwrap().inputs.is_empty());
}
