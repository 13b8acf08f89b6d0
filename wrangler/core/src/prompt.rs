//! Natural-language instructions synthesized from stages.
//!
//! The phrasing is part of the prompt sent to the reasoning service, so every template here is
//! fixed. Changing a single word changes what the service is asked to do.

use serde_json::Value;
use tracing::{debug, instrument};
use wrangler_schemas::{Stage, StageKind};

use crate::validation::is_complete;

/// Instruction text for one stage, or an empty string if the stage is incomplete
pub fn describe_stage(stage: &Stage) -> String {
    if !is_complete(stage) {
        return String::new();
    }

    match &stage.kind {
        StageKind::Join(join) => format!(
            "Perform a {} JOIN between {left} and {right} on {left}.{} = {right}.{}",
            join.join_type.unwrap_or_default(),
            join.left_key.as_deref().unwrap_or_default(),
            join.right_key.as_deref().unwrap_or_default(),
            left = join.left_table.as_deref().unwrap_or_default(),
            right = join.right_table.as_deref().unwrap_or_default(),
        ),
        StageKind::Union(union) => format!(
            "Perform {} on tables: {}",
            union.union_type.unwrap_or_default(),
            union.tables.join(", ")
        ),
        StageKind::Filter(filter) => format!(
            "Filter {} where {} {} {}",
            filter.table.as_deref().unwrap_or_default(),
            filter.column.as_deref().unwrap_or_default(),
            filter.operator.map(|op| op.to_string()).unwrap_or_default(),
            filter.value.as_ref().map(value_text).unwrap_or_default(),
        ),
        StageKind::Group(group) => {
            let mut text = format!("Group by {}", group.group_by.join(", "));

            if !group.aggregations.is_empty() {
                let aggregations = group
                    .aggregations
                    .iter()
                    .map(|agg| match agg.alias.as_deref() {
                        Some(alias) if !alias.is_empty() => {
                            format!("{}({}) as {alias}", agg.function, agg.column)
                        }
                        _ => format!("{}({})", agg.function, agg.column),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");

                text.push_str(" with ");
                text.push_str(&aggregations);
            }

            text
        }
        StageKind::Select(select) => format!("Select columns: {}", select.columns.join(", ")),
        StageKind::Sort(sort) => format!(
            "Sort by {}",
            sort.order_by
                .iter()
                .map(|key| format!("{} {}", key.column, key.direction))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        StageKind::Custom(custom) => format!(
            "Execute custom SQL: {}",
            custom.sql.as_deref().unwrap_or_default()
        ),
        StageKind::Load(_) | StageKind::Aggregate => stage.description.clone(),
    }
}

/// Instruction text for a whole pipeline.
///
/// The texts of all complete stages in pipeline order, joined with `". "` and closed with a
/// single period. Empty when no stage is complete.
#[instrument(skip_all, fields(stages = stages.len()))]
pub fn describe_pipeline(stages: &[Stage]) -> String {
    let sentences = stages
        .iter()
        .map(describe_stage)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();

    debug!("Described {} of {} stages", sentences.len(), stages.len());

    if sentences.is_empty() {
        String::new()
    } else {
        format!("{}.", sentences.join(". "))
    }
}

/// Render a filter value the way it is spliced into a sentence
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(","),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use wrangler_schemas::*;

    fn join(join_type: Option<JoinType>) -> Stage {
        Stage::new(
            StageKind::Join(JoinStage {
                join_type,
                left_table: Some("orders".into()),
                right_table: Some("customers".into()),
                left_key: Some("cust_id".into()),
                right_key: Some("id".into()),
                condition: None,
            }),
            "",
        )
    }

    fn filter(value: Value) -> Stage {
        Stage::new(
            StageKind::Filter(
                FilterStage::builder()
                    .table("t1".into())
                    .column("amount".into())
                    .operator(FilterOperator::Gt)
                    .value(value)
                    .build(),
            ),
            "",
        )
    }

    #[test]
    fn test_join_sentence() {
        assert_eq!(
            describe_stage(&join(Some(JoinType::Left))),
            "Perform a LEFT JOIN between orders and customers on orders.cust_id = customers.id"
        );
    }

    #[test]
    fn test_join_defaults_to_inner() {
        assert_eq!(
            describe_stage(&join(None)),
            "Perform a INNER JOIN between orders and customers on orders.cust_id = customers.id"
        );
    }

    #[test]
    fn test_union_sentence() {
        let stage = Stage::new(
            StageKind::Union(UnionStage {
                union_type: Some(UnionType::UnionAll),
                tables: vec!["jan".into(), "feb".into()],
            }),
            "",
        );

        assert_eq!(
            describe_stage(&stage),
            "Perform UNION ALL on tables: jan, feb"
        );
    }

    #[rstest]
    #[case(json!("500"), "Filter t1 where amount > 500")]
    #[case(json!(500), "Filter t1 where amount > 500")]
    #[case(json!(2.5), "Filter t1 where amount > 2.5")]
    #[case(json!(["a", "b"]), "Filter t1 where amount > a,b")]
    fn test_filter_sentence(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(describe_stage(&filter(value)), expected);
    }

    #[test]
    fn test_group_sentence_with_aggregations() {
        let stage = Stage::new(
            StageKind::Group(GroupStage {
                table: None,
                group_by: vec!["region".into(), "year".into()],
                aggregations: vec![
                    Aggregation {
                        function: "SUM".into(),
                        column: "amount".into(),
                        alias: Some("total".into()),
                    },
                    Aggregation {
                        function: "COUNT".into(),
                        column: "*".into(),
                        alias: Some(String::new()),
                    },
                ],
            }),
            "",
        );

        assert_eq!(
            describe_stage(&stage),
            "Group by region, year with SUM(amount) as total, COUNT(*)"
        );
    }

    #[test]
    fn test_sort_select_and_custom_sentences() {
        let sort = Stage::new(
            StageKind::Sort(SortStage {
                table: None,
                order_by: vec![
                    OrderBy {
                        column: "total".into(),
                        direction: SortDirection::Desc,
                    },
                    OrderBy {
                        column: "region".into(),
                        direction: SortDirection::Asc,
                    },
                ],
            }),
            "",
        );
        let select = Stage::new(
            StageKind::Select(SelectStage {
                table: None,
                columns: vec!["a".into(), "b".into()],
            }),
            "",
        );
        let custom = Stage::new(
            StageKind::Custom(CustomStage {
                sql: Some("SELECT 1".into()),
            }),
            "",
        );

        assert_eq!(describe_stage(&sort), "Sort by total DESC, region ASC");
        assert_eq!(describe_stage(&select), "Select columns: a, b");
        assert_eq!(describe_stage(&custom), "Execute custom SQL: SELECT 1");
    }

    #[test]
    fn test_other_types_use_description() {
        let load = Stage::new(
            StageKind::Load(LoadStage::builder().table_name("t1".into()).build()),
            "Load the orders export",
        );
        let aggregate = Stage::new(StageKind::Aggregate, "");

        assert_eq!(describe_stage(&load), "Load the orders export");
        assert_eq!(describe_stage(&aggregate), "");
    }

    #[test]
    fn test_incomplete_stage_is_silent() {
        let stage = Stage::new(StageKind::Select(SelectStage::default()), "ignored");
        assert_eq!(describe_stage(&stage), "");
    }

    #[test]
    fn test_pipeline_sentences() {
        let stages = vec![
            Stage::new(StageKind::Select(SelectStage::default()), ""),
            join(Some(JoinType::Left)),
            filter(json!("500")),
        ];

        assert_eq!(
            describe_pipeline(&stages),
            "Perform a LEFT JOIN between orders and customers on orders.cust_id = customers.id. Filter t1 where amount > 500."
        );
    }

    #[test]
    fn test_pipeline_without_complete_stages() {
        assert_eq!(describe_pipeline(&[]), "");
        assert_eq!(
            describe_pipeline(&[Stage::new(StageKind::Sort(SortStage::default()), "")]),
            ""
        );
    }
}
