//! Best-effort reconstruction of stages from SQL text.
//!
//! Only used when the reasoning service answers with SQL but without structured stages. This
//! is not a SQL parser: a fixed set of independent detectors each scan the whole query once and
//! each emits at most one stage. Detectors always run in the same order, whatever the clause
//! order in the query:
//!
//! 1. JOIN
//! 2. GROUP BY (with aggregate calls from the select list)
//! 3. ORDER BY
//! 4. WHERE
//! 5. UNION
//! 6. SELECT column list, skipped for `SELECT *` and when GROUP BY fired
//!
//! When nothing fires the whole query is wrapped in a single CUSTOM stage, so the result is
//! never empty.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, instrument};
use wrangler_schemas::{
    Aggregation, CustomStage, FilterOperator, FilterStage, GroupStage, JoinStage, JoinType,
    OrderBy, ParsedStage, SelectStage, SortDirection, SortStage, StageKind, UnionStage, UnionType,
};

/// Description of the CUSTOM fallback stage when no explanation is available
pub const DEFAULT_CUSTOM_DESCRIPTION: &str = "Custom SQL transformation";

static JOIN_REGEX: OnceLock<Regex> = OnceLock::new();
static FROM_ALIAS_REGEX: OnceLock<Regex> = OnceLock::new();
static FROM_REGEX: OnceLock<Regex> = OnceLock::new();
static GROUP_BY_REGEX: OnceLock<Regex> = OnceLock::new();
static SELECT_LIST_REGEX: OnceLock<Regex> = OnceLock::new();
static AGGREGATE_REGEX: OnceLock<Regex> = OnceLock::new();
static ORDER_BY_REGEX: OnceLock<Regex> = OnceLock::new();
static WHERE_REGEX: OnceLock<Regex> = OnceLock::new();
static UNION_REGEX: OnceLock<Regex> = OnceLock::new();
static UNION_ALL_REGEX: OnceLock<Regex> = OnceLock::new();
static SELECT_STAR_REGEX: OnceLock<Regex> = OnceLock::new();
static ALIAS_REGEX: OnceLock<Regex> = OnceLock::new();

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("invalid regex"))
}

/// Reconstruct an ordered, non-empty list of stages from a SQL query
#[instrument(skip_all, fields(sql_len = sql.len()))]
pub fn extract_stages(sql: &str, explanation: &str) -> Vec<ParsedStage> {
    let mut stages = Vec::new();

    if let Some(stage) = detect_join(sql) {
        stages.push(stage);
    }

    let group = detect_group_by(sql);
    let group_fired = group.is_some();
    if let Some(stage) = group {
        stages.push(stage);
    }

    if let Some(stage) = detect_order_by(sql) {
        stages.push(stage);
    }

    if let Some(stage) = detect_where(sql) {
        stages.push(stage);
    }

    if let Some(stage) = detect_union(sql) {
        stages.push(stage);
    }

    if !group_fired {
        if let Some(stage) = detect_select_columns(sql) {
            stages.push(stage);
        }
    }

    if stages.is_empty() {
        debug!("No detector fired, wrapping query in a CUSTOM stage");

        let description = if explanation.is_empty() {
            DEFAULT_CUSTOM_DESCRIPTION
        } else {
            explanation
        };

        stages.push(ParsedStage::new(
            StageKind::Custom(CustomStage {
                sql: Some(sql.to_string()),
            }),
            description,
        ));
    }

    stages
}

fn detect_join(sql: &str) -> Option<ParsedStage> {
    let captures = regex(
        &JOIN_REGEX,
        r"(?i)(?:\b(LEFT|RIGHT|FULL|INNER)\s+(?:OUTER\s+)?)?\bJOIN\s+(\w+)(?:\s+(?:AS\s+)?(\w+))?\s+ON\s+(\w+)\.(\w+)\s*=\s*(\w+)\.(\w+)",
    )
    .captures(sql)?;

    let join_type = captures
        .get(1)
        .and_then(|kind| kind.as_str().parse::<JoinType>().ok())
        .unwrap_or_default();
    let right_table = captures[2].to_string();
    let right_alias = captures.get(3).map(|alias| alias.as_str());

    let left_table = regex(&FROM_ALIAS_REGEX, r"(?i)\bFROM\s+(\w+)\s+(?:AS\s+)?\w+")
        .captures(sql)
        .map(|from| from[1].to_string())
        .unwrap_or_else(|| captures[4].to_string());

    // `ON c.id = o.cust_id` names the joined table first
    let on_left = &captures[4];
    let swapped = on_left.eq_ignore_ascii_case(&right_table)
        || right_alias.is_some_and(|alias| on_left.eq_ignore_ascii_case(alias));
    let (left_key, right_key) = if swapped {
        (captures[7].to_string(), captures[5].to_string())
    } else {
        (captures[5].to_string(), captures[7].to_string())
    };

    debug!("JOIN detector fired: {join_type} {left_table} with {right_table}");

    Some(ParsedStage::new(
        StageKind::Join(JoinStage {
            join_type: Some(join_type),
            left_table: Some(left_table.clone()),
            right_table: Some(right_table.clone()),
            left_key: Some(left_key),
            right_key: Some(right_key),
            condition: None,
        }),
        format!("{join_type} join {left_table} with {right_table}"),
    ))
}

fn select_list(sql: &str) -> Option<&str> {
    regex(&SELECT_LIST_REGEX, r"(?is)\bSELECT\s+(.+?)\s+FROM\b")
        .captures(sql)
        .and_then(|captures| captures.get(1))
        .map(|list| list.as_str())
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn detect_group_by(sql: &str) -> Option<ParsedStage> {
    let captures = regex(
        &GROUP_BY_REGEX,
        r"(?is)\bGROUP\s+BY\s+(.+?)(?:\s+(?:HAVING|ORDER|LIMIT)\b|\s*;|\s*$)",
    )
    .captures(sql)?;

    let group_by = split_list(&captures[1]);
    if group_by.is_empty() {
        return None;
    }

    let aggregations = select_list(sql)
        .map(|list| {
            regex(
                &AGGREGATE_REGEX,
                r"(?i)\b(SUM|COUNT|AVG|MAX|MIN)\s*\(([^)]+)\)(?:\s+AS\s+(\w+))?",
            )
            .captures_iter(list)
            .map(|agg| Aggregation {
                function: agg[1].to_ascii_uppercase(),
                column: agg[2].trim().to_string(),
                alias: agg.get(3).map(|alias| alias.as_str().to_string()),
            })
            .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    debug!(
        "GROUP BY detector fired: {} keys, {} aggregations",
        group_by.len(),
        aggregations.len()
    );

    let description = format!("Group by {}", group_by.join(", "));

    Some(ParsedStage::new(
        StageKind::Group(GroupStage {
            table: None,
            group_by,
            aggregations,
        }),
        description,
    ))
}

fn detect_order_by(sql: &str) -> Option<ParsedStage> {
    let captures = regex(
        &ORDER_BY_REGEX,
        r"(?i)\bORDER\s+BY\s+(?:\w+\.)?(\w+)(?:\s+(ASC|DESC)\b)?",
    )
    .captures(sql)?;

    let column = captures[1].to_string();
    let direction = captures
        .get(2)
        .and_then(|direction| direction.as_str().parse::<SortDirection>().ok())
        .unwrap_or_default();

    debug!("ORDER BY detector fired: {column} {direction}");

    Some(ParsedStage::new(
        StageKind::Sort(SortStage {
            table: None,
            order_by: vec![OrderBy {
                column: column.clone(),
                direction,
            }],
        }),
        format!("Sort by {column} {direction}"),
    ))
}

fn detect_where(sql: &str) -> Option<ParsedStage> {
    let captures = regex(
        &WHERE_REGEX,
        r"(?is)\bWHERE\s+(?:\w+\.)?(\w+)\s*(NOT\s+IN\b|IN\b|LIKE\b|[=<>!]+)\s*(.+?)(?:\s+(?:GROUP|ORDER|LIMIT)\b|\s*;|\s*$)",
    )
    .captures(sql)?;

    let column = captures[1].to_string();
    let raw_operator = captures[2].split_whitespace().collect::<Vec<_>>().join(" ");
    let raw_value = captures[3].trim();

    let operator = match raw_operator.parse::<FilterOperator>() {
        Ok(operator) => operator,
        Err(error) => {
            debug!("WHERE detector skipped: {error}");
            return None;
        }
    };
    let value = raw_value.replace(['\'', '"'], "");

    let table = regex(&FROM_REGEX, r"(?i)\bFROM\s+(\w+)")
        .captures(sql)
        .map(|from| from[1].to_string());

    debug!("WHERE detector fired: {column} {operator} {value}");

    Some(ParsedStage::new(
        StageKind::Filter(FilterStage {
            table,
            column: Some(column.clone()),
            operator: Some(operator),
            value: Some(serde_json::Value::String(value)),
            conditions: vec![],
        }),
        format!("Filter where {column} {raw_operator} {raw_value}"),
    ))
}

fn detect_union(sql: &str) -> Option<ParsedStage> {
    if !regex(&UNION_REGEX, r"(?i)\bUNION\b").is_match(sql) {
        return None;
    }

    let union_type = if regex(&UNION_ALL_REGEX, r"(?i)\bUNION\s+ALL\b").is_match(sql) {
        UnionType::UnionAll
    } else {
        UnionType::Union
    };

    let tables = regex(&FROM_REGEX, r"(?i)\bFROM\s+(\w+)")
        .captures_iter(sql)
        .map(|from| from[1].to_string())
        .collect::<Vec<_>>();

    debug!("UNION detector fired: {union_type} over {} tables", tables.len());

    let description = format!("Union {}", tables.join(" and "));

    Some(ParsedStage::new(
        StageKind::Union(UnionStage {
            union_type: Some(union_type),
            tables,
        }),
        description,
    ))
}

fn detect_select_columns(sql: &str) -> Option<ParsedStage> {
    if regex(&SELECT_STAR_REGEX, r"(?i)\bSELECT\s+\*").is_match(sql) {
        return None;
    }

    let alias = regex(&ALIAS_REGEX, r"(?i)\s+AS\s+");
    let columns = split_list(select_list(sql)?)
        .into_iter()
        .filter_map(|column| {
            let name = alias.split(&column).next().unwrap_or_default().trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect::<Vec<_>>();

    if columns.is_empty() {
        return None;
    }

    debug!("SELECT detector fired: {} columns", columns.len());

    let description = format!("Select columns: {}", columns.join(", "));

    Some(ParsedStage::new(
        StageKind::Select(SelectStage {
            table: None,
            columns,
        }),
        description,
    ))
}
