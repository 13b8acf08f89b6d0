//! Stage completeness checks.
//!
//! [`is_complete`] is the single answer to "is this stage usable": only complete stages
//! contribute text to a prompt. The check never fails, it only says yes or no.

use wrangler_schemas::{Stage, StageKind};

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Whether the payload of a stage carries every field its type needs.
///
/// | Type   | Required                                  |
/// |--------|-------------------------------------------|
/// | LOAD   | `tableName` or `fileName`                 |
/// | JOIN   | both tables and both keys                 |
/// | UNION  | at least one table                        |
/// | FILTER | table, column, operator and a value that is not an empty string |
/// | GROUP  | at least one group-by column              |
/// | SELECT | at least one column                       |
/// | SORT   | at least one order-by key                 |
/// | CUSTOM | SQL that is not blank                     |
///
/// Any other type is always complete. The description is never required.
pub fn is_complete(stage: &Stage) -> bool {
    is_kind_complete(&stage.kind)
}

fn is_kind_complete(kind: &StageKind) -> bool {
    match kind {
        StageKind::Load(load) => present(&load.table_name) || present(&load.file_name),
        StageKind::Join(join) => {
            present(&join.left_table)
                && present(&join.right_table)
                && present(&join.left_key)
                && present(&join.right_key)
        }
        StageKind::Union(union) => !union.tables.is_empty(),
        StageKind::Filter(filter) => {
            present(&filter.table)
                && present(&filter.column)
                && filter.operator.is_some()
                && match &filter.value {
                    None => false,
                    Some(serde_json::Value::String(value)) => !value.is_empty(),
                    Some(_) => true,
                }
        }
        StageKind::Group(group) => !group.group_by.is_empty(),
        StageKind::Select(select) => !select.columns.is_empty(),
        StageKind::Sort(sort) => !sort.order_by.is_empty(),
        StageKind::Custom(custom) => custom
            .sql
            .as_deref()
            .is_some_and(|sql| !sql.trim().is_empty()),
        StageKind::Aggregate => true,
    }
}
