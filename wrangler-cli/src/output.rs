use std::fmt::Write;

use wrangler::prelude::*;

/// Plain-text rendering of a dependency graph, one block per level
pub fn render_graph(stages: &[Stage], graph: &DependencyGraph) -> String {
    let mut out = String::new();

    for (level, ids) in graph.levels() {
        let _ = writeln!(out, "Level {level}");

        for id in ids {
            let Some(node) = graph.node(id) else {
                continue;
            };
            let description = stages
                .iter()
                .find(|stage| stage.id == id)
                .map(|stage| stage.description.as_str())
                .filter(|description| !description.is_empty());

            let _ = write!(out, "  {} [{}]", node.stage_id, node.stage_type);
            if let Some(description) = description {
                let _ = write!(out, " {description}");
            }
            if !node.inputs.is_empty() {
                let _ = write!(out, " <- {}", node.inputs.join(", "));
            }
            out.push('\n');
        }
    }

    let edges = graph.render_edges();
    if !edges.is_empty() {
        out.push_str("Edges\n");
        for edge in edges {
            let arrow = if edge.implicit { "~>" } else { "->" };
            let _ = writeln!(out, "  {} {arrow} {}", edge.from, edge.to);
        }
    }

    out
}

/// JSON rendering of a dependency graph
pub fn graph_json(graph: &DependencyGraph) -> serde_json::Value {
    serde_json::json!({
        "nodes": graph.nodes(),
        "levels": graph.levels(),
        "edges": graph.render_edges(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(id: &str, kind: StageKind, description: &str) -> Stage {
        let mut stage = Stage::new(kind, description);
        stage.id = id.to_string();
        stage
    }

    fn sample() -> Vec<Stage> {
        vec![
            stage(
                "load",
                StageKind::Load(LoadStage::builder().table_name("orders".into()).build()),
                "Orders",
            ),
            stage(
                "filter",
                StageKind::Filter(
                    FilterStage::builder()
                        .table("orders".into())
                        .column("amount".into())
                        .operator(FilterOperator::Gt)
                        .value(serde_json::json!(10))
                        .build(),
                ),
                "",
            ),
            stage(
                "select",
                StageKind::Select(SelectStage::builder().columns(vec!["a".into()]).build()),
                "",
            ),
        ]
    }

    #[test]
    fn test_render_graph() {
        let stages = sample();
        let graph = build_graph(&stages);

        assert_eq!(
            render_graph(&stages, &graph),
            "Level 0\n  load [LOAD] Orders\n  select [SELECT]\n\
             Level 1\n  filter [FILTER] <- load\n\
             Edges\n  load -> filter\n  filter ~> select\n"
        );
    }

    #[test]
    fn test_graph_json() {
        let stages = sample();
        let value = graph_json(&build_graph(&stages));

        assert_eq!(value["nodes"][1]["stageId"], "filter");
        assert_eq!(value["nodes"][1]["inputs"][0], "load");
        assert_eq!(value["edges"][1]["implicit"], true);
        assert_eq!(value["levels"][1][0], 1);
    }
}
