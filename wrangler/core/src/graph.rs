//! Dependency graph of a pipeline.
//!
//! Stages never name their inputs by id. A stage reads a table by name, and the name is bound
//! to whichever earlier stage produced it:
//!
//! - a LOAD binds its `tableName`
//! - a JOIN binds the conventional name `joined_<left>_<right>`
//! - any stage with `producesTable` binds that name
//!
//! Bindings are created while scanning the pipeline front to back, after the scanned stage's
//! own inputs were resolved. A stage can therefore only ever depend on stages before it and the
//! graph is acyclic by construction. Names that resolve to nothing are dropped silently.
//!
//! The graph is always derived from the current stages and never stored.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};
use wrangler_schemas::{Stage, StageKind, StageType};

/// A stage in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub stage_id: String,

    pub stage_type: StageType,

    /// Ids of the stages this stage reads from, in reference order
    pub inputs: Vec<String>,

    /// 0 without inputs, otherwise one more than the deepest input
    pub level: usize,
}

/// An edge to draw between two stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderEdge {
    pub from: String,
    pub to: String,

    /// Display-only chaining to the previous stage, not a data dependency
    pub implicit: bool,
}

/// Dependency graph with one node per stage, in pipeline order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Build the graph for an ordered list of stages
    pub fn build(stages: &[Stage]) -> Self {
        build_graph(stages)
    }

    /// Nodes in pipeline order
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, stage_id: &str) -> Option<&GraphNode> {
        self.index.get(stage_id).map(|pos| &self.nodes[*pos])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stage ids grouped by level, lowest level first, pipeline order within a level
    pub fn levels(&self) -> Vec<(usize, Vec<&str>)> {
        let mut levels: BTreeMap<usize, Vec<&str>> = BTreeMap::new();

        for node in &self.nodes {
            levels
                .entry(node.level)
                .or_default()
                .push(node.stage_id.as_str());
        }

        levels.into_iter().collect()
    }

    /// Edges for drawing the pipeline.
    ///
    /// Every resolved input becomes an explicit edge. A non-LOAD stage without inputs that is
    /// not the first stage is chained to the nearest preceding non-LOAD stage with an implicit
    /// edge. LOAD stages never receive edges. Implicit edges do not exist in [`GraphNode::inputs`]
    /// and play no part in levels.
    pub fn render_edges(&self) -> Vec<RenderEdge> {
        let mut edges = Vec::new();

        for (pos, node) in self.nodes.iter().enumerate() {
            if node.stage_type == StageType::Load {
                continue;
            }

            if !node.inputs.is_empty() {
                edges.extend(node.inputs.iter().map(|input| RenderEdge {
                    from: input.clone(),
                    to: node.stage_id.clone(),
                    implicit: false,
                }));
                continue;
            }

            let previous = self.nodes[..pos]
                .iter()
                .rev()
                .find(|candidate| candidate.stage_type != StageType::Load);

            if let Some(previous) = previous {
                edges.push(RenderEdge {
                    from: previous.stage_id.clone(),
                    to: node.stage_id.clone(),
                    implicit: true,
                });
            }
        }

        edges
    }
}

/// Table names a stage reads from
fn input_tables(kind: &StageKind) -> Vec<&str> {
    match kind {
        StageKind::Join(join) => [join.left_table.as_deref(), join.right_table.as_deref()]
            .into_iter()
            .flatten()
            .collect(),
        StageKind::Union(union) => union.tables.iter().map(String::as_str).collect(),
        StageKind::Filter(stage) => stage.table.as_deref().into_iter().collect(),
        StageKind::Group(stage) => stage.table.as_deref().into_iter().collect(),
        StageKind::Select(stage) => stage.table.as_deref().into_iter().collect(),
        StageKind::Sort(stage) => stage.table.as_deref().into_iter().collect(),
        StageKind::Load(_) | StageKind::Aggregate | StageKind::Custom(_) => vec![],
    }
}

/// Table names a stage makes available to later stages
fn output_tables(stage: &Stage) -> Vec<String> {
    let mut outputs = Vec::new();

    match &stage.kind {
        StageKind::Load(load) => {
            if let Some(table) = load.table_name.as_deref().filter(|t| !t.is_empty()) {
                outputs.push(table.to_string());
            }
        }
        StageKind::Join(join) => {
            if let (Some(left), Some(right)) = (
                join.left_table.as_deref().filter(|t| !t.is_empty()),
                join.right_table.as_deref().filter(|t| !t.is_empty()),
            ) {
                outputs.push(format!("joined_{left}_{right}"));
            }
        }
        _ => {}
    }

    if let Some(table) = stage.produces_table.as_deref().filter(|t| !t.is_empty()) {
        outputs.push(table.to_string());
    }

    outputs
}

/// Build the dependency graph of a pipeline in a single front-to-back pass
#[instrument(skip_all, fields(stages = stages.len()))]
pub fn build_graph(stages: &[Stage]) -> DependencyGraph {
    let mut graph = DependencyGraph {
        nodes: Vec::with_capacity(stages.len()),
        index: HashMap::with_capacity(stages.len()),
    };
    let mut bindings: HashMap<String, usize> = HashMap::new();

    for (pos, stage) in stages.iter().enumerate() {
        let mut inputs = Vec::new();

        for table in input_tables(&stage.kind) {
            match bindings.get(table) {
                Some(producer) => inputs.push(*producer),
                None => debug!("Stage {} references unbound table '{table}'", stage.id),
            }
        }

        let level = inputs
            .iter()
            .map(|producer| graph.nodes[*producer].level)
            .max()
            .map_or(0, |deepest| deepest + 1);

        let inputs = inputs
            .iter()
            .map(|producer| graph.nodes[*producer].stage_id.clone())
            .collect();

        graph.nodes.push(GraphNode {
            stage_id: stage.id.clone(),
            stage_type: stage.stage_type(),
            inputs,
            level,
        });
        graph.index.insert(stage.id.clone(), pos);

        for table in output_tables(stage) {
            debug!("Binding table '{table}' to stage {}", stage.id);
            bindings.insert(table, pos);
        }
    }

    graph
}
