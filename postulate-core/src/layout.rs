//! Grid layout for the conversation-flow graph.
//!
//! Each branch level gets its own band of rows. Within a band nodes are
//! placed left to right by id and wrap once the row is full; the next band
//! starts below the last row plus `branch_gap`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::LayoutConfig;
use crate::models::FlowNode;

pub const SALESMAN_COLOR: &str = "#2E7D32";
pub const CLIENT_COLOR: &str = "#FFC107";
const DEFAULT_STROKE: &str = "black";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionedNode {
    pub id: i64,
    pub label: String,
    pub role: String,
    pub branch_level: i64,
    pub x: i64,
    pub y: i64,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowEdge {
    pub id: String,
    pub source: i64,
    pub target: i64,
    pub stroke: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowGraph {
    pub nodes: Vec<PositionedNode>,
    pub edges: Vec<FlowEdge>,
}

fn node_color(role: &str) -> &'static str {
    if role == "salesman" {
        SALESMAN_COLOR
    } else {
        CLIENT_COLOR
    }
}

pub fn layout_flow(nodes: &[FlowNode], config: &LayoutConfig) -> FlowGraph {
    let spacing_x = config.node_spacing_x.max(1);
    let per_row = (config.max_width / spacing_x).max(1) as usize;

    let mut levels: BTreeMap<i64, Vec<&FlowNode>> = BTreeMap::new();
    for node in nodes {
        levels.entry(node.branch_level).or_default().push(node);
    }

    let mut graph = FlowGraph::default();
    let mut y_start = 0;

    for (level, mut members) in levels {
        members.sort_by_key(|n| n.id);

        for (i, node) in members.iter().enumerate() {
            let col = (i % per_row) as i64;
            let row = (i / per_row) as i64;
            graph.nodes.push(PositionedNode {
                id: node.id,
                label: node.label.clone(),
                role: node.role.clone(),
                branch_level: level,
                x: col * spacing_x,
                y: y_start + row * config.node_spacing_y,
                color: node_color(&node.role),
            });

            let stroke = node
                .arrow_color
                .clone()
                .unwrap_or_else(|| DEFAULT_STROKE.to_string());
            for &target in &node.target_ids {
                graph.edges.push(FlowEdge {
                    id: format!("e-{}-{}", node.id, target),
                    source: node.id,
                    target,
                    stroke: stroke.clone(),
                });
            }
        }

        let rows = members.len().div_ceil(per_row) as i64;
        y_start += rows * config.node_spacing_y + config.branch_gap;
    }

    graph
}
