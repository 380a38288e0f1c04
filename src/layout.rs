//! Node placement. Every algorithm works on plain [`LayoutNode`] /
//! [`LayoutEdge`] records extracted from the graph and returns positions;
//! [`apply_positions`] writes them back.

pub mod force;
pub mod grid;
pub mod hierarchical;
pub mod smart;

use crate::geometry::{Point, Rect, Size};
use crate::model::{DiagramGraph, ModelError, NodeId};
use serde::Deserialize;
use std::str::FromStr;

pub use force::{ForceLayout, ForceLayoutOptions};
pub use grid::{GridLayout, GridLayoutOptions, GridLayoutResult, calculate_grid_layout};
pub use hierarchical::{HierarchicalLayout, HierarchicalLayoutOptions};
pub use smart::{SmartLayout, SmartLayoutOptions};

/// Picks positions for nodes that are about to be added.
pub trait Placement {
    /// Top-left positions for new nodes of the given sizes, avoiding the
    /// `existing` boxes.
    fn place(&self, sizes: &[Size], existing: &[Rect]) -> Vec<Point>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub relationship_count: usize, // declared relationships in metadata
}

impl LayoutNode {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn bbox(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Move so the node is centred on `p`.
    pub fn center_on(&mut self, p: Point) {
        self.x = p.x - self.width / 2.0;
        self.y = p.y - self.height / 2.0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64, // included relationships on the link
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutAlgorithm {
    #[default]
    Grid,
    Smart,
    Hierarchical,
    Force,
}

impl FromStr for LayoutAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grid" => Ok(Self::Grid),
            "smart" => Ok(Self::Smart),
            "hierarchical" => Ok(Self::Hierarchical),
            "force" => Ok(Self::Force),
            other => Err(format!("Unknown layout algorithm: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub grid: GridLayoutOptions,
    pub smart: SmartLayoutOptions,
    pub hierarchical: HierarchicalLayoutOptions,
    pub force: ForceLayoutOptions,
}

/// Entity nodes (optionally restricted to `ids`) and the links among them.
pub fn collect(graph: &DiagramGraph, ids: Option<&[NodeId]>) -> (Vec<LayoutNode>, Vec<LayoutEdge>) {
    let nodes: Vec<LayoutNode> = graph
        .entity_nodes()
        .filter(|n| ids.is_none_or(|ids| ids.contains(&n.id)))
        .map(|n| LayoutNode {
            id: n.id.clone(),
            x: n.position.x,
            y: n.position.y,
            width: n.size.width,
            height: n.size.height,
            relationship_count: n.entity().map(|e| e.relationship_count).unwrap_or(0),
        })
        .collect();

    let edges = graph
        .links()
        .iter()
        .filter(|l| {
            nodes.iter().any(|n| n.id == l.source.id) && nodes.iter().any(|n| n.id == l.target.id)
        })
        .map(|l| LayoutEdge {
            from: l.source.id.clone(),
            to: l.target.id.clone(),
            weight: l.relationships.iter().filter(|r| r.is_included).count().max(1) as f64,
        })
        .collect();

    (nodes, edges)
}

pub fn apply_positions(graph: &mut DiagramGraph, nodes: &[LayoutNode]) -> Result<(), ModelError> {
    for node in nodes {
        graph.set_position(&node.id, Point::new(node.x, node.y))?;
    }
    Ok(())
}

/// Rearrange entity nodes (all of them, or only `ids`) with one algorithm.
pub fn arrange(
    graph: &mut DiagramGraph,
    ids: Option<&[NodeId]>,
    algorithm: LayoutAlgorithm,
    options: &LayoutOptions,
) -> Result<(), ModelError> {
    let (mut nodes, edges) = collect(graph, ids);
    if nodes.is_empty() {
        return Ok(());
    }
    tracing::debug!(?algorithm, nodes = nodes.len(), edges = edges.len(), "arranging");

    match algorithm {
        LayoutAlgorithm::Grid => GridLayout::new(options.grid.clone()).arrange(&mut nodes),
        LayoutAlgorithm::Smart => SmartLayout::new(options.smart.clone()).arrange(&mut nodes),
        LayoutAlgorithm::Hierarchical => {
            HierarchicalLayout::new(options.hierarchical.clone()).arrange(&mut nodes, &edges)
        }
        LayoutAlgorithm::Force => ForceLayout::new(options.force.clone()).arrange(&mut nodes, &edges),
    }
    apply_positions(graph, &nodes)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn node(id: &str, width: f64, height: f64, relationships: usize) -> LayoutNode {
        LayoutNode {
            id: id.to_string(),
            x: 0.0,
            y: 0.0,
            width,
            height,
            relationship_count: relationships,
        }
    }

    pub fn edge(from: &str, to: &str) -> LayoutEdge {
        LayoutEdge {
            from: from.to_string(),
            to: to.to_string(),
            weight: 1.0,
        }
    }
}
