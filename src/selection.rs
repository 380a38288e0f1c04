//! Rubber-band selection over the canvas.
//!
//! Dragging over blank canvas spans a rectangle. On release every entity
//! node lying completely inside it is selected; two or more selected nodes
//! are wrapped in a selection container (a `selection.SelectionElement`
//! node placed behind them with the members embedded) so they move as one.

use crate::geometry::{Point, Rect, Size};
use crate::layout::{self, SmartLayout};
use crate::model::{DiagramGraph, ModelError, NodeId};

/// Releases smaller than this in both directions count as a click.
pub const MIN_DRAG_EXTENT: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging { start: Point, current: Point },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    None,
    Single(NodeId),
    Group { container: NodeId, members: Vec<NodeId> },
}

#[derive(Debug, Default)]
pub struct AreaSelection {
    state: DragState,
    selected: Vec<NodeId>,
    container: Option<NodeId>,
}

impl AreaSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn selected(&self) -> &[NodeId] {
        &self.selected
    }

    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    /// Start a drag if `p` is on blank canvas. Returns whether it started.
    pub fn pointer_down(&mut self, graph: &DiagramGraph, p: Point) -> bool {
        if graph.nodes().iter().any(|n| n.bbox().contains_point(&p)) {
            return false;
        }
        self.state = DragState::Dragging { start: p, current: p };
        true
    }

    /// Update the drag; returns the overlay rectangle to draw.
    pub fn pointer_move(&mut self, p: Point) -> Option<Rect> {
        if let DragState::Dragging { current, .. } = &mut self.state {
            *current = p;
        }
        self.overlay()
    }

    /// Overlay rectangle for the drag in progress, never thinner than 1.
    pub fn overlay(&self) -> Option<Rect> {
        match self.state {
            DragState::Idle => None,
            DragState::Dragging { start, current } => {
                let mut r = Rect::from_corners(start, current);
                r.width = r.width.max(1.0);
                r.height = r.height.max(1.0);
                Some(r)
            }
        }
    }

    /// Finish the drag and select what lies inside.
    pub fn pointer_up(&mut self, graph: &mut DiagramGraph, p: Point) -> Outcome {
        let DragState::Dragging { start, .. } = std::mem::take(&mut self.state) else {
            return Outcome::None;
        };
        let area = Rect::from_corners(start, p);
        self.teardown(graph);

        if area.width < MIN_DRAG_EXTENT && area.height < MIN_DRAG_EXTENT {
            self.selected.clear();
            return Outcome::None;
        }
        self.select_area(graph, area)
    }

    /// Select the entity nodes fully inside `area`, replacing any previous
    /// selection.
    pub fn select_area(&mut self, graph: &mut DiagramGraph, area: Rect) -> Outcome {
        self.teardown(graph);
        self.selected = graph
            .entity_nodes()
            .filter(|n| area.contains_rect(&n.bbox()))
            .map(|n| n.id.clone())
            .collect();
        tracing::debug!(selected = self.selected.len(), "area selection");

        match self.selected.len() {
            0 => Outcome::None,
            1 => Outcome::Single(self.selected[0].clone()),
            _ => match self.build_container(graph) {
                Ok(container) => Outcome::Group {
                    container,
                    members: self.selected.clone(),
                },
                Err(err) => {
                    tracing::warn!(%err, "selection container not built");
                    self.teardown(graph);
                    Outcome::None
                }
            },
        }
    }

    fn members_bounds(&self, graph: &DiagramGraph) -> Option<Rect> {
        let boxes: Vec<Rect> = self
            .selected
            .iter()
            .filter_map(|id| graph.node(id))
            .map(|n| n.bbox())
            .collect();
        Rect::union_all(&boxes)
    }

    fn build_container(&mut self, graph: &mut DiagramGraph) -> Result<NodeId, ModelError> {
        let bounds = self
            .members_bounds(graph)
            .ok_or_else(|| ModelError::NodeNotFound(self.selected.join(",")))?;
        let container = graph.add_selection_container(bounds);
        self.container = Some(container.clone());
        graph.to_back(&container)?;
        for member in &self.selected {
            graph.embed(&container, member)?;
        }
        Ok(container)
    }

    /// Fit the container to its members again after they moved.
    pub fn refresh_container(&mut self, graph: &mut DiagramGraph) -> Result<(), ModelError> {
        let Some(container) = self.container.clone() else {
            return Ok(());
        };
        self.selected.retain(|id| graph.node(id).is_some());
        if self.selected.len() < 2 {
            self.teardown(graph);
            return Ok(());
        }
        if let Some(bounds) = self.members_bounds(graph) {
            // move the container alone, members are already in place
            let children: Vec<NodeId> = graph.embedded(&container).to_vec();
            for child in &children {
                graph.unembed(child)?;
            }
            graph.set_position(&container, bounds.origin())?;
            graph.resize(&container, Size::new(bounds.width, bounds.height))?;
            for child in &children {
                graph.embed(&container, child)?;
            }
            graph.to_back(&container)?;
        }
        Ok(())
    }

    /// Move every selected node by an offset.
    pub fn move_selection(&mut self, graph: &mut DiagramGraph, dx: f64, dy: f64) -> Result<(), ModelError> {
        match &self.container {
            Some(container) => graph.translate_node(container, dx, dy),
            None => {
                for id in &self.selected {
                    graph.translate_node(id, dx, dy)?;
                }
                Ok(())
            }
        }
    }

    /// Rearrange the selected nodes around their current centre, hub first.
    pub fn apply_smart_layout(
        &mut self,
        graph: &mut DiagramGraph,
        smart: &SmartLayout,
    ) -> Result<(), ModelError> {
        if self.selected.is_empty() {
            return Ok(());
        }
        let Some(center) = self.members_bounds(graph).map(|b| b.center()) else {
            return Ok(());
        };
        let (mut nodes, _) = layout::collect(graph, Some(&self.selected));

        if let Some(container) = &self.container {
            let children: Vec<NodeId> = graph.embedded(container).to_vec();
            for child in &children {
                graph.unembed(child)?;
            }
        }
        smart.arrange_around(&mut nodes, center);
        layout::apply_positions(graph, &nodes)?;

        if let Some(container) = self.container.clone() {
            for member in self.selected.clone() {
                graph.embed(&container, &member)?;
            }
            self.refresh_container(graph)?;
        }
        Ok(())
    }

    /// Drop the selection and its container.
    pub fn clear(&mut self, graph: &mut DiagramGraph) {
        self.state = DragState::Idle;
        self.selected.clear();
        self.teardown(graph);
    }

    fn teardown(&mut self, graph: &mut DiagramGraph) {
        let Some(container) = self.container.take() else {
            return;
        };
        let children: Vec<NodeId> = graph.embedded(&container).to_vec();
        for child in children {
            if let Err(err) = graph.unembed(&child) {
                tracing::debug!(%err, "selection member vanished");
            }
        }
        if let Err(err) = graph.remove_node(&container) {
            tracing::debug!(%err, "selection container already removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixtures::sample_catalog;
    use crate::model::{DiagramKind, GraphEvent};

    // account at (0,0), contact at (300,0), task at (0,300); all 200x80
    fn setup() -> (DiagramGraph, Vec<NodeId>) {
        let catalog = sample_catalog();
        let mut graph = DiagramGraph::new(DiagramKind::Simple);
        let mut ids = Vec::new();
        for (schema, p) in [
            ("account", Point::new(0.0, 0.0)),
            ("contact", Point::new(300.0, 0.0)),
            ("task", Point::new(0.0, 300.0)),
        ] {
            ids.push(graph.add_entity(catalog.entity(schema).unwrap(), None, p).unwrap());
        }
        graph.drain_events();
        (graph, ids)
    }

    fn drag(sel: &mut AreaSelection, graph: &mut DiagramGraph, from: Point, to: Point) -> Outcome {
        assert!(sel.pointer_down(graph, from));
        sel.pointer_move(to);
        sel.pointer_up(graph, to)
    }

    #[test]
    fn test_two_nodes_make_a_group() {
        let (mut graph, ids) = setup();
        let mut sel = AreaSelection::new();
        let outcome = drag(&mut sel, &mut graph, Point::new(-10.0, -10.0), Point::new(510.0, 100.0));

        let Outcome::Group { container, members } = outcome else {
            panic!("expected a group");
        };
        assert_eq!(members, vec![ids[0].clone(), ids[1].clone()]);
        let node = graph.node(&container).unwrap();
        assert!(node.is_selection());
        assert_eq!(node.bbox(), Rect::new(0.0, 0.0, 500.0, 80.0));
        assert_eq!(graph.embedded(&container), members.as_slice());
        assert!(graph.nodes().iter().all(|n| n.id == container || n.z > node.z));
    }

    #[test]
    fn test_partial_overlap_is_not_selected() {
        let (mut graph, ids) = setup();
        let mut sel = AreaSelection::new();
        // covers account fully and contact only partly
        let outcome = drag(&mut sel, &mut graph, Point::new(-10.0, -10.0), Point::new(400.0, 100.0));
        assert_eq!(outcome, Outcome::Single(ids[0].clone()));
        assert!(sel.container().is_none());
        assert_eq!(graph.nodes().len(), 3);
    }

    #[test]
    fn test_boundary_touching_counts_as_inside() {
        let (mut graph, ids) = setup();
        let mut sel = AreaSelection::new();
        let outcome = sel.select_area(&mut graph, Rect::new(0.0, 0.0, 200.0, 80.0));
        assert_eq!(outcome, Outcome::Single(ids[0].clone()));
    }

    #[test]
    fn test_tiny_click_clears_previous_group() {
        let (mut graph, _) = setup();
        let mut sel = AreaSelection::new();
        drag(&mut sel, &mut graph, Point::new(-10.0, -10.0), Point::new(510.0, 100.0));
        assert!(sel.container().is_some());

        let outcome = drag(&mut sel, &mut graph, Point::new(800.0, 800.0), Point::new(802.0, 801.0));
        assert_eq!(outcome, Outcome::None);
        assert!(sel.container().is_none());
        assert!(sel.selected().is_empty());
        assert!(graph.nodes().iter().all(|n| !n.is_selection()));
    }

    #[test]
    fn test_empty_area_selects_nothing() {
        let (mut graph, _) = setup();
        let mut sel = AreaSelection::new();
        let outcome = drag(&mut sel, &mut graph, Point::new(600.0, 600.0), Point::new(900.0, 900.0));
        assert_eq!(outcome, Outcome::None);
        assert_eq!(graph.nodes().len(), 3);
    }

    #[test]
    fn test_pointer_down_on_node_does_not_drag() {
        let (graph, _) = setup();
        let mut sel = AreaSelection::new();
        assert!(!sel.pointer_down(&graph, Point::new(50.0, 40.0)));
        assert!(!sel.is_dragging());
    }

    #[test]
    fn test_overlay_is_at_least_one_pixel() {
        let (graph, _) = setup();
        let mut sel = AreaSelection::new();
        sel.pointer_down(&graph, Point::new(600.0, 600.0));
        let overlay = sel.pointer_move(Point::new(600.0, 650.0)).unwrap();
        assert_eq!(overlay, Rect::new(600.0, 600.0, 1.0, 50.0));
    }

    #[test]
    fn test_move_selection_moves_members() {
        let (mut graph, ids) = setup();
        let mut sel = AreaSelection::new();
        drag(&mut sel, &mut graph, Point::new(-10.0, -10.0), Point::new(510.0, 100.0));
        graph.drain_events();

        sel.move_selection(&mut graph, 50.0, 25.0).unwrap();
        assert_eq!(graph.node(&ids[1]).unwrap().position, Point::new(350.0, 25.0));
        assert_eq!(graph.node(&ids[2]).unwrap().position, Point::new(0.0, 300.0));
        assert!(graph.drain_events().contains(&GraphEvent::Change(ids[0].clone())));
    }

    #[test]
    fn test_smart_layout_refreshes_container() {
        let (mut graph, _) = setup();
        let mut sel = AreaSelection::new();
        drag(&mut sel, &mut graph, Point::new(-10.0, -10.0), Point::new(510.0, 400.0));
        assert_eq!(sel.selected().len(), 3);

        sel.apply_smart_layout(&mut graph, &SmartLayout::default()).unwrap();
        let container = sel.container().unwrap().to_string();
        let bounds = graph.node(&container).unwrap().bbox();
        for id in sel.selected() {
            assert!(bounds.contains_rect(&graph.node(id).unwrap().bbox()));
        }
        assert_eq!(graph.embedded(&container).len(), 3);
        assert_eq!(graph.node(&container).unwrap().size, Size::new(bounds.width, bounds.height));
    }

    #[test]
    fn test_clear_removes_container() {
        let (mut graph, ids) = setup();
        let mut sel = AreaSelection::new();
        drag(&mut sel, &mut graph, Point::new(-10.0, -10.0), Point::new(510.0, 100.0));
        sel.clear(&mut graph);
        assert_eq!(graph.nodes().len(), 3);
        assert!(graph.node(&ids[0]).unwrap().parent.is_none());
    }
}
