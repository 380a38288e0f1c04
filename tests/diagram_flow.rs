mod common;

use std::time::Duration;

use dmv_diagram::config::Config;
use dmv_diagram::geometry::{Point, Rect};
use dmv_diagram::layout::{self, GridLayout, LayoutAlgorithm, SmartLayout};
use dmv_diagram::model::{DiagramGraph, DiagramKind};
use dmv_diagram::routing::{RouterOptions, RoutingBridge};
use dmv_diagram::selection::{AreaSelection, Outcome};
use dmv_diagram::serialization::{
    deserialize_diagram, parse_diagram, serialize_diagram, serialize_with_identity, to_json,
};
use dmv_diagram::svg::SvgRenderer;
use dmv_diagram::viewport::Viewport;

use common::catalog;

const TIMEOUT: Duration = Duration::from_secs(5);

fn fast_router() -> RouterOptions {
    RouterOptions {
        debounce_ms: 10,
        ..Default::default()
    }
}

fn sales_diagram() -> DiagramGraph {
    let catalog = catalog();
    let mut graph = DiagramGraph::new(DiagramKind::Detailed);
    let group = catalog.group("Sales").unwrap();
    let added = graph.add_group(group, &GridLayout::default());
    assert_eq!(added.len(), 3);
    graph.link_all(&catalog);
    graph
}

#[test]
fn build_route_save_and_reload() {
    let catalog = catalog();
    let mut graph = sales_diagram();
    // account-contact, account-opportunity and the account self reference
    assert_eq!(graph.links().len(), 3);

    let bridge = RoutingBridge::spawn(fast_router()).unwrap();
    bridge.reset(&mut graph).unwrap();
    bridge.wait_routed(&mut graph, TIMEOUT).unwrap();
    assert!(graph.links().iter().any(|l| !l.vertices.is_empty()));
    bridge.shutdown().unwrap();

    let mut viewport = Viewport::default();
    viewport.fit_to(graph.bbox().unwrap(), 40.0);
    let doc = serialize_diagram(&graph, &viewport, "Sales");
    let json = to_json(&doc).unwrap();

    let reopened = parse_diagram(&json).unwrap();
    let (loaded, view) = deserialize_diagram(&reopened, &catalog, Default::default());
    assert_eq!(view.zoom(), viewport.zoom());
    for link in graph.links() {
        assert_eq!(loaded.link(&link.id).unwrap().vertices, link.vertices);
    }

    let resaved = serialize_with_identity(&loaded, &view, &reopened);
    assert_eq!(resaved.id, doc.id);
    assert_eq!(resaved.links, doc.links);
}

#[test]
fn adding_to_a_diagram_avoids_existing_nodes() {
    let catalog = catalog();
    let mut graph = sales_diagram();
    let before = graph.entity_bboxes();

    let service: Vec<_> = catalog.group("Service").unwrap().entities.iter().collect();
    let added = graph.add_entities(&service, &GridLayout::default());
    assert_eq!(added.len(), 2);
    for id in &added {
        let b = graph.node(id).unwrap().bbox();
        assert!(before.iter().all(|e| !e.intersects(&b)));
    }

    // the Sales group again adds nothing
    let again = graph.add_group(catalog.group("Sales").unwrap(), &GridLayout::default());
    assert!(again.is_empty());
}

#[test]
fn moving_a_selection_reroutes_its_links() {
    let mut graph = sales_diagram();
    let bridge = RoutingBridge::spawn(fast_router()).unwrap();
    bridge.reset(&mut graph).unwrap();
    bridge.wait_routed(&mut graph, TIMEOUT).unwrap();

    let contact = graph.node_by_schema("contact").unwrap().bbox();
    let opportunity = graph.node_by_schema("opportunity").unwrap().bbox();
    let area = contact.union(&opportunity).inflate(5.0);

    let mut selection = AreaSelection::new();
    assert!(selection.pointer_down(&graph, Point::new(area.x, area.y)));
    selection.pointer_move(Point::new(area.right(), area.bottom()));
    let outcome = selection.pointer_up(&mut graph, Point::new(area.right(), area.bottom()));
    let Outcome::Group { members, .. } = outcome else {
        panic!("expected a group, got {:?}", outcome);
    };
    assert_eq!(members.len(), 2);

    let before: Vec<_> = graph.links().iter().map(|l| l.vertices.clone()).collect();
    selection.move_selection(&mut graph, 0.0, 400.0).unwrap();
    assert!(bridge.sync(&mut graph).unwrap() > 0);
    bridge.wait_routed(&mut graph, TIMEOUT).unwrap();
    let after: Vec<_> = graph.links().iter().map(|l| l.vertices.clone()).collect();
    assert_ne!(before, after);

    selection.apply_smart_layout(&mut graph, &SmartLayout::default()).unwrap();
    selection.clear(&mut graph);
    assert!(graph.nodes().iter().all(|n| !n.is_selection()));
}

#[test]
fn size_aware_layouts_separate_nodes() {
    // smart layout spaces centres only and is meant for small selections
    let config = Config::default();
    for algorithm in [
        LayoutAlgorithm::Grid,
        LayoutAlgorithm::Hierarchical,
        LayoutAlgorithm::Force,
    ] {
        let mut graph = sales_diagram();
        layout::arrange(&mut graph, None, algorithm, &config.layout).unwrap();
        let boxes: Vec<Rect> = graph.entity_bboxes();
        for (i, a) in boxes.iter().enumerate() {
            for b in &boxes[i + 1..] {
                assert!(!a.intersects(b), "{:?}: {:?} overlaps {:?}", algorithm, a, b);
            }
        }
    }
}

#[test]
fn render_routed_diagram() {
    let mut graph = sales_diagram();
    let bridge = RoutingBridge::spawn(fast_router()).unwrap();
    bridge.reset(&mut graph).unwrap();
    bridge.wait_routed(&mut graph, TIMEOUT).unwrap();

    let svg = SvgRenderer::default().render(&graph);
    assert!(svg.contains("<svg"));
    assert!(svg.contains("Opportunity"));
    assert_eq!(svg.matches(r#"class="link""#).count(), 3);
    assert!(svg.contains("1:N"));
}
