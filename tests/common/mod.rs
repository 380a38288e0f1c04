#![allow(dead_code)]

use dmv_diagram::geometry::Point;
use dmv_diagram::metadata::Catalog;
use dmv_diagram::model::{DiagramGraph, DiagramKind, GraphEvent};
use dmv_diagram::routing::RouterRequest;

pub const ENTITIES: [&str; 5] = ["account", "contact", "opportunity", "incident", "knowledgearticle"];

pub fn catalog() -> Catalog {
    Catalog::from_json(include_str!("../fixtures/metadata.json")).expect("fixture metadata")
}

/// A graph with the given entities at the given positions, linked.
pub fn graph_at(catalog: &Catalog, placed: &[(&str, Point)]) -> DiagramGraph {
    let mut graph = DiagramGraph::new(DiagramKind::Detailed);
    for (schema, p) in placed {
        let entity = catalog.entity(schema).expect("entity in fixture");
        graph.add_entity(entity, None, *p);
    }
    graph.link_all(catalog);
    graph
}

/// The requests the routing bridge would send for the pending journal.
pub fn journal_requests(graph: &mut DiagramGraph) -> Vec<RouterRequest> {
    graph
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            GraphEvent::Add(id) => graph.cell_snapshot(&id).map(|cell| RouterRequest::Add { cell }),
            GraphEvent::Change(id) => graph.cell_snapshot(&id).map(|cell| RouterRequest::Change { cell }),
            GraphEvent::Remove(id) => Some(RouterRequest::Remove { id }),
        })
        .collect()
}
